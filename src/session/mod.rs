//! Session Streams
//!
//! The duplex channel a runner drives. The transport owns the real socket and
//! feeds output bytes through a channel; input goes out through a
//! [`SessionWriter`]. Write failures are reported as [`SubmitResult`] codes
//! and never raised.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Outcome of writing input to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Bytes handed to the transport
    Sent,
    /// The transport reported it cannot take input right now
    NotWritable,
    /// The transport side has gone away
    Closed,
    /// The transport rejected the write
    WriteFailed(String),
}

impl SubmitResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SubmitResult::Sent)
    }
}

/// Input half of a session
pub trait SessionWriter: Send {
    /// Whether the transport currently accepts input
    fn is_writable(&self) -> bool;

    /// Hand bytes to the transport
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Writer backed by an unbounded channel read by the transport
pub struct ChannelWriter {
    input_tx: UnboundedSender<Vec<u8>>,
    writable: Arc<AtomicBool>,
}

impl ChannelWriter {
    pub fn new(input_tx: UnboundedSender<Vec<u8>>, writable: Arc<AtomicBool>) -> Self {
        Self { input_tx, writable }
    }
}

impl SessionWriter for ChannelWriter {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst) && !self.input_tx.is_closed()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.input_tx
            .send(data.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))
    }
}

/// Duplex byte channel for one remote shell session
pub struct SessionStream {
    /// Output bytes from the remote shell
    output_rx: UnboundedReceiver<Vec<u8>>,
    /// Input path to the remote shell
    writer: Box<dyn SessionWriter>,
}

impl SessionStream {
    /// Create a session from an output channel and a writer
    pub fn from_channels(output_rx: UnboundedReceiver<Vec<u8>>, writer: Box<dyn SessionWriter>) -> Self {
        Self { output_rx, writer }
    }

    /// In-memory session and the transport end that drives it
    pub fn pair() -> (SessionStream, SessionPeer) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let writable = Arc::new(AtomicBool::new(true));

        let stream = SessionStream::from_channels(
            output_rx,
            Box::new(ChannelWriter::new(input_tx, writable.clone())),
        );
        let peer = SessionPeer {
            output_tx,
            input_rx,
            writable,
        };
        (stream, peer)
    }

    /// Whether input can be submitted
    pub fn is_writable(&self) -> bool {
        self.writer.is_writable()
    }

    /// Write input, reporting the outcome as a code
    pub fn submit(&mut self, data: &[u8]) -> SubmitResult {
        if !self.writer.is_writable() {
            debug!("Session not writable, dropping {} bytes", data.len());
            return SubmitResult::NotWritable;
        }

        match self.writer.write(data) {
            Ok(()) => SubmitResult::Sent,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe
                        | io::ErrorKind::NotConnected
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                warn!("Session closed while writing: {}", e);
                SubmitResult::Closed
            }
            Err(e) => {
                warn!("Session write failed: {}", e);
                SubmitResult::WriteFailed(e.to_string())
            }
        }
    }

    /// Wait for the next output chunk; `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.output_rx.recv().await
    }

    /// Drain all pending output without waiting
    pub fn drain_output(&mut self) -> usize {
        let mut count = 0;
        while self.output_rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// Transport end of an in-memory session
pub struct SessionPeer {
    output_tx: UnboundedSender<Vec<u8>>,
    input_rx: UnboundedReceiver<Vec<u8>>,
    writable: Arc<AtomicBool>,
}

impl SessionPeer {
    /// Deliver output bytes to the session; false once the session is gone
    pub fn send_output(&self, data: impl Into<Vec<u8>>) -> bool {
        self.output_tx.send(data.into()).is_ok()
    }

    /// Toggle the writable flag seen by the session
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Take the next input written by the session, if any
    pub fn try_recv_input(&mut self) -> Option<Vec<u8>> {
        self.input_rx.try_recv().ok()
    }

    /// Wait for the next input written by the session
    pub async fn recv_input(&mut self) -> Option<Vec<u8>> {
        self.input_rx.recv().await
    }

    /// Split into the raw output sender and input receiver
    pub fn into_parts(self) -> (UnboundedSender<Vec<u8>>, UnboundedReceiver<Vec<u8>>) {
        (self.output_tx, self.input_rx)
    }
}
