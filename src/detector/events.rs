//! Detector Event System
//!
//! Each detector publishes typed events on a bus. Consumers subscribe and
//! receive events in the order the detector raised them.

use crate::models::InteractionRequest;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

/// Events emitted by an interaction detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DetectorEvent {
    /// The shell is waiting on a human
    InteractionNeeded(InteractionRequest),

    /// Interaction requests are switched off for this command
    #[serde(rename_all = "camelCase")]
    InteractionSuppressed { command_id: String },

    /// A full-screen program should be handed over or cancelled
    #[serde(rename_all = "camelCase")]
    TuiDetected {
        command_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        message: String,
    },

    /// The program switched to the alternate screen buffer
    #[serde(rename_all = "camelCase")]
    AlternateScreenEntered {
        command_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        auto_cancel: bool,
    },

    /// The end marker arrived
    #[serde(rename_all = "camelCase")]
    CommandCompleted {
        command_id: String,
        exit_code: Option<i32>,
    },
}

impl DetectorEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            DetectorEvent::InteractionNeeded(_) => "interaction-needed",
            DetectorEvent::InteractionSuppressed { .. } => "interaction-suppressed",
            DetectorEvent::TuiDetected { .. } => "tui-detected",
            DetectorEvent::AlternateScreenEntered { .. } => "alternate-screen-entered",
            DetectorEvent::CommandCompleted { .. } => "command-completed",
        }
    }

    pub fn command_id(&self) -> &str {
        match self {
            DetectorEvent::InteractionNeeded(request) => &request.command_id,
            DetectorEvent::InteractionSuppressed { command_id }
            | DetectorEvent::TuiDetected { command_id, .. }
            | DetectorEvent::AlternateScreenEntered { command_id, .. }
            | DetectorEvent::CommandCompleted { command_id, .. } => command_id,
        }
    }
}

/// Where a subscription reads from
#[derive(Debug)]
enum Source {
    /// Shared ring buffer; a slow reader loses the oldest events
    Broadcast(broadcast::Receiver<DetectorEvent>),
    /// Private queue; nothing is ever dropped
    Ordered(mpsc::UnboundedReceiver<DetectorEvent>),
}

/// Subscription handle for receiving detector events
#[derive(Debug)]
pub struct InteractionSubscription {
    source: Source,
    missed: u64,
}

impl InteractionSubscription {
    fn new(source: Source) -> Self {
        Self { source, missed: 0 }
    }

    /// Receive the next event, waiting if necessary
    pub async fn recv(&mut self) -> Option<DetectorEvent> {
        loop {
            let result = match &mut self.source {
                Source::Ordered(receiver) => return receiver.recv().await,
                Source::Broadcast(receiver) => receiver.recv().await,
            };
            match result {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => self.record_lag(count),
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<DetectorEvent> {
        loop {
            let result = match &mut self.source {
                Source::Ordered(receiver) => return receiver.try_recv().ok(),
                Source::Broadcast(receiver) => receiver.try_recv(),
            };
            match result {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.record_lag(count),
            }
        }
    }

    /// Collect every event already published
    pub fn drain(&mut self) -> Vec<DetectorEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Number of events this subscription lost to lagging
    ///
    /// Always zero for ordered subscriptions.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn record_lag(&mut self, count: u64) {
        warn!("Detector event subscriber lagged by {} events", count);
        self.missed += count;
    }
}

/// Event bus a detector publishes on
///
/// Two kinds of subscriber are supported. [`subscribe`](Self::subscribe)
/// shares a ring buffer of `capacity` events: a subscriber that falls more
/// than `capacity` events behind loses the oldest ones and sees the loss in
/// [`InteractionSubscription::missed`]. [`subscribe_ordered`](Self::subscribe_ordered)
/// gets its own unbounded queue and receives every event in publish order,
/// which is what an arbiter answering prompts should use.
#[derive(Debug, Clone)]
pub struct InteractionEventBus {
    sender: broadcast::Sender<DetectorEvent>,
    ordered: Arc<Mutex<Vec<mpsc::UnboundedSender<DetectorEvent>>>>,
}

impl InteractionEventBus {
    /// Create a new event bus whose shared buffer holds `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            ordered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe through the shared buffer
    pub fn subscribe(&self) -> InteractionSubscription {
        InteractionSubscription::new(Source::Broadcast(self.sender.subscribe()))
    }

    /// Subscribe with a private queue that never drops events
    pub fn subscribe_ordered(&self) -> InteractionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.ordered.lock() {
            Ok(mut senders) => senders.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        InteractionSubscription::new(Source::Ordered(rx))
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DetectorEvent) {
        {
            let mut senders = match self.ordered.lock() {
                Ok(senders) => senders,
                Err(poisoned) => poisoned.into_inner(),
            };
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        let ordered = match self.ordered.lock() {
            Ok(senders) => senders.iter().filter(|tx| !tx.is_closed()).count(),
            Err(poisoned) => poisoned.into_inner().iter().filter(|tx| !tx.is_closed()).count(),
        };
        self.sender.receiver_count() + ordered
    }
}

impl Default for InteractionEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
