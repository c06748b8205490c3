//! Detector Driver
//!
//! Shares a detector between the runner feeding it output and a background
//! task ticking its timers.

use super::InteractionDetector;
use crate::models::{InteractionRequest, InteractionResponse};
use crate::runner::DetectorSink;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A detector plus the task driving its silence and hard-timeout checks
#[derive(Clone)]
pub struct DetectorHandle {
    detector: Arc<Mutex<InteractionDetector>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DetectorHandle {
    /// Start ticking a detector every `tick`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(detector: InteractionDetector, tick: Duration) -> Self {
        let detector = Arc::new(Mutex::new(detector));
        let ticked = detector.clone();
        let period = tick.max(Duration::from_millis(1));

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let mut detector = lock(&ticked);
                if !detector.is_active() {
                    trace!("Detector tick task exiting for {}", detector.command_id());
                    break;
                }
                detector.tick(Instant::now());
            }
        });

        Self {
            detector,
            ticker: Arc::new(Mutex::new(Some(ticker))),
        }
    }

    /// Exclusive access to the detector
    pub fn lock(&self) -> MutexGuard<'_, InteractionDetector> {
        lock(&self.detector)
    }

    pub fn suppress(&self) {
        self.lock().suppress();
    }

    pub fn pending_request(&self) -> Option<InteractionRequest> {
        self.lock().pending_request().cloned()
    }

    pub fn take_response_bytes(&self, response: &InteractionResponse) -> Option<Vec<u8>> {
        self.lock().take_response_bytes(response)
    }

    pub fn cancel_bytes(&self) -> Vec<u8> {
        self.lock().cancel_bytes()
    }

    /// Dispose the detector and stop its tick task
    pub fn dispose(&self) {
        self.lock().dispose();
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
        }
    }

    /// Whether the tick task has been stopped
    pub fn is_released(&self) -> bool {
        lock(&self.ticker).is_none()
    }
}

impl DetectorSink for DetectorHandle {
    fn observe(&self, chunk: &str) {
        self.lock().process_output(chunk, Instant::now());
    }

    fn command_finished(&self, exit_code: Option<i32>) {
        self.lock().command_finished(exit_code);
    }

    fn release(&self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorHandle")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

/// A panic while holding the lock leaves the state usable, so recover it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
