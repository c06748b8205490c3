//! Test Fixtures and Recording Hooks

use shellsentry::{
    CommandResult, DetectorConfig, DetectorEvent, DetectorHandle, DetectorSink, ExecutionContext,
    InteractionDetector, InteractionEventBus, InteractionSubscription, MarkerPair, OutputLine,
    RunnerHooks, Taxonomy,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Markers that are easy to read in assertions
pub fn markers() -> MarkerPair {
    MarkerPair::new("START", "END").expect("valid markers")
}

/// Context with readable markers and a 500ms half-line release
pub fn context(command: &str, timeout_ms: u64) -> ExecutionContext {
    ExecutionContext::new(
        command,
        markers(),
        Duration::from_millis(timeout_ms),
        Some(Duration::from_millis(500)),
    )
    .expect("valid context")
}

/// Detector for a context, ticking on the default interval
pub fn detector_for(context: &ExecutionContext) -> (DetectorHandle, InteractionSubscription) {
    detector_with(context, DetectorConfig::default())
}

pub fn detector_with(
    context: &ExecutionContext,
    config: DetectorConfig,
) -> (DetectorHandle, InteractionSubscription) {
    let bus = InteractionEventBus::new(64);
    let events = bus.subscribe_ordered();
    let tick = config.tick_interval();
    let detector = InteractionDetector::new(
        context.command_id.clone(),
        context.task_id.clone(),
        &context.command,
        Taxonomy::shared(),
        config,
        bus,
    );
    (DetectorHandle::spawn(detector, tick), events)
}

/// Wire names of a list of events
pub fn event_names(events: &[DetectorEvent]) -> Vec<&'static str> {
    events.iter().map(DetectorEvent::name).collect()
}

/// Ordered record of callbacks, shared between hooks and sinks
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().expect("call log poisoned").clone()
}

/// Hooks that record every callback
pub struct RecordingHooks {
    pub lines: Vec<OutputLine>,
    pub chunks: Vec<String>,
    pub log: CallLog,
    pub listening: bool,
    /// Lines containing this text are treated as echo
    pub echo_filter: Option<String>,
    pub handle_timeout: bool,
    pub uppercase: bool,
}

impl RecordingHooks {
    pub fn new(log: CallLog) -> Self {
        Self {
            lines: Vec::new(),
            chunks: Vec::new(),
            log,
            listening: true,
            echo_filter: None,
            handle_timeout: false,
            uppercase: false,
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }

    fn record(&self, call: String) {
        self.log.lock().expect("call log poisoned").push(call);
    }
}

impl RunnerHooks for RecordingHooks {
    fn is_listening(&self) -> bool {
        self.listening
    }

    fn should_filter_echo(&self, text: &str) -> bool {
        self.echo_filter
            .as_deref()
            .is_some_and(|needle| text.contains(needle))
    }

    fn transform_line(&mut self, mut line: OutputLine) -> OutputLine {
        if self.uppercase {
            line.text = line.text.to_uppercase();
        }
        line
    }

    fn on_line(&mut self, line: OutputLine) {
        self.lines.push(line);
    }

    fn on_detector_output(&mut self, chunk: &str) {
        self.chunks.push(chunk.to_string());
    }

    fn on_exit_code(&mut self, exit_code: i32) {
        self.record(format!("exit:{}", exit_code));
    }

    fn on_completed(&mut self, result: &CommandResult) {
        self.record(format!(
            "completed:{}:{}:{:?}",
            result.completed, result.timed_out, result.exit_code
        ));
    }

    fn on_continue(&mut self) {
        self.record("continue".to_string());
    }

    fn on_timeout(&mut self, context: &ExecutionContext) -> bool {
        self.record(format!("timeout:{}", context.command));
        self.handle_timeout
    }
}

/// Detector sink that records calls and optionally forwards them
pub struct RecordingSink {
    pub log: CallLog,
    pub inner: Option<DetectorHandle>,
}

impl RecordingSink {
    pub fn new(log: CallLog) -> Self {
        Self { log, inner: None }
    }

    pub fn wrapping(log: CallLog, inner: DetectorHandle) -> Self {
        Self {
            log,
            inner: Some(inner),
        }
    }

    fn record(&self, call: String) {
        self.log.lock().expect("call log poisoned").push(call);
    }
}

impl DetectorSink for RecordingSink {
    fn observe(&self, chunk: &str) {
        self.record(format!("observe:{}", chunk.len()));
        if let Some(inner) = &self.inner {
            inner.observe(chunk);
        }
    }

    fn command_finished(&self, exit_code: Option<i32>) {
        self.record(format!("finished:{:?}", exit_code));
        if let Some(inner) = &self.inner {
            inner.command_finished(exit_code);
        }
    }

    fn release(&self) {
        self.record("release".to_string());
        if let Some(inner) = &self.inner {
            inner.release();
        }
    }
}
