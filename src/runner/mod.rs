//! Command Runner
//!
//! Writes a marker-wrapped command to a session and turns the output that
//! comes back into ordered lines and exactly one [`CommandResult`].
//!
//! The runner never fails. Transport problems, protocol noise and timeouts
//! all end in a settled result, and the completion hooks and the detector
//! cleanup run once on every exit path.

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::models::{CommandResult, ExecutionContext, MarkerPair, OutputLine};
use crate::session::{SessionStream, SubmitResult};
use crate::terminal::{strip_ansi, StreamCursor, StreamEvent};
use std::future::pending;
use tokio::time::{sleep_until, Instant};

/// Where the runner forwards output for interaction detection
pub trait DetectorSink: Send + Sync {
    /// Every decoded chunk, whatever the marker or listening state
    fn observe(&self, chunk: &str);

    /// The end marker arrived
    fn command_finished(&self, exit_code: Option<i32>);

    /// Tear down; called exactly once per command
    fn release(&self);
}

/// Caller callbacks for one command run
///
/// Every method has a no-op default so callers implement only what they use.
pub trait RunnerHooks: Send {
    /// Whether decoded lines should be surfaced right now
    fn is_listening(&self) -> bool {
        true
    }

    /// Extra echo filter for lines after the start marker
    fn should_filter_echo(&self, _text: &str) -> bool {
        false
    }

    /// Rewrite a line before it is surfaced
    fn transform_line(&mut self, line: OutputLine) -> OutputLine {
        line
    }

    fn on_line(&mut self, _line: OutputLine) {}

    /// Every decoded chunk, before any filtering
    fn on_detector_output(&mut self, _chunk: &str) {}

    fn on_exit_code(&mut self, _exit_code: i32) {}

    fn on_completed(&mut self, _result: &CommandResult) {}

    /// Called last, once the runner is done with the session
    fn on_continue(&mut self) {}

    /// Return `true` when the timeout was handled; otherwise the runner
    /// surfaces a default timeout line.
    fn on_timeout(&mut self, _context: &ExecutionContext) -> bool {
        false
    }
}

/// Hooks that keep every surfaced line
#[derive(Debug, Default)]
pub struct LineCollector {
    pub lines: Vec<OutputLine>,
}

impl LineCollector {
    pub fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }
}

impl RunnerHooks for LineCollector {
    fn on_line(&mut self, line: OutputLine) {
        self.lines.push(line);
    }
}

/// Applies the listening gate, echo filter and line cap
struct LineSurface {
    max_lines: usize,
    surfaced: usize,
    truncated: bool,
}

impl LineSurface {
    fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            surfaced: 0,
            truncated: false,
        }
    }

    fn surface<H>(&mut self, hooks: &mut H, raw: String, partial: bool)
    where
        H: RunnerHooks + ?Sized,
    {
        let text = strip_ansi(&raw);
        if hooks.should_filter_echo(&text) {
            trace!("Filtered echo line: {}", text);
            return;
        }
        if !hooks.is_listening() {
            return;
        }

        if self.surfaced >= self.max_lines {
            if !self.truncated {
                self.truncated = true;
                warn!("Output truncated after {} lines", self.max_lines);
                let notice = format!("[output truncated after {} lines]", self.max_lines);
                hooks.on_line(OutputLine::new(notice.clone(), notice, self.surfaced));
            }
            return;
        }

        let mut line = OutputLine::new(text, raw, self.surfaced);
        if partial {
            line = line.into_partial();
        }
        let line = hooks.transform_line(line);
        hooks.on_line(line);
        self.surfaced += 1;
    }
}

/// Runs marker-wrapped commands over a session
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    config: RunnerConfig,
}

impl CommandRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Build a context with fresh markers and the configured timeouts
    pub fn prepare(&self, command: &str, requested_timeout_ms: Option<u64>) -> Result<ExecutionContext> {
        ExecutionContext::new(
            command,
            MarkerPair::generate(&self.config.marker_namespace),
            self.config.effective_timeout(requested_timeout_ms),
            self.config.half_line_timeout(),
        )
    }

    /// Run one command to its single result
    pub async fn run<H>(
        &self,
        session: &mut SessionStream,
        context: ExecutionContext,
        hooks: &mut H,
        detector: Option<&dyn DetectorSink>,
    ) -> CommandResult
    where
        H: RunnerHooks + ?Sized,
    {
        info!("Running command {}: {}", context.command_id, context.command);

        match session.submit(&context.wire_bytes()) {
            SubmitResult::Sent => {}
            failure => {
                warn!(
                    "Could not submit command {}: {:?}",
                    context.command_id, failure
                );
                return finish(&context, hooks, detector, CommandResult::abandoned());
            }
        }

        let mut cursor = StreamCursor::new(
            context.markers.clone(),
            self.config.line_buffer_max_length,
        );
        let mut lines = LineSurface::new(self.config.max_lines);
        let deadline = sleep_until(Instant::now() + context.timeout);
        tokio::pin!(deadline);
        let mut half_line_at: Option<Instant> = None;

        let result = loop {
            let half_line = async move {
                match half_line_at {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                // Ahead of output: a session that never goes quiet still times out.
                _ = &mut deadline => {
                    warn!(
                        "Command {} timed out after {}ms",
                        context.command_id,
                        context.timeout.as_millis()
                    );
                    if !hooks.on_timeout(&context) {
                        let notice = format!(
                            "Command timed out after {}ms",
                            context.timeout.as_millis()
                        );
                        hooks.on_line(OutputLine::new(notice.clone(), notice, lines.surfaced));
                    }
                    break CommandResult::timed_out();
                }

                chunk = session.recv() => {
                    let Some(bytes) = chunk else {
                        warn!("Session closed before command {} finished", context.command_id);
                        break CommandResult::abandoned();
                    };

                    let (text, events) = cursor.feed(&bytes);
                    let finished = events.iter().find_map(|event| match event {
                        StreamEvent::Finished(code) => Some(*code),
                        _ => None,
                    });

                    if !text.is_empty() {
                        hooks.on_detector_output(&text);
                    }
                    if let Some(detector) = detector {
                        // The end marker wins over anything else in the same chunk.
                        if finished.is_some() {
                            detector.command_finished(finished);
                        }
                        if !text.is_empty() {
                            detector.observe(&text);
                        }
                    }

                    for event in events {
                        match event {
                            StreamEvent::Started => debug!("Command {} started", context.command_id),
                            StreamEvent::Line(raw) => lines.surface(hooks, raw, false),
                            StreamEvent::Finished(_) => {}
                        }
                    }

                    if let Some(code) = finished {
                        info!("Command {} exited with {}", context.command_id, code);
                        break CommandResult::completed(code);
                    }

                    half_line_at = match context.half_line_timeout {
                        Some(delay) if cursor.saw_start() && cursor.has_partial() => {
                            Some(Instant::now() + delay)
                        }
                        _ => None,
                    };
                }

                _ = half_line => {
                    half_line_at = None;
                    if let Some(partial) = cursor.release_partial() {
                        trace!("Releasing half line for {}", context.command_id);
                        lines.surface(hooks, partial, true);
                    }
                }
            }
        };

        finish(&context, hooks, detector, result)
    }
}

/// Fire completion hooks and release the detector
fn finish<H>(
    context: &ExecutionContext,
    hooks: &mut H,
    detector: Option<&dyn DetectorSink>,
    result: CommandResult,
) -> CommandResult
where
    H: RunnerHooks + ?Sized,
{
    if let Some(code) = result.exit_code {
        hooks.on_exit_code(code);
    }
    hooks.on_completed(&result);
    hooks.on_continue();
    if let Some(detector) = detector {
        detector.release();
    }
    debug!("Command {} resolved: {:?}", context.command_id, result);
    result
}
