//! Interaction Detection
//!
//! Watches the same output the runner consumes and decides, per command,
//! whether a human is needed: a prompt waiting on input, a pager waiting on
//! a keypress, or a full-screen program that has gone quiet.
//!
//! The detector is a plain state machine. Time is passed in by the caller,
//! and silence and the hard timeout are checked by a recurring [`tick`]
//! against last-activity timestamps rather than by per-chunk timers.
//!
//! [`tick`]: InteractionDetector::tick

pub mod driver;
pub mod events;

pub use driver::DetectorHandle;
pub use events::{DetectorEvent, InteractionEventBus, InteractionSubscription};

use crate::config::DetectorConfig;
use crate::models::{Classification, InteractionRequest, InteractionResponse, InteractionType};
use crate::taxonomy::patterns::{extract_menu, QuickPattern};
use crate::taxonomy::{CommandProfile, Taxonomy};
use crate::terminal::{ScreenModeScanner, ScreenSegment};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::time::Instant;

/// Completed lines kept for menu extraction
const RECENT_LINE_LIMIT: usize = 32;

/// Longest unterminated line kept for prompt matching
const TAIL_LIMIT: usize = 1024;

/// Longest prompt hint handed to the arbiter
const HINT_LIMIT: usize = 200;

/// Ctrl-C
const INTERRUPT: u8 = 0x03;

/// Timestamps for one alternate-screen session of an auto-cancellable program
#[derive(Debug, Clone, Copy)]
struct TuiTimers {
    entered_at: Instant,
    last_activity: Instant,
}

/// Per-command interaction state
#[derive(Debug)]
pub struct InteractionDetector {
    command_id: String,
    task_id: Option<String>,
    profile: CommandProfile,
    taxonomy: Arc<Taxonomy>,
    config: DetectorConfig,
    events: InteractionEventBus,
    scanner: ScreenModeScanner,

    in_alternate_screen: bool,
    is_suppressed: bool,
    finished: bool,
    disposed: bool,
    /// Set once `tui-detected` fired for the current screen session
    tui_reported: bool,
    timers: Option<TuiTimers>,

    /// Text after the last newline, escape sequences removed
    tail: String,
    recent_lines: VecDeque<String>,
    /// Identifies the prompt last raised on the current line
    last_output_hash: Option<u64>,
    pending: Option<InteractionRequest>,
}

impl InteractionDetector {
    /// Create a detector for one command
    ///
    /// The command is classified once, here.
    pub fn new(
        command_id: impl Into<String>,
        task_id: Option<String>,
        command: &str,
        taxonomy: Arc<Taxonomy>,
        config: DetectorConfig,
        events: InteractionEventBus,
    ) -> Self {
        let command_id = command_id.into();
        let profile = taxonomy.classify(command);
        debug!(
            "Command {} classified as {:?} (program {:?})",
            command_id, profile.classification, profile.program
        );

        Self {
            command_id,
            task_id,
            profile,
            taxonomy,
            config,
            events,
            scanner: ScreenModeScanner::new(),
            in_alternate_screen: false,
            is_suppressed: false,
            finished: false,
            disposed: false,
            tui_reported: false,
            timers: None,
            tail: String::new(),
            recent_lines: VecDeque::new(),
            last_output_hash: None,
            pending: None,
        }
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    /// `None` for pager commands
    pub fn classification(&self) -> Option<Classification> {
        self.profile.classification
    }

    pub fn profile(&self) -> &CommandProfile {
        &self.profile
    }

    pub fn in_alternate_screen(&self) -> bool {
        self.in_alternate_screen
    }

    pub fn is_suppressed(&self) -> bool {
        self.is_suppressed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether output is still being watched
    pub fn is_active(&self) -> bool {
        !self.disposed && !self.finished
    }

    /// The request waiting on a response, if any
    pub fn pending_request(&self) -> Option<&InteractionRequest> {
        self.pending.as_ref()
    }

    /// Subscribe to this detector's events without loss
    pub fn subscribe(&self) -> InteractionSubscription {
        self.events.subscribe_ordered()
    }

    /// Feed one decoded chunk of session output
    pub fn process_output(&mut self, chunk: &str, now: Instant) {
        if !self.is_active() || chunk.is_empty() {
            return;
        }

        for segment in self.scanner.scan(chunk) {
            match segment {
                ScreenSegment::EnterAlternate => self.enter_alternate_screen(now),
                ScreenSegment::ExitAlternate => self.exit_alternate_screen(),
                ScreenSegment::Text(text) => self.observe_text(&text),
            }
        }

        if let Some(timers) = self.timers.as_mut() {
            timers.last_activity = now;
        }
    }

    /// Check silence and the hard timeout
    pub fn tick(&mut self, now: Instant) {
        if !self.is_active() || self.tui_reported {
            return;
        }
        let Some(timers) = self.timers else {
            return;
        };

        let message = if now.saturating_duration_since(timers.last_activity) >= self.config.silence() {
            format!(
                "No output for {}ms in full-screen program",
                self.config.tui_cancel_silence_ms
            )
        } else if now.saturating_duration_since(timers.entered_at) >= self.config.hard_timeout() {
            format!(
                "Full-screen program still running after {}ms",
                self.config.tui_hard_timeout_ms
            )
        } else {
            return;
        };

        info!("TUI detected for command {}: {}", self.command_id, message);
        self.tui_reported = true;
        self.events.publish(DetectorEvent::TuiDetected {
            command_id: self.command_id.clone(),
            task_id: self.task_id.clone(),
            message,
        });
    }

    /// Stop raising interaction requests for the rest of this command
    pub fn suppress(&mut self) {
        if self.is_suppressed || self.disposed {
            return;
        }
        info!("Interaction requests suppressed for command {}", self.command_id);
        self.is_suppressed = true;
        self.pending = None;
        self.events.publish(DetectorEvent::InteractionSuppressed {
            command_id: self.command_id.clone(),
        });
    }

    /// The end marker arrived; stop watching and report completion
    pub fn command_finished(&mut self, exit_code: Option<i32>) {
        if !self.is_active() {
            return;
        }
        debug!("Command {} finished with {:?}", self.command_id, exit_code);
        self.finished = true;
        self.timers = None;
        self.pending = None;
        self.events.publish(DetectorEvent::CommandCompleted {
            command_id: self.command_id.clone(),
            exit_code,
        });
    }

    /// Drop all timers and state; safe to call more than once
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        debug!("Disposing detector for command {}", self.command_id);
        self.disposed = true;
        self.timers = None;
        self.pending = None;
        self.tail.clear();
        self.recent_lines.clear();
        self.scanner.reset();
    }

    /// Consume the pending request with this response
    ///
    /// Returns the bytes to write to the session, or `None` when no request
    /// is pending for this command or the response answers a different kind
    /// of question. Each request accepts at most one response.
    pub fn take_response_bytes(&mut self, response: &InteractionResponse) -> Option<Vec<u8>> {
        if response.command_id != self.command_id {
            return None;
        }
        let pending = self.pending.as_ref()?;
        if response
            .interaction_type
            .is_some_and(|kind| kind != pending.interaction_type)
        {
            warn!(
                "Response for {} answers {:?}, pending request is {}",
                self.command_id, response.interaction_type, pending.interaction_type
            );
            return None;
        }

        self.pending = None;
        Some(response.to_bytes())
    }

    /// Input that backs out of whatever is waiting
    ///
    /// The pending request's exit key when it has one, otherwise Ctrl-C.
    pub fn cancel_bytes(&self) -> Vec<u8> {
        match self.pending.as_ref().and_then(|p| p.exit_key.as_ref()) {
            Some(key) => {
                let mut bytes = key.clone().into_bytes();
                if self
                    .pending
                    .as_ref()
                    .and_then(|p| p.exit_append_newline)
                    .unwrap_or(false)
                {
                    bytes.push(b'\n');
                }
                bytes
            }
            None => vec![INTERRUPT],
        }
    }

    fn enter_alternate_screen(&mut self, now: Instant) {
        if self.in_alternate_screen {
            return;
        }
        self.in_alternate_screen = true;
        self.clear_prompt_state();

        if self.profile.is_pager() {
            debug!("Pager {} entered alternate screen", self.command_id);
            return;
        }

        let auto_cancel = self.profile.auto_cancel();
        info!(
            "Command {} entered alternate screen (auto-cancel: {})",
            self.command_id, auto_cancel
        );
        self.tui_reported = false;
        self.timers = auto_cancel.then_some(TuiTimers {
            entered_at: now,
            last_activity: now,
        });
        self.events.publish(DetectorEvent::AlternateScreenEntered {
            command_id: self.command_id.clone(),
            task_id: self.task_id.clone(),
            auto_cancel,
        });
    }

    fn exit_alternate_screen(&mut self) {
        if !self.in_alternate_screen {
            return;
        }
        debug!("Command {} left alternate screen", self.command_id);
        self.in_alternate_screen = false;
        self.timers = None;
        self.tui_reported = false;
        self.clear_prompt_state();
    }

    fn clear_prompt_state(&mut self) {
        self.pending = None;
        self.last_output_hash = None;
        self.tail.clear();
        self.recent_lines.clear();
    }

    fn observe_text(&mut self, text: &str) {
        let mut pieces = text.split('\n');
        if let Some(first) = pieces.next() {
            self.push_tail(first);
        }
        for piece in pieces {
            let line = std::mem::take(&mut self.tail);
            self.push_recent(line.trim_end_matches('\r').to_string());
            // A new line means the previous prompt line is behind us.
            self.last_output_hash = None;
            self.pending = None;
            self.push_tail(piece);
        }

        if self.tail.trim().is_empty() {
            return;
        }

        // Pager status lines inside a pager screen take precedence over prompts.
        if self.in_alternate_screen && self.profile.is_pager() && self.check_pager_cue() {
            return;
        }
        self.check_prompt();
    }

    fn check_prompt(&mut self) {
        let taxonomy = self.taxonomy.clone();
        let Some(pattern) = taxonomy.match_prompt(&self.tail) else {
            return;
        };
        let request = self.request_from_pattern(pattern);
        self.raise(request);
    }

    fn check_pager_cue(&mut self) -> bool {
        if !self.taxonomy.is_pager_cue(&self.tail) {
            return false;
        }
        let request = self.request(InteractionType::Pager, Some("q"), Some(false));
        self.raise(request);
        true
    }

    fn request_from_pattern(&self, pattern: &QuickPattern) -> InteractionRequest {
        let mut request = self.request(
            pattern.interaction_type,
            pattern.exit_key,
            pattern.exit_append_newline,
        );
        request.confirm_values = pattern
            .confirm_values
            .map(|values| values.iter().map(|v| v.to_string()).collect());

        if pattern.interaction_type == InteractionType::Select {
            if let Some((labels, values)) =
                extract_menu(self.recent_lines.iter().map(String::as_str))
            {
                request.options = Some(labels);
                request.option_values = Some(values);
            }
        }
        trace!("Prompt {} matched for {}", pattern.name, self.command_id);
        request
    }

    fn request(
        &self,
        interaction_type: InteractionType,
        exit_key: Option<&str>,
        exit_append_newline: Option<bool>,
    ) -> InteractionRequest {
        InteractionRequest {
            command_id: self.command_id.clone(),
            task_id: self.task_id.clone(),
            interaction_type,
            prompt_hint: prompt_hint(&self.tail),
            options: None,
            option_values: None,
            confirm_values: None,
            exit_key: exit_key.map(str::to_string),
            exit_append_newline,
        }
    }

    fn raise(&mut self, request: InteractionRequest) {
        let hash = prompt_hash(request.interaction_type, &request.prompt_hint);
        if self.last_output_hash == Some(hash) {
            return;
        }
        self.last_output_hash = Some(hash);

        if self.is_suppressed {
            debug!(
                "Suppressed {} prompt for command {}",
                request.interaction_type, self.command_id
            );
            return;
        }

        info!(
            "Interaction needed for command {}: {}",
            self.command_id, request.interaction_type
        );
        self.pending = Some(request.clone());
        self.events.publish(DetectorEvent::InteractionNeeded(request));
    }

    fn push_recent(&mut self, line: String) {
        if self.recent_lines.len() == RECENT_LINE_LIMIT {
            self.recent_lines.pop_front();
        }
        self.recent_lines.push_back(line);
    }

    fn push_tail(&mut self, text: &str) {
        self.tail.push_str(text);
        // A carriage return followed by more text redraws the line.
        if let Some(cr) = self.tail.trim_end_matches('\r').rfind('\r') {
            self.tail.drain(..=cr);
        }
        self.cap_tail();
    }

    fn cap_tail(&mut self) {
        if self.tail.len() <= TAIL_LIMIT {
            return;
        }
        let mut cut = self.tail.len() - TAIL_LIMIT;
        while !self.tail.is_char_boundary(cut) {
            cut += 1;
        }
        self.tail.drain(..cut);
    }
}

fn prompt_hint(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(HINT_LIMIT) {
        Some((end, _)) => trimmed[..end].to_string(),
        None => trimmed.to_string(),
    }
}

fn prompt_hash(interaction_type: InteractionType, hint: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    interaction_type.hash(&mut hasher);
    hint.hash(&mut hasher);
    hasher.finish()
}
