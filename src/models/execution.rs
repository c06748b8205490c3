//! Execution Model
//!
//! The immutable per-command record handed to the runner and the single
//! result it produces.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Sentinel tokens delimiting a command's output in the session stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPair {
    /// Printed by the shell before the command runs
    pub start: String,
    /// Printed after the command as `<end>:<exitcode>`
    pub end: String,
}

impl MarkerPair {
    /// Use caller-chosen markers
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let pair = Self {
            start: start.into(),
            end: end.into(),
        };
        pair.validate()?;
        Ok(pair)
    }

    /// Generate a fresh namespace-prefixed pair from a random UUID
    pub fn generate(namespace: &str) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self {
            start: format!("{}_S_{}", namespace, token),
            end: format!("{}_E_{}", namespace, token),
        }
    }

    fn validate(&self) -> Result<()> {
        for marker in [&self.start, &self.end] {
            if marker.is_empty() {
                return Err(Error::InvalidMarker {
                    marker: marker.clone(),
                    reason: "marker is empty".to_string(),
                });
            }
            if marker.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(Error::InvalidMarker {
                    marker: marker.clone(),
                    reason: "marker contains whitespace or control characters".to_string(),
                });
            }
        }
        if self.start == self.end {
            return Err(Error::InvalidMarker {
                marker: self.start.clone(),
                reason: "start and end markers must differ".to_string(),
            });
        }
        if self.end.starts_with(&self.start) || self.start.starts_with(&self.end) {
            return Err(Error::InvalidMarker {
                marker: self.end.clone(),
                reason: "one marker must not be a prefix of the other".to_string(),
            });
        }
        Ok(())
    }
}

/// Immutable record describing one command run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub command_id: String,
    pub task_id: Option<String>,
    /// The command as the caller wrote it
    pub command: String,
    /// What is actually written to the session
    pub wrapped_command: String,
    pub markers: MarkerPair,
    pub timeout: Duration,
    pub half_line_timeout: Option<Duration>,
}

impl ExecutionContext {
    /// Build a context, wrapping the command with the marker protocol
    pub fn new(
        command: &str,
        markers: MarkerPair,
        timeout: Duration,
        half_line_timeout: Option<Duration>,
    ) -> Result<Self> {
        let trimmed = command.trim().trim_end_matches(';').trim_end();
        if trimmed.is_empty() {
            return Err(Error::EmptyCommand);
        }
        markers.validate()?;

        Ok(Self {
            command_id: Uuid::new_v4().to_string(),
            task_id: None,
            command: trimmed.to_string(),
            wrapped_command: wrap_command(trimmed, &markers),
            markers,
            timeout,
            half_line_timeout,
        })
    }

    /// Attach the orchestration task this command belongs to
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Override the generated command id
    pub fn with_command_id(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = command_id.into();
        self
    }

    /// Bytes written to the session, including the submitting newline
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = self.wrapped_command.clone().into_bytes();
        bytes.push(b'\n');
        bytes
    }
}

/// `echo <start>; <cmd>; echo <end>:$?`
///
/// A command sent to the background already ends in a separator, so the end
/// echo follows it directly: `echo <start>; <cmd> & echo <end>:$?`.
fn wrap_command(command: &str, markers: &MarkerPair) -> String {
    let separator = if is_backgrounded(command) { " " } else { "; " };
    format!(
        "echo {}; {}{}echo {}:$?",
        markers.start, command, separator, markers.end
    )
}

/// Ends in a lone `&` rather than `&&` or an escaped `\&`
fn is_backgrounded(command: &str) -> bool {
    match command.strip_suffix('&') {
        Some(rest) => !rest.ends_with('&') && !rest.ends_with('\\'),
        None => false,
    }
}

/// Terminal outcome of a command run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub completed: bool,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    /// The end marker arrived with an exit code
    pub fn completed(exit_code: i32) -> Self {
        Self {
            completed: true,
            timed_out: false,
            exit_code: Some(exit_code),
        }
    }

    /// No end marker before the deadline
    pub fn timed_out() -> Self {
        Self {
            completed: false,
            timed_out: true,
            exit_code: None,
        }
    }

    /// The session went away before the command finished
    pub fn abandoned() -> Self {
        Self {
            completed: false,
            timed_out: false,
            exit_code: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.completed && self.exit_code == Some(0)
    }
}
