//! Output Line Model
//!
//! A single line surfaced by the runner after the start marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a single surfaced line of command output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLine {
    /// Display text (escape sequences removed, then transformed by the caller)
    pub text: String,

    /// The line as it arrived, escape sequences included
    pub raw: String,

    /// Position in the surfaced output
    pub line_number: usize,

    /// Released by the half-line timer rather than a newline
    pub partial: bool,

    /// When this line was surfaced
    pub timestamp: DateTime<Utc>,
}

impl OutputLine {
    /// Create a new output line
    pub fn new(text: String, raw: String, line_number: usize) -> Self {
        Self {
            text,
            raw,
            line_number,
            partial: false,
            timestamp: Utc::now(),
        }
    }

    /// Mark as released without a trailing newline
    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Check if the line has no visible content
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
