//! Configuration management for shellsentry
//!
//! Runner and detector tunables. Every field is optional in a config file;
//! missing fields fall back to the documented defaults below.

pub mod loader;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command runner configuration
    pub runner: RunnerConfig,

    /// Interaction detector configuration
    pub detector: DetectorConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.runner.validate()?;
        self.detector.validate()?;
        Ok(())
    }
}

/// Command runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout applied when a command does not ask for one
    pub initial_timeout_ms: u64,

    /// Upper bound for any requested timeout
    pub max_timeout_ms: u64,

    /// Release a line held without a trailing newline after this much silence.
    /// `None` or zero disables the release.
    pub half_line_timeout_ms: Option<u64>,

    /// Maximum number of lines surfaced per command
    pub max_lines: usize,

    /// Maximum length of a single buffered line before it is force-split
    pub line_buffer_max_length: usize,

    /// Prefix used when generating sentinel markers
    pub marker_namespace: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: 30_000,
            max_timeout_ms: 600_000,
            half_line_timeout_ms: Some(500),
            max_lines: 10_000,
            line_buffer_max_length: 64 * 1024,
            marker_namespace: "__SHSN".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Validate the runner configuration
    pub fn validate(&self) -> Result<()> {
        if self.initial_timeout_ms == 0 {
            return Err(validation_error(
                "runner.initial_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.max_timeout_ms < self.initial_timeout_ms {
            return Err(validation_error(
                "runner.max_timeout_ms",
                "must not be lower than runner.initial_timeout_ms",
            ));
        }
        if self.max_lines == 0 {
            return Err(validation_error(
                "runner.max_lines",
                "must be greater than zero",
            ));
        }
        if self.line_buffer_max_length < 80 {
            return Err(validation_error(
                "runner.line_buffer_max_length",
                "must be at least 80 bytes",
            ));
        }
        if self.marker_namespace.is_empty()
            || self.marker_namespace.chars().any(char::is_whitespace)
        {
            return Err(validation_error(
                "runner.marker_namespace",
                "must be a non-empty token without whitespace",
            ));
        }
        Ok(())
    }

    /// Resolve the effective timeout for a command
    ///
    /// Falls back to the initial timeout and never exceeds the maximum.
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(self.initial_timeout_ms)
            .min(self.max_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Half-line release delay, if enabled
    pub fn half_line_timeout(&self) -> Option<Duration> {
        self.half_line_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Interaction detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Silence inside the alternate screen before a TUI is handed to a human
    pub tui_cancel_silence_ms: u64,

    /// Unconditional bound on an auto-cancellable TUI session
    pub tui_hard_timeout_ms: u64,

    /// Period of the timer tick driving silence and hard-timeout checks
    pub tick_interval_ms: u64,

    /// Extra programs always treated as full-screen
    pub extra_always_tui: Vec<String>,

    /// Extra programs treated as pagers
    pub extra_pagers: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tui_cancel_silence_ms: 3_000,
            tui_hard_timeout_ms: 15_000,
            tick_interval_ms: 100,
            extra_always_tui: Vec::new(),
            extra_pagers: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Validate the detector configuration
    pub fn validate(&self) -> Result<()> {
        if self.tui_cancel_silence_ms == 0 {
            return Err(validation_error(
                "detector.tui_cancel_silence_ms",
                "must be greater than zero",
            ));
        }
        if self.tui_hard_timeout_ms == 0 {
            return Err(validation_error(
                "detector.tui_hard_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(validation_error(
                "detector.tick_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn silence(&self) -> Duration {
        Duration::from_millis(self.tui_cancel_silence_ms)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.tui_hard_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn validation_error(field: &str, reason: &str) -> Error {
    Error::ConfigValidationFailed {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
