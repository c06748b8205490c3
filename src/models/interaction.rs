//! Interaction Model
//!
//! Wire contract with the human arbiter: what the detector asks and what
//! comes back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a command is treated by full-screen auto-cancel logic
///
/// Pager-whitelisted commands carry no classification (`None`) and are
/// handled by pager cue scanning instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Unconditionally interactive (editors, multiplexers)
    Always,
    /// Interactive unless a non-interactive flag is present
    Conditional,
    /// Everything else; never auto-cancelled
    NonBlacklist,
}

impl Classification {
    /// Whether a full-screen session of this class may be auto-cancelled
    pub fn auto_cancel(self) -> bool {
        matches!(self, Classification::Always | Classification::Conditional)
    }
}

/// Kind of input the shell is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Confirm,
    Select,
    Password,
    Pager,
    Enter,
    Freeform,
}

impl InteractionType {
    /// Check if input should be hidden
    pub fn is_secret(self) -> bool {
        matches!(self, InteractionType::Password)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionType::Confirm => "confirm",
            InteractionType::Select => "select",
            InteractionType::Password => "password",
            InteractionType::Pager => "pager",
            InteractionType::Enter => "enter",
            InteractionType::Freeform => "freeform",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Question raised for a human
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub command_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub interaction_type: InteractionType,
    /// Human-readable description of what is being asked
    pub prompt_hint: String,
    /// Labels for a menu or confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Values sent for each entry of `options`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_values: Option<Vec<String>>,
    /// Accepted answers for a confirmation, positive first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_values: Option<Vec<String>>,
    /// Program-specific quit input to send instead of an interrupt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_append_newline: Option<bool>,
}

/// Answer produced by the human arbiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResponse {
    pub command_id: String,
    pub input: String,
    pub append_newline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<InteractionType>,
}

impl InteractionResponse {
    pub fn new(command_id: impl Into<String>, input: impl Into<String>, append_newline: bool) -> Self {
        Self {
            command_id: command_id.into(),
            input: input.into(),
            append_newline,
            interaction_type: None,
        }
    }

    /// Bytes to write back to the session
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.input.clone().into_bytes();
        if self.append_newline {
            bytes.push(b'\n');
        }
        bytes
    }
}
