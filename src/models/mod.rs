//! Core data models for shellsentry
//!
//! Per-command records owned by the runner, the line type it surfaces, and
//! the interaction contract shared with the human-facing arbiter.

pub mod execution;
pub mod interaction;
pub mod output_line;

// Re-exports for convenience
pub use execution::{CommandResult, ExecutionContext, MarkerPair};
pub use interaction::{Classification, InteractionRequest, InteractionResponse, InteractionType};
pub use output_line::OutputLine;
