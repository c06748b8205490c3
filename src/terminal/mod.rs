//! Terminal Stream Processing
//!
//! Escape-sequence normalisation and the incremental line/marker decoder
//! shared by the runner and the detector.

pub mod ansi;
pub mod stream;

// Re-exports for convenience
pub use ansi::{strip_ansi, ScreenModeScanner, ScreenSegment};
pub use stream::{StreamCursor, StreamEvent};
