//! Test Utilities
//!
//! Shared helpers for the integration, unit and property tests. Each test
//! target pulls in the pieces it needs, so not every helper is used
//! everywhere.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;
pub use mock_session::{MockSession, MockTransport};
