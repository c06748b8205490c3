//! shellsentry - command running and interaction detection for remote shells
//!
//! An automation agent driving a live shell session needs two answers for
//! every command it sends: what the command printed and how it exited, and
//! whether the shell is currently waiting on a human.
//!
//! ## Module Organization
//!
//! ### Command Running
//!
//! - [`runner`] - Marker-wrapped command execution over a session
//! - [`session`] - Duplex byte channel and submission result codes
//! - [`terminal`] - Escape-sequence handling and the incremental marker decoder
//!
//! ### Interaction Detection
//!
//! - [`detector`] - Per-command prompt, pager and full-screen detection
//! - [`taxonomy`] - Shared command classification and prompt pattern tables
//!
//! ### Support
//!
//! - [`config`] - Runner and detector tunables, file loading
//! - [`models`] - Execution context, results, interaction wire types
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use shellsentry::{
//!     CommandRunner, Config, DetectorHandle, InteractionDetector, LineCollector, SessionStream,
//!     Taxonomy,
//! };
//!
//! # async fn run(mut session: SessionStream) -> shellsentry::Result<()> {
//! let config = Config::default();
//! let runner = CommandRunner::new(config.runner.clone());
//! let context = runner.prepare("apt-get upgrade", None)?;
//!
//! let bus = shellsentry::InteractionEventBus::default();
//! let mut events = bus.subscribe_ordered();
//! let detector = DetectorHandle::spawn(
//!     InteractionDetector::new(
//!         context.command_id.clone(),
//!         None,
//!         &context.command,
//!         Taxonomy::for_config(&config.detector),
//!         config.detector.clone(),
//!         bus,
//!     ),
//!     config.detector.tick_interval(),
//! );
//!
//! let mut lines = LineCollector::default();
//! let result = runner.run(&mut session, context, &mut lines, Some(&detector)).await;
//! while let Some(event) = events.try_recv() {
//!     println!("{}", event.name());
//! }
//! println!("{:?}", result);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Each runner/detector pair is driven by one session's output plus a
//! detector tick task. Pairs share nothing but the read-only [`Taxonomy`].

#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;

// Core modules
pub mod detector;
pub mod runner;
pub mod session;
pub mod taxonomy;
pub mod terminal;

// Model modules
pub mod models;

// Re-exports for core functionality
pub use config::{Config, DetectorConfig, RunnerConfig};
pub use error::{Error, Result};

// Convenience re-exports for common types
pub use config::loader::ConfigLoader;
pub use detector::{
    DetectorEvent, DetectorHandle, InteractionDetector, InteractionEventBus,
    InteractionSubscription,
};
pub use models::{
    Classification, CommandResult, ExecutionContext, InteractionRequest, InteractionResponse,
    InteractionType, MarkerPair, OutputLine,
};
pub use runner::{CommandRunner, DetectorSink, LineCollector, RunnerHooks};
pub use session::{SessionStream, SubmitResult};
pub use taxonomy::{CommandProfile, Taxonomy};

// Version information
/// The current version of shellsentry from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Load configuration from the default search paths, falling back to defaults
pub fn load_config() -> Config {
    match ConfigLoader::load() {
        Ok(config) => {
            info!("Configuration loaded from default location");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    }
}
