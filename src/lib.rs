//! evilsdr - real-time SDR receiver engine
//!
//! Demodulates an IQ stream from an rtl_tcp tuner (or a file, or a synthetic
//! source), streams audio and spectrum to control clients, scans ranges and
//! bookmarks for activity and records audio and raw IQ to disk.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod bookmarks;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod control;
pub mod defaults;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod recording;
pub mod scanner;
pub mod source;
pub mod streaming;

// Core traits (source -> process -> sink)
pub use bookmarks::BookmarkStore;
pub use control::CommandHandler;
pub use source::SampleSource;

// Engine
pub use control::ControlSurface;
pub use engine::{Engine, EngineContext, EngineSettings};

// Error handling
pub use error::{Result, SdrError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::{ErrorReporter, Station, StationError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
