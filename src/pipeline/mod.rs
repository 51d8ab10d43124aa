//! Worker-thread plumbing shared by the recording writers.
//!
//! A [`Station`] runs on its own named thread, pulls items from a bounded
//! channel and optionally forwards results downstream. Failures are routed
//! through an [`ErrorReporter`] so the owner decides what a dead worker means.

pub mod error;
pub mod station;

pub use error::{ErrorReporter, LogReporter, StationError};
pub use station::{Station, StationRunner};
