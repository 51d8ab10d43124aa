//! Error types and reporting for worker stations.

use std::fmt;

/// Errors that can occur during station processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationError {
    /// The item was lost but the station keeps running.
    Recoverable(String),
    /// The station must shut down.
    Fatal(String),
}

impl StationError {
    pub fn message(&self) -> &str {
        match self {
            StationError::Recoverable(msg) | StationError::Fatal(msg) => msg,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Fatal(_))
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StationError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StationError {}

/// Trait for reporting station errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a station.
    fn report(&self, station: &str, error: &StationError);
}

/// Reporter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        match error {
            StationError::Recoverable(_) => log::warn!("[{}] {}", station, error),
            StationError::Fatal(_) => log::error!("[{}] {}", station, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_error_display() {
        let recoverable = StationError::Recoverable("short write".to_string());
        assert_eq!(recoverable.to_string(), "Recoverable error: short write");

        let fatal = StationError::Fatal("disk full".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: disk full");
    }

    #[test]
    fn test_message_and_fatality() {
        let fatal = StationError::Fatal("disk full".to_string());
        assert_eq!(fatal.message(), "disk full");
        assert!(fatal.is_fatal());
        assert!(!StationError::Recoverable("x".to_string()).is_fatal());
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        reporter.report("wav-writer", &StationError::Recoverable("test".to_string()));
        reporter.report("wav-writer", &StationError::Fatal("test".to_string()));
    }
}
