//! Error types for evilsdr.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdrError {
    // Tuner / sample source errors (fatal to the running engine)
    #[error("Tuner connection failed: {message}")]
    Connection { message: String },

    // Invalid parameters (rejected synchronously, no state change)
    #[error("Invalid request: {message}")]
    Configuration { message: String },

    // Configuration file errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Recording errors (stop the session, never the engine)
    #[error("Recording ({kind}) failed: {message}")]
    RecordingIo { kind: String, message: String },

    // Control boundary errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Control socket error: {message}")]
    ControlSocket { message: String },

    #[error("Control connection failed: {message}")]
    ControlConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SdrError {
    /// Shorthand for a [`SdrError::Configuration`] rejection.
    pub fn config(message: impl Into<String>) -> Self {
        SdrError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a [`SdrError::Connection`] failure.
    pub fn connection(message: impl Into<String>) -> Self {
        SdrError::Connection {
            message: message.into(),
        }
    }

    /// Category reported in the `ERROR` event's `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            SdrError::Connection { .. } => "connection",
            SdrError::Configuration { .. }
            | SdrError::ConfigFileNotFound { .. }
            | SdrError::ConfigParse { .. }
            | SdrError::ConfigInvalidValue { .. }
            | SdrError::Config(_) => "configuration",
            SdrError::RecordingIo { .. } => "recording_io",
            SdrError::Protocol { .. }
            | SdrError::ControlSocket { .. }
            | SdrError::ControlConnection { .. } => "protocol",
            SdrError::Io(_) => "io",
            SdrError::Other(_) => "other",
        }
    }

    /// Only a lost sample source ends the engine instance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SdrError::Connection { .. })
    }
}

pub type Result<T> = std::result::Result<T, SdrError>;
