//! Error types for the alerting daemon.

use thiserror::Error;

use perch_alerts::AlertError;

/// Errors that can occur while setting up or running the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A rules file could not be loaded.
    #[error("rules file error: {0}")]
    RulesFile(String),

    /// Error from the alerting library.
    #[error(transparent)]
    Alerting(#[from] AlertError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;
