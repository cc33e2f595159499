//! Error types for the perch-alerts crate.

use thiserror::Error;

/// Errors that can occur in the alerting system.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Invalid alert rule configuration.
    #[error("invalid alert rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// Alert rule with the given ID was not found.
    #[error("rule not found: {id}")]
    RuleNotFound {
        /// The rule ID that was not found.
        id: u64,
    },

    /// The rule repository failed.
    #[error("repository error: {reason}")]
    Repository {
        /// The reason the repository call failed.
        reason: String,
    },

    /// Notification delivery failed.
    #[error("notification failed: {reason}")]
    NotificationFailed {
        /// The reason the notification failed.
        reason: String,
    },

    /// An event bus handler reported a failure.
    #[error("handler '{handler}' failed: {reason}")]
    HandlerFailed {
        /// Name of the handler.
        handler: String,
        /// The reason the handler failed.
        reason: String,
    },

    /// A collaborator call exceeded its deadline.
    #[error("timed out: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// Invalid engine configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;
