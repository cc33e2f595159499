//! Notification delivery collaborators.
//!
//! This module provides the [`Notifier`] trait used by the `bell` action
//! target, and a [`LogNotifier`] that delivers to `tracing`.

use std::fmt;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;

/// Delivers rendered bell notifications to users.
///
/// Implement this trait to connect the alert engine to an in-app
/// notification service, a push gateway, or anything else.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Returns the name of this notifier.
    fn name(&self) -> &str;

    /// Creates a notification and broadcasts it to connected clients.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if delivery fails.
    async fn create_and_broadcast(&self, title: &str, message: &str) -> Result<()>;

    /// Returns true if this notifier is enabled.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// A notifier that writes notifications to the log.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    name: String,
    enabled: bool,
}

impl LogNotifier {
    /// Creates a new log notifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    /// Sets whether the notifier is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_and_broadcast(&self, title: &str, message: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        if message.is_empty() {
            warn!(notifier = %self.name, title, "ALERT");
        } else {
            warn!(notifier = %self.name, title, message, "ALERT");
        }
        info!(notifier = %self.name, "notification logged");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_notifier_new() {
        let notifier = LogNotifier::new("debug-log");
        assert_eq!(notifier.name(), "debug-log");
        assert!(notifier.is_enabled());
    }

    #[test]
    fn log_notifier_default() {
        let notifier = LogNotifier::default();
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn log_notifier_disabled() {
        let notifier = LogNotifier::default().enabled(false);
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn log_notifier_send() {
        let notifier = LogNotifier::default();
        let result = notifier
            .create_and_broadcast("Alert: New species", "Eurasian Blue Tit")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn disabled_log_notifier_is_noop() {
        let notifier = LogNotifier::default().enabled(false);
        assert!(notifier.create_and_broadcast("t", "m").await.is_ok());
    }
}
