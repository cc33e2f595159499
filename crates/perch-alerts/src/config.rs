//! Alerting configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// Configuration for the metric tracker's sliding windows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum samples retained per metric.
    pub max_samples: usize,
    /// Samples older than this, relative to the newest sample, are evicted.
    pub max_sample_age_secs: u64,
    /// How late the first in-window sample may be, as a percentage of the
    /// sustain duration, before the window counts as not covered.
    pub coverage_grace_percent: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_samples: 120,
            max_sample_age_secs: 30 * 60,
            coverage_grace_percent: 20,
        }
    }
}

impl TrackerConfig {
    /// Returns the maximum sample age.
    #[must_use]
    pub fn max_sample_age(&self) -> chrono::Duration {
        i64::try_from(self.max_sample_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Validate the tracker configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.max_samples == 0 {
            return Err(invalid("tracker.max_samples must be greater than 0"));
        }
        if self.max_sample_age_secs == 0 {
            return Err(invalid("tracker.max_sample_age_secs must be greater than 0"));
        }
        if self.coverage_grace_percent > 100 {
            return Err(invalid("tracker.coverage_grace_percent cannot exceed 100"));
        }
        Ok(())
    }
}

/// Configuration for the alerting subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertingConfig {
    /// Capacity of the event bus queue.
    pub bus_capacity: usize,
    /// Days of alert history to keep. `<= 0` disables cleanup.
    pub history_retention_days: i64,
    /// How often history cleanup runs.
    pub cleanup_interval_secs: u64,
    /// Deadline for persisting one history record.
    pub save_history_timeout_ms: u64,
    /// Deadline for one cleanup pass.
    pub cleanup_timeout_ms: u64,
    /// Deadline for one bell notification.
    pub notify_timeout_ms: u64,
    /// Whether built-in rules are seeded at startup.
    pub seed_default_rules: bool,
    /// Metric tracker settings.
    pub tracker: TrackerConfig,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 1000,
            history_retention_days: 30,
            cleanup_interval_secs: 60 * 60,
            save_history_timeout_ms: 3000,
            cleanup_timeout_ms: 5000,
            notify_timeout_ms: 5000,
            seed_default_rules: true,
            tracker: TrackerConfig::default(),
        }
    }
}

impl AlertingConfig {
    /// Returns the cleanup interval.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Returns the history save deadline.
    #[must_use]
    pub const fn save_history_timeout(&self) -> Duration {
        Duration::from_millis(self.save_history_timeout_ms)
    }

    /// Returns the cleanup deadline.
    #[must_use]
    pub const fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    /// Returns the notification deadline.
    #[must_use]
    pub const fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.bus_capacity == 0 {
            return Err(invalid("bus_capacity must be greater than 0"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(invalid("cleanup_interval_secs must be greater than 0"));
        }
        if self.save_history_timeout_ms == 0 {
            return Err(invalid("save_history_timeout_ms must be greater than 0"));
        }
        if self.cleanup_timeout_ms == 0 {
            return Err(invalid("cleanup_timeout_ms must be greater than 0"));
        }
        if self.notify_timeout_ms == 0 {
            return Err(invalid("notify_timeout_ms must be greater than 0"));
        }
        self.tracker.validate()
    }
}

fn invalid(reason: &str) -> AlertError {
    AlertError::InvalidConfig {
        reason: reason.to_string(),
    }
}
