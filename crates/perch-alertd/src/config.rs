//! Daemon configuration.
//!
//! The daemon reads a single JSON file:
//! - `alerting`: engine, bus and tracker settings
//! - `poll_interval_secs`: how often system metrics are sampled
//! - `rules_file`: optional JSON file with extra rules to load at startup

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use perch_alerts::AlertingConfig;

use crate::error::{DaemonError, Result};

/// Default path of the daemon config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/perch/alertd.json";

/// Main daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Alerting subsystem settings.
    pub alerting: AlertingConfig,
    /// System metrics polling interval in seconds.
    pub poll_interval_secs: u64,
    /// Whether to poll system metrics at all.
    pub poll_system_metrics: bool,
    /// Mount point whose usage feeds the disk metric.
    pub disk_mount_point: PathBuf,
    /// Additional rules to create at startup.
    pub rules_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            alerting: AlertingConfig::default(),
            poll_interval_secs: 10,
            poll_system_metrics: true,
            disk_mount_point: PathBuf::from("/"),
            rules_file: None,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DaemonError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| DaemonError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DaemonError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(DaemonError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.disk_mount_point.as_os_str().is_empty() {
            return Err(DaemonError::Config(
                "disk_mount_point cannot be empty".to_string(),
            ));
        }

        self.alerting.validate()?;
        Ok(())
    }

    /// Returns the polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
