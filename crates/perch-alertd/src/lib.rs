//! perch-alertd library.
//!
//! Host pieces for running the Perch alerting engine as a standalone daemon:
//! JSON configuration, rule import/export, and a system metrics poller.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod poller;
pub mod rules;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use poller::{MetricSource, SysinfoSource, SystemMetricsPoller};
