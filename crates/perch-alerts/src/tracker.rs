//! Sliding-window metric samples and the sustained-threshold check.
//!
//! Each metric keeps its own bounded buffer. Samples are evicted by age
//! relative to the newest recorded sample, then by count.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::types::ConditionOperator;

/// A single timestamped metric reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// The reading.
    pub value: f64,
    /// When it was taken.
    pub timestamp: DateTime<Utc>,
}

/// Per-metric bounded sample buffers.
#[derive(Debug, Default)]
pub struct MetricTracker {
    config: TrackerConfig,
    buffers: RwLock<HashMap<String, VecDeque<Sample>>>,
}

impl MetricTracker {
    /// Creates a tracker with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with the given limits.
    #[must_use]
    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            config,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the tracker limits.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Appends a sample, then evicts stale and excess samples from the front.
    pub fn record(&self, metric: &str, value: f64, timestamp: DateTime<Utc>) {
        let mut buffers = self.buffers.write();
        let samples = buffers.entry(metric.to_string()).or_default();
        samples.push_back(Sample { value, timestamp });

        if let Some(cutoff) = timestamp.checked_sub_signed(self.config.max_sample_age()) {
            while let Some(front) = samples.front() {
                if front.timestamp < cutoff {
                    samples.pop_front();
                } else {
                    break;
                }
            }
        }

        while samples.len() > self.config.max_samples {
            samples.pop_front();
        }
    }

    /// Returns true if `metric` satisfied `operator` against `threshold`
    /// for every sample in `[now - duration, now]`, and the window is covered.
    ///
    /// The window counts as covered when the earliest in-window sample is
    /// no later than the window start plus the configured grace. A zero
    /// duration degenerates to checking samples taken exactly at `now`.
    pub fn is_sustained(
        &self,
        metric: &str,
        operator: &ConditionOperator,
        threshold: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let Ok(threshold) = threshold.parse::<f64>() else {
            warn!(metric, threshold, "unparseable metric threshold");
            return false;
        };

        let Some(window_start) = now.checked_sub_signed(duration) else {
            return false;
        };

        let buffers = self.buffers.read();
        let Some(samples) = buffers.get(metric) else {
            return false;
        };

        let mut in_window = samples
            .iter()
            .filter(|s| s.timestamp >= window_start && s.timestamp <= now)
            .peekable();

        if in_window.peek().is_none() {
            debug!(metric, "no samples in sustain window");
            return false;
        }

        let earliest = in_window
            .clone()
            .map(|s| s.timestamp)
            .min()
            .unwrap_or(now);
        let deadline = window_start
            .checked_add_signed(self.grace(duration))
            .unwrap_or(now);
        if earliest > deadline {
            debug!(metric, %earliest, %deadline, "sustain window not covered");
            return false;
        }

        in_window.all(|s| operator.compare(s.value, threshold))
    }

    /// Returns the number of samples held for `metric`.
    #[must_use]
    pub fn sample_count(&self, metric: &str) -> usize {
        self.buffers.read().get(metric).map_or(0, VecDeque::len)
    }

    /// Returns a copy of the samples held for `metric`, oldest first.
    #[must_use]
    pub fn samples(&self, metric: &str) -> Vec<Sample> {
        self.buffers
            .read()
            .get(metric)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drops every buffer.
    pub fn clear(&self) {
        self.buffers.write().clear();
    }

    fn grace(&self, duration: Duration) -> Duration {
        let percent = i64::from(self.config.coverage_grace_percent.min(100));
        let millis = duration.num_milliseconds().saturating_mul(percent) / 100;
        Duration::try_milliseconds(millis).unwrap_or(duration)
    }
}
