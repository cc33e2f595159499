//! System metrics polling.
//!
//! Samples CPU, memory and disk usage and publishes each reading as a
//! `system` metric event through a [`BusHandle`].

use std::path::PathBuf;
use std::time::Duration;

use sysinfo::{Disks, System};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use perch_alerts::types::{metrics, object_types};
use perch_alerts::{AlertEvent, BusHandle};

/// Something that can produce a batch of metric readings.
pub trait MetricSource: Send {
    /// Takes one reading per metric, as `(metric_name, value)` pairs.
    fn sample(&mut self) -> Vec<(&'static str, f64)>;
}

/// Reads usage percentages from the host via `sysinfo`.
pub struct SysinfoSource {
    system: System,
    mount_point: PathBuf,
}

impl SysinfoSource {
    /// Creates a source reporting disk usage for `mount_point`.
    #[must_use]
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_usage();
        Self {
            system,
            mount_point: mount_point.into(),
        }
    }

    fn disk_usage_percent(&self) -> Option<f64> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .find(|d| d.mount_point() == self.mount_point.as_path())
            .and_then(|d| {
                let used = d.total_space().saturating_sub(d.available_space());
                usage_percent(used, d.total_space())
            })
    }
}

impl std::fmt::Debug for SysinfoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoSource")
            .field("mount_point", &self.mount_point)
            .finish_non_exhaustive()
    }
}

impl MetricSource for SysinfoSource {
    fn sample(&mut self) -> Vec<(&'static str, f64)> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let mut readings = vec![(
            metrics::CPU_USAGE,
            f64::from(self.system.global_cpu_usage()),
        )];

        if let Some(memory) =
            usage_percent(self.system.used_memory(), self.system.total_memory())
        {
            readings.push((metrics::MEMORY_USAGE, memory));
        }

        match self.disk_usage_percent() {
            Some(disk) => readings.push((metrics::DISK_USAGE, disk)),
            None => trace!(mount = %self.mount_point.display(), "no disk found for mount point"),
        }

        readings
    }
}

/// `used / total` as a percentage, or `None` when `total` is zero.
fn usage_percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((used as f64 / total as f64) * 100.0)
}

/// Periodically publishes readings from a [`MetricSource`].
#[derive(Debug)]
pub struct SystemMetricsPoller<S> {
    source: S,
    handle: BusHandle,
    interval: Duration,
}

impl<S: MetricSource> SystemMetricsPoller<S> {
    /// Creates a poller publishing through `handle` every `interval`.
    #[must_use]
    pub fn new(source: S, handle: BusHandle, interval: Duration) -> Self {
        Self {
            source,
            handle,
            interval,
        }
    }

    /// Samples once and publishes every reading.
    ///
    /// Returns how many events were handed to a bus; zero if none is bound.
    pub fn poll_once(&mut self) -> usize {
        let mut published = 0;
        for (metric, value) in self.source.sample() {
            let event = AlertEvent::metric(object_types::SYSTEM, metric, value);
            if self.handle.try_publish(event) {
                published += 1;
            }
        }
        debug!(published, "system metrics polled");
        published
    }

    /// Polls every interval until `shutdown` flips to `true` or its sender
    /// is dropped. The first poll happens one interval after start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "system metrics poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("system metrics poller shutting down");
                        break;
                    }
                }
            }
        }
    }
}
