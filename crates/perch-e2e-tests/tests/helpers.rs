//! Test helpers for E2E tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use perch_alerts::{
    AlertError, AlertEvent, AlertRule, AlertRuleRepository, AlertingConfig, AlertingSystem,
    BusHandle, InMemoryRuleRepository, Notifier, Result,
};

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("perch=debug")
        .try_init();
}

/// A fixed point in time that test events are stamped relative to.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `base_time()` plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(secs)
}

/// A notifier that records every notification it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose deliveries always fail (after being recorded).
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Number of delivery attempts.
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Every `(title, message)` pair, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create_and_broadcast(&self, title: &str, message: &str) -> Result<()> {
        self.sent.lock().push((title.to_string(), message.to_string()));
        if self.fail {
            return Err(AlertError::NotificationFailed {
                reason: "broadcast hub unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Config for tests: no built-in rules, no background cleanup.
pub fn quiet_config() -> AlertingConfig {
    AlertingConfig {
        seed_default_rules: false,
        history_retention_days: 0,
        ..AlertingConfig::default()
    }
}

/// A running alerting subsystem with an in-memory repository.
pub struct TestSystem {
    pub repo: Arc<InMemoryRuleRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub handle: BusHandle,
    pub system: AlertingSystem,
}

impl TestSystem {
    /// Stores `rules` and starts the subsystem with [`quiet_config`].
    pub async fn start(rules: Vec<AlertRule>) -> Self {
        Self::start_with(rules, RecordingNotifier::default(), &quiet_config()).await
    }

    /// Stores `rules` and starts the subsystem with the given pieces.
    pub async fn start_with(
        rules: Vec<AlertRule>,
        notifier: RecordingNotifier,
        config: &AlertingConfig,
    ) -> Self {
        init_tracing();

        let repo = Arc::new(InMemoryRuleRepository::new());
        for rule in rules {
            repo.create_rule(rule).await.expect("rule should be valid");
        }

        let notifier = Arc::new(notifier);
        let handle = BusHandle::new();
        let system = AlertingSystem::start(
            repo.clone(),
            handle.clone(),
            Some(notifier.clone() as Arc<dyn Notifier>),
            config,
        )
        .await
        .expect("alerting system should start");

        Self {
            repo,
            notifier,
            handle,
            system,
        }
    }

    /// Publishes through the producer handle.
    pub fn publish(&self, event: AlertEvent) {
        assert!(self.handle.try_publish(event), "bus should be bound");
    }

    /// Stops the subsystem once every published event has been handled.
    pub async fn drain(&self) {
        self.system.shutdown().await;
    }

    /// Number of history records written.
    pub fn history_count(&self) -> usize {
        self.repo.count_history(None)
    }
}
