//! The alert engine: rule matching, cooldowns, history and dispatch.
//!
//! This module provides the [`AlertEngine`], which is the bus handler that
//! turns events into fired rules. It:
//! - Records metric samples into the [`MetricTracker`] once per event
//! - Matches events against a cached snapshot of enabled rules
//! - Suppresses rules that are still in cooldown
//! - Persists an [`AlertHistory`] record and hands the rule to an [`ActionSink`]
//! - Optionally purges old history on a background interval

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::AlertEventHandler;
use crate::config::AlertingConfig;
use crate::dispatcher::ActionSink;
use crate::error::{AlertError, Result};
use crate::evaluator::{evaluate_condition, evaluate_conditions};
use crate::repository::AlertRuleRepository;
use crate::tracker::MetricTracker;
use crate::types::{AlertEvent, AlertHistory, AlertRule, HistoryId, RuleId, Trigger, properties};

/// The result of handling one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationResult {
    /// Whether a metric sample was recorded.
    pub metric_recorded: bool,
    /// Number of cached rules examined.
    pub rules_evaluated: usize,
    /// Number of rules whose trigger and conditions matched.
    pub rules_matched: usize,
    /// Rules that fired.
    pub fired: Vec<RuleId>,
    /// Rules that matched but were still cooling down.
    pub suppressed: Vec<RuleId>,
}

/// Matches events against rules and fires the ones that apply.
///
/// Rules are cached as an immutable snapshot that is swapped wholesale by
/// [`refresh_rules`](Self::refresh_rules). Cooldowns live only in memory
/// and reset on restart.
pub struct AlertEngine {
    repo: Arc<dyn AlertRuleRepository>,
    actions: Option<Arc<dyn ActionSink>>,
    tracker: MetricTracker,
    config: AlertingConfig,
    rules: RwLock<Arc<Vec<AlertRule>>>,
    cooldowns: RwLock<HashMap<RuleId, DateTime<Utc>>>,
    cancel: CancellationToken,
    cleanup: Mutex<Option<JoinHandle<()>>>,
    retention_days: Arc<AtomicI64>,
}

impl AlertEngine {
    /// Creates an engine with no action sink and an empty rule cache.
    #[must_use]
    pub fn new(repo: Arc<dyn AlertRuleRepository>, config: AlertingConfig) -> Self {
        Self {
            repo,
            actions: None,
            tracker: MetricTracker::with_config(config.tracker.clone()),
            retention_days: Arc::new(AtomicI64::new(config.history_retention_days)),
            config,
            rules: RwLock::new(Arc::new(Vec::new())),
            cooldowns: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
            cleanup: Mutex::new(None),
        }
    }

    /// Sets where fired rules are dispatched.
    #[must_use]
    pub fn with_action_sink(mut self, actions: Arc<dyn ActionSink>) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AlertingConfig {
        &self.config
    }

    /// Returns the metric tracker.
    #[must_use]
    pub const fn tracker(&self) -> &MetricTracker {
        &self.tracker
    }

    // ============ Rule Cache ============

    /// Reloads enabled rules from the repository, replacing the cache.
    ///
    /// Cooldowns of rules missing from the new snapshot are forgotten.
    ///
    /// # Errors
    ///
    /// Returns the repository error. The previous snapshot stays in place.
    pub async fn refresh_rules(&self) -> Result<usize> {
        let rules = self.repo.list_enabled_rules().await?;
        let count = rules.len();
        self.cooldowns
            .write()
            .retain(|id, _| rules.iter().any(|rule| rule.id == *id));
        *self.rules.write() = Arc::new(rules);
        info!(rules = count, "alert rules refreshed");
        Ok(count)
    }

    /// Returns the cached rule snapshot.
    #[must_use]
    pub fn rules(&self) -> Arc<Vec<AlertRule>> {
        Arc::clone(&self.rules.read())
    }

    /// Returns the number of cached rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    // ============ Evaluation ============

    /// Evaluates an event against every cached rule and fires the matches.
    ///
    /// The event timestamp is the clock for sample recording, cooldowns and
    /// history. Events without a timestamp use the current time.
    pub async fn handle_event(&self, event: &AlertEvent) -> EvaluationResult {
        let now = event.timestamp.unwrap_or_else(Utc::now);
        let mut result = EvaluationResult::default();

        if let (Some(metric), Some(value)) = (event.metric_name(), event.metric_value()) {
            self.tracker.record(metric, value, now);
            result.metric_recorded = true;
        }

        let rules = self.rules();
        for rule in rules.iter() {
            result.rules_evaluated += 1;

            if !self.rule_matches(rule, event, now) {
                continue;
            }
            result.rules_matched += 1;

            if !self.claim_cooldown(rule, now) {
                debug!(rule_id = %rule.id, rule = %rule.name, "rule matched during cooldown");
                result.suppressed.push(rule.id);
                continue;
            }

            self.fire_rule(rule, event, now).await;
            result.fired.push(rule.id);
        }

        result
    }

    /// Fires a rule's actions directly, skipping conditions and cooldown.
    ///
    /// The synthetic event carries the rule's object type and trigger, and a
    /// single `test = true` property.
    pub async fn test_fire_rule(&self, rule: &AlertRule) {
        let now = Utc::now();
        let event = AlertEvent {
            object_type: rule.object_type.clone(),
            trigger: rule.trigger.clone(),
            properties: Default::default(),
            timestamp: Some(now),
        }
        .with_property(properties::TEST, true);

        info!(rule_id = %rule.id, rule = %rule.name, "test-firing alert rule");
        self.cooldowns.write().insert(rule.id, now);
        self.fire_rule(rule, &event, now).await;
    }

    fn rule_matches(&self, rule: &AlertRule, event: &AlertEvent, now: DateTime<Utc>) -> bool {
        if rule.object_type != event.object_type || rule.trigger != event.trigger {
            return false;
        }

        match &rule.trigger {
            Trigger::Event { .. } => evaluate_conditions(&rule.conditions, &event.properties),
            Trigger::Metric { metric_name } => {
                rule.conditions
                    .iter()
                    .all(|condition| match condition.sustain_window() {
                        Some(window) => self.tracker.is_sustained(
                            metric_name,
                            &condition.operator,
                            &condition.value,
                            window,
                            now,
                        ),
                        None => evaluate_condition(condition, &event.properties),
                    })
            }
        }
    }

    // ============ Cooldowns ============

    /// Records `now` as the rule's last fire, unless it is still cooling down.
    fn claim_cooldown(&self, rule: &AlertRule, now: DateTime<Utc>) -> bool {
        let mut cooldowns = self.cooldowns.write();
        if let (Some(cooldown), Some(last)) = (rule.cooldown(), cooldowns.get(&rule.id)) {
            if now.signed_duration_since(*last) < cooldown {
                return false;
            }
        }
        cooldowns.insert(rule.id, now);
        true
    }

    /// Returns when the rule last fired, if it has since startup.
    #[must_use]
    pub fn last_fired(&self, rule_id: RuleId) -> Option<DateTime<Utc>> {
        self.cooldowns.read().get(&rule_id).copied()
    }

    /// Returns how long a cached rule remains in cooldown at `now`.
    #[must_use]
    pub fn cooldown_remaining(&self, rule_id: RuleId, now: DateTime<Utc>) -> Option<Duration> {
        let cooldown = self
            .rules
            .read()
            .iter()
            .find(|r| r.id == rule_id)
            .and_then(AlertRule::cooldown)?;
        let last = self.last_fired(rule_id)?;
        let remaining = cooldown.checked_sub(&now.signed_duration_since(last))?;
        (remaining > Duration::zero()).then_some(remaining)
    }

    /// Forgets every cooldown.
    pub fn reset_cooldowns(&self) {
        self.cooldowns.write().clear();
    }

    // ============ Firing ============

    async fn fire_rule(&self, rule: &AlertRule, event: &AlertEvent, now: DateTime<Utc>) {
        info!(
            rule_id = %rule.id,
            rule = %rule.name,
            trigger = %event.trigger,
            "alert rule fired"
        );

        let history = AlertHistory {
            id: HistoryId::default(),
            rule_id: rule.id,
            fired_at: now,
            event_data: snapshot(&event.properties, "{}", rule.id, "event properties"),
            actions: snapshot(&rule.actions, "[]", rule.id, "rule actions"),
        };

        match tokio::time::timeout(
            self.config.save_history_timeout(),
            self.repo.save_history(history),
        )
        .await
        {
            Ok(Ok(history_id)) => debug!(rule_id = %rule.id, %history_id, "alert history saved"),
            Ok(Err(e)) => error!(rule_id = %rule.id, error = %e, "failed to save alert history"),
            Err(_) => error!(
                rule_id = %rule.id,
                timeout_ms = self.config.save_history_timeout_ms,
                "saving alert history timed out"
            ),
        }

        if let Some(actions) = &self.actions {
            let report = actions.dispatch(rule, event).await;
            debug!(
                rule_id = %rule.id,
                delivered = report.delivered,
                skipped = report.skipped,
                failed = report.failed,
                "alert actions dispatched"
            );
        }
    }

    // ============ History Cleanup ============

    /// Starts, reconfigures or pauses periodic history cleanup.
    ///
    /// The background task is spawned on the first positive call and runs
    /// one interval after start. Later calls only change the retention;
    /// `retention_days <= 0` pauses deletion. Calls after [`stop`](Self::stop)
    /// are ignored.
    pub fn start_history_cleanup(&self, retention_days: i64) {
        if self.cancel.is_cancelled() {
            debug!("engine stopped, ignoring history cleanup request");
            return;
        }

        self.retention_days.store(retention_days, Ordering::Relaxed);
        if retention_days <= 0 {
            info!("alert history cleanup paused");
            return;
        }

        let mut cleanup = self.cleanup.lock();
        if cleanup.is_some() {
            debug!(retention_days, "alert history retention updated");
            return;
        }

        info!(
            retention_days,
            interval_secs = self.config.cleanup_interval_secs,
            "starting alert history cleanup"
        );
        *cleanup = Some(tokio::spawn(run_cleanup(
            Arc::clone(&self.repo),
            Arc::clone(&self.retention_days),
            self.cancel.clone(),
            self.config.cleanup_interval(),
            self.config.cleanup_timeout(),
        )));
    }

    /// Deletes history older than the current retention once.
    ///
    /// # Errors
    ///
    /// Returns the repository error, or `AlertError::Timeout` if the
    /// repository does not answer within the cleanup deadline.
    pub async fn purge_history(&self) -> Result<u64> {
        purge_history(
            self.repo.as_ref(),
            self.retention_days.load(Ordering::Relaxed),
            self.config.cleanup_timeout(),
        )
        .await
    }

    /// Returns true while the cleanup task is alive.
    #[must_use]
    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops background work. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("stopping alert engine");
            self.cancel.cancel();
        }
    }

    /// Stops background work and waits for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.cleanup.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "history cleanup task terminated abnormally");
            }
        }
    }
}

impl Drop for AlertEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("rules", &self.rule_count())
            .field("cooldowns", &self.cooldowns.read().len())
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AlertEventHandler for AlertEngine {
    fn name(&self) -> &str {
        "alert-engine"
    }

    async fn handle(&self, event: &AlertEvent) -> Result<()> {
        let result = self.handle_event(event).await;
        if !result.fired.is_empty() || !result.suppressed.is_empty() {
            debug!(
                trigger = %event.trigger,
                fired = result.fired.len(),
                suppressed = result.suppressed.len(),
                "alert event evaluated"
            );
        }
        Ok(())
    }
}

fn snapshot<T: serde::Serialize + ?Sized>(
    value: &T,
    fallback: &str,
    rule_id: RuleId,
    what: &str,
) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!(%rule_id, error = %e, "failed to serialize {what}");
        fallback.to_string()
    })
}

async fn run_cleanup(
    repo: Arc<dyn AlertRuleRepository>,
    retention_days: Arc<AtomicI64>,
    cancel: CancellationToken,
    period: StdDuration,
    timeout: StdDuration,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("alert history cleanup stopped");
                break;
            }
            _ = ticker.tick() => {
                let days = retention_days.load(Ordering::Relaxed);
                if days <= 0 {
                    continue;
                }
                match purge_history(repo.as_ref(), days, timeout).await {
                    Ok(0) => {}
                    Ok(deleted) => info!(deleted, retention_days = days, "alert history cleanup completed"),
                    Err(e) => error!(error = %e, "alert history cleanup failed"),
                }
            }
        }
    }
}

async fn purge_history(
    repo: &dyn AlertRuleRepository,
    retention_days: i64,
    timeout: StdDuration,
) -> Result<u64> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let cutoff = Duration::try_days(retention_days)
        .and_then(|retention| Utc::now().checked_sub_signed(retention))
        .ok_or_else(|| AlertError::InvalidConfig {
            reason: format!("retention of {retention_days} days is out of range"),
        })?;

    tokio::time::timeout(timeout, repo.delete_history_before(cutoff))
        .await
        .map_err(|_| AlertError::Timeout {
            operation: "delete alert history".to_string(),
        })?
}
