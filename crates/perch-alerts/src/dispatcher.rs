//! Turns a fired rule and its triggering event into notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::notify::Notifier;
use crate::types::{ActionTarget, AlertEvent, AlertRule};

/// Receives rules that fired. The engine only depends on this trait.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Runs every action of `rule` for `event`, in declared order.
    async fn dispatch(&self, rule: &AlertRule, event: &AlertEvent) -> DispatchReport;
}

/// Counts of what happened to a rule's actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Actions handed to a notifier successfully.
    pub delivered: usize,
    /// Actions with an unknown target, or with no notifier to deliver to.
    pub skipped: usize,
    /// Actions whose delivery failed or timed out.
    pub failed: usize,
}

/// Renders action templates and routes them by target.
///
/// Only the `bell` target is delivered. Other targets are logged and skipped.
#[derive(Debug)]
pub struct ActionDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    notify_timeout: Duration,
}

impl ActionDispatcher {
    /// Default deadline for one notification.
    pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a dispatcher. A missing notifier makes bell actions no-ops.
    #[must_use]
    pub fn new(notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            notifier,
            notify_timeout: Self::DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Sets the notification deadline.
    #[must_use]
    pub const fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    async fn dispatch_bell(&self, rule: &AlertRule, title: &str, message: &str) -> Outcome {
        let Some(notifier) = &self.notifier else {
            debug!(rule_id = %rule.id, "no notifier configured, bell action skipped");
            return Outcome::Skipped;
        };
        if !notifier.is_enabled() {
            debug!(rule_id = %rule.id, notifier = notifier.name(), "notifier disabled");
            return Outcome::Skipped;
        }

        match tokio::time::timeout(
            self.notify_timeout,
            notifier.create_and_broadcast(title, message),
        )
        .await
        {
            Ok(Ok(())) => Outcome::Delivered,
            Ok(Err(e)) => {
                error!(
                    rule_id = %rule.id,
                    notifier = notifier.name(),
                    error = %e,
                    "failed to create bell notification"
                );
                Outcome::Failed
            }
            Err(_) => {
                error!(
                    rule_id = %rule.id,
                    notifier = notifier.name(),
                    timeout_ms = self.notify_timeout.as_millis() as u64,
                    "bell notification timed out"
                );
                Outcome::Failed
            }
        }
    }
}

enum Outcome {
    Delivered,
    Skipped,
    Failed,
}

#[async_trait]
impl ActionSink for ActionDispatcher {
    async fn dispatch(&self, rule: &AlertRule, event: &AlertEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for action in &rule.actions {
            let title = render_template(&action.title_template, rule, event);
            let message = render_template(&action.message_template, rule, event);

            let outcome = match &action.target {
                ActionTarget::Bell => self.dispatch_bell(rule, &title, &message).await,
                ActionTarget::Other(target) => {
                    warn!(rule_id = %rule.id, target = %target, "unknown alert action target");
                    Outcome::Skipped
                }
            };

            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        report
    }
}

/// Substitutes `{{placeholder}}` variables, or returns the default text when
/// `template` is empty.
///
/// Built-in placeholders (`rule_name`, `event_name`, `metric_name`,
/// `object_type`) take precedence over event properties of the same name.
/// Unknown placeholders are left as written.
pub fn render_template(template: &str, rule: &AlertRule, event: &AlertEvent) -> String {
    if template.is_empty() {
        return default_template(rule, event);
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let resolved = after_open.find("}}").and_then(|close| {
            let key = &after_open[..close];
            lookup(key, rule, event).map(|value| (value, close))
        });

        match resolved {
            Some((value, close)) => {
                out.push_str(&value);
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    out
}

fn lookup(key: &str, rule: &AlertRule, event: &AlertEvent) -> Option<String> {
    match key {
        "rule_name" => Some(rule.name.clone()),
        "event_name" => Some(event.event_name().unwrap_or_default().to_string()),
        "metric_name" => Some(event.metric_name().unwrap_or_default().to_string()),
        "object_type" => Some(event.object_type.clone()),
        other => event.properties.get(other).map(ToString::to_string),
    }
}

fn default_template(rule: &AlertRule, event: &AlertEvent) -> String {
    let trigger = event.trigger.name();
    if trigger.is_empty() {
        format!("Alert: {}", rule.name)
    } else {
        format!("Alert: {} ({trigger})", rule.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AlertError, Result};
    use crate::types::{AlertAction, Trigger, events, metrics, object_types};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
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
                    reason: "service unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn create_and_broadcast(&self, _title: &str, _message: &str) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn species_rule(actions: Vec<AlertAction>) -> AlertRule {
        let mut builder = AlertRule::builder(
            "New species",
            object_types::DETECTION,
            Trigger::event(events::DETECTION_NEW_SPECIES),
        );
        for action in actions {
            builder = builder.action(action);
        }
        builder.build().unwrap()
    }

    fn species_event() -> AlertEvent {
        AlertEvent::event(object_types::DETECTION, events::DETECTION_NEW_SPECIES)
            .with_property("species_name", "Eurasian Blue Tit")
            .with_property("confidence", 0.92)
    }

    mod template_tests {
        use super::*;

        #[test]
        fn substitutes_builtins_and_properties() {
            let rule = species_rule(vec![]);
            let rendered = render_template(
                "{{rule_name}}: {{species_name}} ({{confidence}}) via {{object_type}}/{{event_name}}",
                &rule,
                &species_event(),
            );
            assert_eq!(
                rendered,
                "New species: Eurasian Blue Tit (0.92) via detection/detection.new_species"
            );
        }

        #[test]
        fn metric_name_empty_for_events() {
            let rule = species_rule(vec![]);
            assert_eq!(
                render_template("[{{metric_name}}]", &rule, &species_event()),
                "[]"
            );
        }

        #[test]
        fn builtins_take_precedence_over_properties() {
            let rule = species_rule(vec![]);
            let event = species_event().with_property("rule_name", "spoofed");
            assert_eq!(render_template("{{rule_name}}", &rule, &event), "New species");
        }

        #[test]
        fn unknown_placeholders_are_kept() {
            let rule = species_rule(vec![]);
            assert_eq!(
                render_template("{{nope}} {{ {{rule_name}} }}", &rule, &species_event()),
                "{{nope}} {{ New species }}"
            );
        }

        #[test]
        fn empty_template_uses_default() {
            let rule = species_rule(vec![]);
            assert_eq!(
                render_template("", &rule, &species_event()),
                "Alert: New species (detection.new_species)"
            );

            let metric = AlertEvent::metric(object_types::SYSTEM, metrics::CPU_USAGE, 95.0);
            assert_eq!(
                render_template("", &rule, &metric),
                "Alert: New species (system.cpu_usage)"
            );

            let nameless = AlertEvent::event(object_types::SYSTEM, "");
            assert_eq!(render_template("", &rule, &nameless), "Alert: New species");
        }

        #[test]
        fn metric_value_renders_without_trailing_zero() {
            let rule = species_rule(vec![]);
            let metric = AlertEvent::metric(object_types::SYSTEM, metrics::DISK_USAGE, 85.0);
            assert_eq!(render_template("{{value}}%", &rule, &metric), "85%");
        }
    }

    mod dispatch_tests {
        use super::*;

        #[tokio::test]
        async fn bell_action_notifies() {
            let notifier = Arc::new(RecordingNotifier::default());
            let dispatcher = ActionDispatcher::new(Some(notifier.clone()));
            let rule = species_rule(vec![
                AlertAction::bell()
                    .with_title("New: {{species_name}}")
                    .with_message("Confidence {{confidence}}"),
            ]);

            let report = dispatcher.dispatch(&rule, &species_event()).await;

            assert_eq!(report.delivered, 1);
            assert_eq!(
                notifier.sent(),
                vec![(
                    "New: Eurasian Blue Tit".to_string(),
                    "Confidence 0.92".to_string()
                )]
            );
        }

        #[tokio::test]
        async fn unknown_target_is_skipped_and_later_actions_run() {
            let notifier = Arc::new(RecordingNotifier::default());
            let dispatcher = ActionDispatcher::new(Some(notifier.clone()));
            let rule = species_rule(vec![
                AlertAction::new(ActionTarget::Other("push".to_string())),
                AlertAction::bell(),
            ]);

            let report = dispatcher.dispatch(&rule, &species_event()).await;

            assert_eq!(report, DispatchReport { delivered: 1, skipped: 1, failed: 0 });
            assert_eq!(notifier.sent().len(), 1);
        }

        #[tokio::test]
        async fn actions_dispatch_in_declared_order() {
            let notifier = Arc::new(RecordingNotifier::default());
            let dispatcher = ActionDispatcher::new(Some(notifier.clone()));
            let rule = species_rule(vec![
                AlertAction::bell().with_title("first"),
                AlertAction::bell().with_title("second"),
            ]);

            dispatcher.dispatch(&rule, &species_event()).await;

            let titles: Vec<String> = notifier.sent().into_iter().map(|(t, _)| t).collect();
            assert_eq!(titles, vec!["first", "second"]);
        }

        #[tokio::test]
        async fn missing_notifier_is_tolerated() {
            let dispatcher = ActionDispatcher::new(None);
            let rule = species_rule(vec![AlertAction::bell()]);
            let report = dispatcher.dispatch(&rule, &species_event()).await;
            assert_eq!(report.skipped, 1);
        }

        #[tokio::test]
        async fn notifier_failure_does_not_stop_remaining_actions() {
            let notifier = Arc::new(RecordingNotifier::failing());
            let dispatcher = ActionDispatcher::new(Some(notifier.clone()));
            let rule = species_rule(vec![AlertAction::bell(), AlertAction::bell()]);

            let report = dispatcher.dispatch(&rule, &species_event()).await;

            assert_eq!(report.failed, 2);
            assert_eq!(notifier.sent().len(), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn stalled_notifier_times_out() {
            let dispatcher = ActionDispatcher::new(Some(Arc::new(StalledNotifier)))
                .with_notify_timeout(Duration::from_millis(50));
            let rule = species_rule(vec![AlertAction::bell()]);

            let report = dispatcher.dispatch(&rule, &species_event()).await;
            assert_eq!(report.failed, 1);
        }
    }
}
