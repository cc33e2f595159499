//! Built-in alert rules and seeding.

use std::collections::HashSet;

use tracing::info;

use crate::error::Result;
use crate::repository::AlertRuleRepository;
use crate::types::{
    AlertAction, AlertCondition, AlertRule, ConditionOperator, RuleId, Trigger, events, metrics,
    object_types, properties,
};

/// How long resource metrics must stay high before the built-in rules fire.
const RESOURCE_SUSTAIN_SECS: u64 = 300;

/// Returns the rules that ship with the application.
///
/// All are enabled, marked built-in, and notify through the bell.
#[must_use]
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        built_in(
            "New species detected",
            "Notifies when a species is detected for the first time",
            object_types::DETECTION,
            Trigger::event(events::DETECTION_NEW_SPECIES),
            60,
            None,
        ),
        built_in(
            "Audio stream disconnected",
            "Notifies when an RTSP or audio stream loses connection",
            object_types::STREAM,
            Trigger::event(events::STREAM_DISCONNECTED),
            300,
            None,
        ),
        built_in(
            "Audio stream error",
            "Notifies when an audio stream encounters an error",
            object_types::STREAM,
            Trigger::event(events::STREAM_ERROR),
            300,
            None,
        ),
        built_in(
            "Audio device error",
            "Notifies when a local audio capture device encounters an error",
            object_types::DEVICE,
            Trigger::event(events::DEVICE_ERROR),
            300,
            None,
        ),
        built_in(
            "High CPU usage",
            "Notifies when CPU usage exceeds 90% for 5 minutes",
            object_types::SYSTEM,
            Trigger::metric(metrics::CPU_USAGE),
            900,
            Some("90"),
        ),
        built_in(
            "High memory usage",
            "Notifies when memory usage exceeds 90% for 5 minutes",
            object_types::SYSTEM,
            Trigger::metric(metrics::MEMORY_USAGE),
            900,
            Some("90"),
        ),
        built_in(
            "Low disk space",
            "Notifies when disk usage exceeds 85% for 5 minutes",
            object_types::SYSTEM,
            Trigger::metric(metrics::DISK_USAGE),
            1800,
            Some("85"),
        ),
        built_in(
            "MQTT disconnected",
            "Notifies when the MQTT broker connection is lost",
            object_types::INTEGRATION,
            Trigger::event(events::MQTT_DISCONNECTED),
            600,
            None,
        ),
        built_in(
            "BirdWeather upload failed",
            "Notifies when a BirdWeather upload fails",
            object_types::INTEGRATION,
            Trigger::event(events::BIRDWEATHER_FAILED),
            600,
            None,
        ),
    ]
}

fn built_in(
    name: &str,
    description: &str,
    object_type: &str,
    trigger: Trigger,
    cooldown_secs: i64,
    above: Option<&str>,
) -> AlertRule {
    let conditions = above
        .map(|threshold| {
            vec![
                AlertCondition::new(properties::VALUE, ConditionOperator::GreaterThan, threshold)
                    .sustained_for(RESOURCE_SUSTAIN_SECS),
            ]
        })
        .unwrap_or_default();

    AlertRule {
        id: RuleId::default(),
        name: name.to_string(),
        description: description.to_string(),
        enabled: true,
        built_in: true,
        object_type: object_type.to_string(),
        trigger,
        cooldown_secs,
        conditions,
        actions: vec![AlertAction::bell()],
    }
}

/// Creates every built-in rule whose name is not already stored.
///
/// Matching by name lets a partially seeded store heal on the next start.
/// Returns the number of rules created.
///
/// # Errors
///
/// Returns the first repository error.
pub async fn seed_default_rules(repo: &dyn AlertRuleRepository) -> Result<usize> {
    let existing: HashSet<String> = repo
        .list_rules()
        .await?
        .into_iter()
        .map(|rule| rule.name)
        .collect();

    let mut created = 0;
    for rule in default_rules() {
        if existing.contains(&rule.name) {
            continue;
        }
        repo.create_rule(rule).await?;
        created += 1;
    }

    if created > 0 {
        info!(created, "seeded default alert rules");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRuleRepository;
    use crate::types::ActionTarget;

    #[test]
    fn all_defaults_are_valid_built_in_bell_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), 9);
        for rule in &rules {
            assert!(rule.validate().is_ok(), "{} should validate", rule.name);
            assert!(rule.enabled);
            assert!(rule.built_in);
            assert_eq!(rule.actions.len(), 1);
            assert_eq!(rule.actions[0].target, ActionTarget::Bell);
        }
    }

    #[test]
    fn default_names_are_unique() {
        let rules = default_rules();
        let names: HashSet<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), rules.len());
    }

    #[test]
    fn resource_rules_are_sustained_thresholds() {
        let rules = default_rules();
        let disk = rules
            .iter()
            .find(|r| r.trigger == Trigger::metric(metrics::DISK_USAGE))
            .unwrap();
        assert_eq!(disk.cooldown_secs, 1800);
        assert_eq!(disk.conditions.len(), 1);
        assert_eq!(disk.conditions[0].value, "85");
        assert_eq!(disk.conditions[0].duration_secs, 300);

        let metric_rules = rules.iter().filter(|r| r.trigger.metric_name().is_some()).count();
        assert_eq!(metric_rules, 3);
    }

    #[test]
    fn event_rules_have_no_conditions() {
        for rule in default_rules() {
            if rule.trigger.event_name().is_some() {
                assert!(rule.conditions.is_empty(), "{}", rule.name);
            }
        }
    }

    #[tokio::test]
    async fn seeding_empty_store_creates_all() {
        let repo = InMemoryRuleRepository::new();
        assert_eq!(seed_default_rules(&repo).await.unwrap(), 9);
        assert_eq!(repo.rule_count(), 9);
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let repo = InMemoryRuleRepository::new();
        seed_default_rules(&repo).await.unwrap();
        assert_eq!(seed_default_rules(&repo).await.unwrap(), 0);
        assert_eq!(repo.rule_count(), 9);
    }

    #[tokio::test]
    async fn seeding_heals_partial_store() {
        let repo = InMemoryRuleRepository::new();
        for rule in default_rules().into_iter().take(4) {
            repo.create_rule(rule).await.unwrap();
        }
        assert_eq!(seed_default_rules(&repo).await.unwrap(), 5);
        assert_eq!(repo.rule_count(), 9);
    }

    #[tokio::test]
    async fn seeding_keeps_user_edits() {
        let repo = InMemoryRuleRepository::new();
        let mut edited = default_rules().remove(0);
        edited.cooldown_secs = 5;
        edited.enabled = false;
        repo.create_rule(edited).await.unwrap();

        seed_default_rules(&repo).await.unwrap();

        let rules = repo.list_rules().await.unwrap();
        let kept = rules.iter().find(|r| r.name == "New species detected").unwrap();
        assert_eq!(kept.cooldown_secs, 5);
        assert!(!kept.enabled);
    }
}
