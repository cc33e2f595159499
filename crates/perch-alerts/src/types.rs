//! Core types for the alerting system.
//!
//! This module provides the fundamental types used throughout the perch-alerts crate:
//! - [`PropertyValue`]: A scalar value carried by an event property
//! - [`Trigger`]: Whether something is a discrete event or a metric sample
//! - [`ConditionOperator`]: Operators for comparing property values
//! - [`AlertCondition`]: A single condition of a rule
//! - [`AlertAction`]: A notification target with optional templates
//! - [`AlertRule`]: A user-defined rule matching events to actions
//! - [`AlertEvent`]: A transient occurrence published on the bus
//! - [`AlertHistory`]: A record of a rule firing

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// Categories of monitored things.
pub mod object_types {
    /// Audio streams (RTSP and friends).
    pub const STREAM: &str = "stream";
    /// Species detections.
    pub const DETECTION: &str = "detection";
    /// The application itself.
    pub const APPLICATION: &str = "application";
    /// Third-party integrations (MQTT, BirdWeather).
    pub const INTEGRATION: &str = "integration";
    /// Local capture devices.
    pub const DEVICE: &str = "device";
    /// Host system resources.
    pub const SYSTEM: &str = "system";
}

/// Names of alertable events.
pub mod events {
    /// A stream connected.
    pub const STREAM_CONNECTED: &str = "stream.connected";
    /// A stream lost its connection.
    pub const STREAM_DISCONNECTED: &str = "stream.disconnected";
    /// A stream reported an error.
    pub const STREAM_ERROR: &str = "stream.error";
    /// A species was detected for the first time.
    pub const DETECTION_NEW_SPECIES: &str = "detection.new_species";
    /// Any detection.
    pub const DETECTION_OCCURRED: &str = "detection.occurred";
    /// The application started.
    pub const APPLICATION_STARTED: &str = "application.started";
    /// The application stopped.
    pub const APPLICATION_STOPPED: &str = "application.stopped";
    /// A BirdWeather upload failed.
    pub const BIRDWEATHER_FAILED: &str = "integration.birdweather_failed";
    /// The MQTT broker connection was established.
    pub const MQTT_CONNECTED: &str = "integration.mqtt_connected";
    /// The MQTT broker connection was lost.
    pub const MQTT_DISCONNECTED: &str = "integration.mqtt_disconnected";
    /// A capture device started.
    pub const DEVICE_STARTED: &str = "device.started";
    /// A capture device stopped.
    pub const DEVICE_STOPPED: &str = "device.stopped";
    /// A capture device reported an error.
    pub const DEVICE_ERROR: &str = "device.error";
}

/// Names of threshold metrics.
pub mod metrics {
    /// CPU usage percentage.
    pub const CPU_USAGE: &str = "system.cpu_usage";
    /// Memory usage percentage.
    pub const MEMORY_USAGE: &str = "system.memory_usage";
    /// Disk usage percentage.
    pub const DISK_USAGE: &str = "system.disk_usage";
}

/// Well-known event property keys.
pub mod properties {
    /// The numeric reading of a metric sample.
    pub const VALUE: &str = "value";
    /// Common name of a detected species.
    pub const SPECIES_NAME: &str = "species_name";
    /// Scientific name of a detected species.
    pub const SCIENTIFIC_NAME: &str = "scientific_name";
    /// Detection confidence.
    pub const CONFIDENCE: &str = "confidence";
    /// Detection location.
    pub const LOCATION: &str = "location";
    /// Stream display name.
    pub const STREAM_NAME: &str = "stream_name";
    /// Stream URL.
    pub const STREAM_URL: &str = "stream_url";
    /// Capture device name.
    pub const DEVICE_NAME: &str = "device_name";
    /// Error message.
    pub const ERROR: &str = "error";
    /// Filesystem path.
    pub const PATH: &str = "path";
    /// MQTT broker address.
    pub const BROKER: &str = "broker";
    /// Marks synthetic events produced by a test fire.
    pub const TEST: &str = "test";
}

/// Identity of a stored rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a stored history record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(pub u64);

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scalar value attached to an event property.
///
/// Integer and floating-point inputs are folded into [`PropertyValue::Number`]
/// when the event is built, so evaluation never has to guess at types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A boolean flag.
    Bool(bool),
    /// Any numeric reading.
    Number(f64),
    /// Free text.
    Text(String),
}

impl PropertyValue {
    /// Returns the numeric value, parsing numeric text. Booleans have none.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse::<f64>().ok(),
            Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

macro_rules! numeric_property {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

numeric_property!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Event properties keyed by name. Ordered so snapshots serialize stably.
pub type Properties = BTreeMap<String, PropertyValue>;

/// The kind of a trigger, without its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// A discrete event.
    Event,
    /// A periodic metric sample.
    Metric,
}

impl TriggerType {
    /// Returns the trigger type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Metric => "metric",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What activates a rule, or what an event carries.
///
/// Exactly one of event name or metric name exists, selected by the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "trigger_type", rename_all = "snake_case")]
pub enum Trigger {
    /// A discrete named event.
    Event {
        /// The event name, e.g. `stream.disconnected`.
        event_name: String,
    },
    /// A named metric.
    Metric {
        /// The metric name, e.g. `system.cpu_usage`.
        metric_name: String,
    },
}

impl Trigger {
    /// Creates an event trigger.
    pub fn event(name: impl Into<String>) -> Self {
        Self::Event {
            event_name: name.into(),
        }
    }

    /// Creates a metric trigger.
    pub fn metric(name: impl Into<String>) -> Self {
        Self::Metric {
            metric_name: name.into(),
        }
    }

    /// Returns the kind of this trigger.
    #[must_use]
    pub const fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Event { .. } => TriggerType::Event,
            Self::Metric { .. } => TriggerType::Metric,
        }
    }

    /// Returns the event or metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Event { event_name } => event_name,
            Self::Metric { metric_name } => metric_name,
        }
    }

    /// Returns the event name for event triggers.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::Event { event_name } => Some(event_name),
            Self::Metric { .. } => None,
        }
    }

    /// Returns the metric name for metric triggers.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        match self {
            Self::Metric { metric_name } => Some(metric_name),
            Self::Event { .. } => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.trigger_type(), self.name())
    }
}

/// Comparison operators for rule conditions.
///
/// Stored as snake_case strings. Anything unrecognized loads as
/// [`ConditionOperator::Unknown`] and never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    /// Case-insensitive equality.
    Is,
    /// Case-insensitive inequality.
    IsNot,
    /// Case-insensitive substring.
    Contains,
    /// Case-insensitive substring absence.
    NotContains,
    /// Numeric `>`.
    GreaterThan,
    /// Numeric `<`.
    LessThan,
    /// Numeric `>=`.
    GreaterOrEqual,
    /// Numeric `<=`.
    LessOrEqual,
    /// An operator this version does not understand.
    Unknown(String),
}

impl ConditionOperator {
    /// Returns the operator as its stored string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Is => "is",
            Self::IsNot => "is_not",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessOrEqual => "less_or_equal",
            Self::Unknown(raw) => raw,
        }
    }

    /// Returns true for the four numeric operators.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::LessThan | Self::GreaterOrEqual | Self::LessOrEqual
        )
    }

    /// Compares two numbers. Non-numeric operators return `false`.
    #[must_use]
    pub fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Self::GreaterThan => left > right,
            Self::LessThan => left < right,
            Self::GreaterOrEqual => left >= right,
            Self::LessOrEqual => left <= right,
            _ => false,
        }
    }
}

impl From<&str> for ConditionOperator {
    fn from(raw: &str) -> Self {
        match raw {
            "is" => Self::Is,
            "is_not" => Self::IsNot,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "greater_or_equal" => Self::GreaterOrEqual,
            "less_or_equal" => Self::LessOrEqual,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        match op {
            ConditionOperator::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single condition of a rule. All conditions of a rule are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCondition {
    /// The event property to inspect.
    pub property: String,
    /// The comparison operator.
    pub operator: ConditionOperator,
    /// The comparison value, string-encoded.
    pub value: String,
    /// How long a metric condition must hold, in seconds. 0 is instantaneous.
    #[serde(default)]
    pub duration_secs: u64,
}

impl AlertCondition {
    /// Creates an instantaneous condition.
    pub fn new(
        property: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            operator,
            value: value.into(),
            duration_secs: 0,
        }
    }

    /// Requires the condition to hold for `secs` seconds.
    #[must_use]
    pub const fn sustained_for(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Returns the sustain window, or `None` for instantaneous checks.
    #[must_use]
    pub fn sustain_window(&self) -> Option<chrono::Duration> {
        if self.duration_secs == 0 {
            return None;
        }
        let secs = i64::try_from(self.duration_secs).unwrap_or(i64::MAX);
        Some(chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX))
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.operator, self.value)?;
        if self.duration_secs > 0 {
            write!(f, " for {}s", self.duration_secs)?;
        }
        Ok(())
    }
}

/// Where an action delivers its notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionTarget {
    /// The in-app notification bell.
    Bell,
    /// A target this engine does not deliver to.
    Other(String),
}

impl ActionTarget {
    /// Returns the target as its stored string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bell => "bell",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for ActionTarget {
    fn from(raw: String) -> Self {
        if raw == "bell" { Self::Bell } else { Self::Other(raw) }
    }
}

impl From<ActionTarget> for String {
    fn from(target: ActionTarget) -> Self {
        match target {
            ActionTarget::Bell => "bell".to_string(),
            ActionTarget::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification produced when a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    /// Delivery target.
    pub target: ActionTarget,
    /// Title template with `{{placeholder}}` substitution. Empty uses a default.
    #[serde(default, rename = "template_title")]
    pub title_template: String,
    /// Message template with `{{placeholder}}` substitution. Empty uses a default.
    #[serde(default, rename = "template_message")]
    pub message_template: String,
}

impl AlertAction {
    /// Creates an action with default templates.
    #[must_use]
    pub const fn new(target: ActionTarget) -> Self {
        Self {
            target,
            title_template: String::new(),
            message_template: String::new(),
        }
    }

    /// Creates a bell action with default templates.
    #[must_use]
    pub const fn bell() -> Self {
        Self::new(ActionTarget::Bell)
    }

    /// Sets the title template.
    #[must_use]
    pub fn with_title(mut self, template: impl Into<String>) -> Self {
        self.title_template = template.into();
        self
    }

    /// Sets the message template.
    #[must_use]
    pub fn with_message(mut self, template: impl Into<String>) -> Self {
        self.message_template = template.into();
        self
    }
}

/// A user-defined rule matching events or metrics to actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier, assigned by the repository.
    #[serde(default)]
    pub id: RuleId,
    /// Human-readable name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Whether the rule is enabled.
    pub enabled: bool,
    /// Whether the rule ships with the application.
    #[serde(default)]
    pub built_in: bool,
    /// Category of monitored thing this rule watches.
    pub object_type: String,
    /// The event or metric this rule reacts to.
    #[serde(flatten)]
    pub trigger: Trigger,
    /// Minimum time between fires, in seconds. `<= 0` disables the cooldown.
    #[serde(default)]
    pub cooldown_secs: i64,
    /// Conditions, combined with AND.
    #[serde(default)]
    pub conditions: Vec<AlertCondition>,
    /// Actions, dispatched in order.
    #[serde(default)]
    pub actions: Vec<AlertAction>,
}

impl AlertRule {
    /// Maximum allowed length for rule names.
    pub const MAX_NAME_LENGTH: usize = 256;

    /// Creates a new alert rule builder.
    pub fn builder(
        name: impl Into<String>,
        object_type: impl Into<String>,
        trigger: Trigger,
    ) -> AlertRuleBuilder {
        AlertRuleBuilder::new(name, object_type, trigger)
    }

    /// Returns the cooldown, or `None` when firing is never throttled.
    #[must_use]
    pub fn cooldown(&self) -> Option<chrono::Duration> {
        if self.cooldown_secs <= 0 {
            return None;
        }
        Some(chrono::Duration::try_seconds(self.cooldown_secs).unwrap_or(chrono::Duration::MAX))
    }

    /// Checks the rule for structural problems.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if:
    /// - The name is empty or exceeds the maximum length
    /// - The object type is empty
    /// - The event or metric name is empty
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AlertError::InvalidRule {
                reason: "rule name cannot be empty".to_string(),
            });
        }

        if self.name.len() > Self::MAX_NAME_LENGTH {
            return Err(AlertError::InvalidRule {
                reason: format!(
                    "rule name exceeds maximum length of {} characters",
                    Self::MAX_NAME_LENGTH
                ),
            });
        }

        if self.object_type.is_empty() {
            return Err(AlertError::InvalidRule {
                reason: "object type cannot be empty".to_string(),
            });
        }

        if self.trigger.name().is_empty() {
            return Err(AlertError::InvalidRule {
                reason: format!("{} name cannot be empty", self.trigger.trigger_type()),
            });
        }

        Ok(())
    }
}

/// Builder for creating [`AlertRule`] instances.
#[derive(Debug)]
pub struct AlertRuleBuilder {
    id: RuleId,
    name: String,
    description: String,
    enabled: bool,
    built_in: bool,
    object_type: String,
    trigger: Trigger,
    cooldown_secs: i64,
    conditions: Vec<AlertCondition>,
    actions: Vec<AlertAction>,
}

impl AlertRuleBuilder {
    /// Creates a new builder with required fields.
    fn new(name: impl Into<String>, object_type: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: RuleId::default(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            built_in: false,
            object_type: object_type.into(),
            trigger,
            cooldown_secs: 0,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Sets the rule ID.
    #[must_use]
    pub const fn id(mut self, id: RuleId) -> Self {
        self.id = id;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets whether the rule is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Marks the rule as built in.
    #[must_use]
    pub const fn built_in(mut self, built_in: bool) -> Self {
        self.built_in = built_in;
        self
    }

    /// Sets the cooldown in seconds.
    #[must_use]
    pub const fn cooldown_secs(mut self, secs: i64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn condition(mut self, condition: AlertCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds an action.
    #[must_use]
    pub fn action(mut self, action: AlertAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Builds the [`AlertRule`].
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule fails [`AlertRule::validate`].
    pub fn build(self) -> Result<AlertRule> {
        let rule = AlertRule {
            id: self.id,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            built_in: self.built_in,
            object_type: self.object_type,
            trigger: self.trigger,
            cooldown_secs: self.cooldown_secs,
            conditions: self.conditions,
            actions: self.actions,
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// A transient occurrence that may trigger rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Category of the monitored thing.
    pub object_type: String,
    /// The event or metric this occurrence carries.
    #[serde(flatten)]
    pub trigger: Trigger,
    /// Event-specific properties used by conditions and templates.
    #[serde(default)]
    pub properties: Properties,
    /// When it happened. Stamped by the bus if unset.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Creates a discrete event.
    pub fn event(object_type: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            trigger: Trigger::event(event_name),
            properties: Properties::new(),
            timestamp: None,
        }
    }

    /// Creates a metric sample carrying `value`.
    pub fn metric(object_type: impl Into<String>, metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            object_type: object_type.into(),
            trigger: Trigger::metric(metric_name),
            properties: Properties::new(),
            timestamp: None,
        }
        .with_property(properties::VALUE, value)
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns the event name for discrete events.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.trigger.event_name()
    }

    /// Returns the metric name for metric samples.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        self.trigger.metric_name()
    }

    /// Returns the numeric `value` property of a metric sample.
    #[must_use]
    pub fn metric_value(&self) -> Option<f64> {
        self.metric_name()?;
        self.properties.get(properties::VALUE)?.as_f64()
    }
}

/// A record of a rule firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertHistory {
    /// Unique identifier, assigned by the repository.
    #[serde(default)]
    pub id: HistoryId,
    /// The rule that fired.
    pub rule_id: RuleId,
    /// When it fired.
    pub fired_at: DateTime<Utc>,
    /// JSON snapshot of the triggering event's properties.
    pub event_data: String,
    /// JSON snapshot of the rule's actions.
    pub actions: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;

        #[test]
        fn integers_become_numbers() {
            assert_eq!(PropertyValue::from(42_u8), PropertyValue::Number(42.0));
            assert_eq!(PropertyValue::from(-7_i64), PropertyValue::Number(-7.0));
            assert_eq!(PropertyValue::from(3_usize), PropertyValue::Number(3.0));
        }

        #[test]
        fn as_f64_parses_numeric_text() {
            assert_eq!(PropertyValue::from("12.5").as_f64(), Some(12.5));
            assert_eq!(PropertyValue::from("robin").as_f64(), None);
            assert_eq!(PropertyValue::from(true).as_f64(), None);
        }

        #[test]
        fn display_matches_plain_rendering() {
            assert_eq!(PropertyValue::from(85.0).to_string(), "85");
            assert_eq!(PropertyValue::from(0.95).to_string(), "0.95");
            assert_eq!(PropertyValue::from(true).to_string(), "true");
            assert_eq!(PropertyValue::from("Robin").to_string(), "Robin");
        }

        #[test]
        fn serializes_untagged() {
            let mut props = Properties::new();
            props.insert("species_name".to_string(), "Eurasian Blue Tit".into());
            props.insert("confidence".to_string(), 0.9.into());
            props.insert("test".to_string(), true.into());

            let json = serde_json::to_string(&props).unwrap();
            assert_eq!(
                json,
                r#"{"confidence":0.9,"species_name":"Eurasian Blue Tit","test":true}"#
            );
        }
    }

    mod trigger_tests {
        use super::*;

        #[test]
        fn accessors_follow_variant() {
            let event = Trigger::event("stream.error");
            assert_eq!(event.event_name(), Some("stream.error"));
            assert_eq!(event.metric_name(), None);
            assert_eq!(event.trigger_type(), TriggerType::Event);

            let metric = Trigger::metric("system.cpu_usage");
            assert_eq!(metric.metric_name(), Some("system.cpu_usage"));
            assert_eq!(metric.event_name(), None);
            assert_eq!(metric.to_string(), "metric:system.cpu_usage");
        }
    }

    mod operator_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("is", ConditionOperator::Is ; "is")]
        #[test_case("is_not", ConditionOperator::IsNot ; "is not")]
        #[test_case("contains", ConditionOperator::Contains ; "contains")]
        #[test_case("not_contains", ConditionOperator::NotContains ; "not contains")]
        #[test_case("greater_than", ConditionOperator::GreaterThan ; "greater than")]
        #[test_case("less_than", ConditionOperator::LessThan ; "less than")]
        #[test_case("greater_or_equal", ConditionOperator::GreaterOrEqual ; "greater or equal")]
        #[test_case("less_or_equal", ConditionOperator::LessOrEqual ; "less or equal")]
        fn parses_known_operators(raw: &str, expected: ConditionOperator) {
            let op = ConditionOperator::from(raw);
            assert_eq!(op, expected);
            assert_eq!(op.as_str(), raw);
        }

        #[test]
        fn unknown_operator_is_preserved() {
            let op = ConditionOperator::from(">");
            assert_eq!(op, ConditionOperator::Unknown(">".to_string()));
            assert_eq!(String::from(op), ">");
        }

        #[test]
        fn compare_only_for_numeric_operators() {
            assert!(ConditionOperator::GreaterThan.compare(10.0, 5.0));
            assert!(!ConditionOperator::GreaterThan.compare(5.0, 5.0));
            assert!(ConditionOperator::GreaterOrEqual.compare(5.0, 5.0));
            assert!(ConditionOperator::LessThan.compare(1.0, 5.0));
            assert!(ConditionOperator::LessOrEqual.compare(5.0, 5.0));
            assert!(!ConditionOperator::Is.compare(5.0, 5.0));
        }

        #[test]
        fn deserializes_unknown_without_error() {
            let op: ConditionOperator = serde_json::from_str(r#""between""#).unwrap();
            assert_eq!(op, ConditionOperator::Unknown("between".to_string()));
        }
    }

    mod condition_tests {
        use super::*;

        #[test]
        fn sustain_window() {
            let instant = AlertCondition::new("value", ConditionOperator::GreaterThan, "90");
            assert!(instant.sustain_window().is_none());

            let sustained = instant.sustained_for(300);
            assert_eq!(sustained.sustain_window(), Some(chrono::Duration::seconds(300)));
        }

        #[test]
        fn sustain_window_saturates() {
            let cond = AlertCondition::new("value", ConditionOperator::GreaterThan, "90")
                .sustained_for(u64::MAX);
            assert_eq!(cond.sustain_window(), Some(chrono::Duration::MAX));
        }

        #[test]
        fn display() {
            let cond = AlertCondition::new("value", ConditionOperator::GreaterThan, "90")
                .sustained_for(60);
            assert_eq!(cond.to_string(), "value greater_than 90 for 60s");
        }
    }

    mod rule_tests {
        use super::*;

        fn cpu_rule() -> AlertRuleBuilder {
            AlertRule::builder("High CPU", object_types::SYSTEM, Trigger::metric(metrics::CPU_USAGE))
        }

        #[test]
        fn create_rule_with_builder() {
            let rule = cpu_rule()
                .id(RuleId(7))
                .description("CPU above 90%")
                .cooldown_secs(900)
                .condition(
                    AlertCondition::new("value", ConditionOperator::GreaterThan, "90")
                        .sustained_for(300),
                )
                .action(AlertAction::bell())
                .build()
                .unwrap();

            assert_eq!(rule.id, RuleId(7));
            assert!(rule.enabled);
            assert!(!rule.built_in);
            assert_eq!(rule.cooldown(), Some(chrono::Duration::seconds(900)));
            assert_eq!(rule.conditions.len(), 1);
            assert_eq!(rule.actions[0].target, ActionTarget::Bell);
        }

        #[test]
        fn rule_empty_name_fails() {
            let rule = AlertRule::builder("", "system", Trigger::metric("cpu")).build();
            match rule {
                Err(AlertError::InvalidRule { reason }) => assert!(reason.contains("empty")),
                _ => panic!("expected InvalidRule error"),
            }
        }

        #[test]
        fn rule_name_too_long_fails() {
            let long_name = "a".repeat(AlertRule::MAX_NAME_LENGTH + 1);
            let rule = AlertRule::builder(long_name, "system", Trigger::metric("cpu")).build();
            match rule {
                Err(AlertError::InvalidRule { reason }) => assert!(reason.contains("maximum length")),
                _ => panic!("expected InvalidRule error"),
            }
        }

        #[test]
        fn rule_empty_trigger_name_fails() {
            let rule = AlertRule::builder("x", "stream", Trigger::event("")).build();
            match rule {
                Err(AlertError::InvalidRule { reason }) => assert_eq!(reason, "event name cannot be empty"),
                _ => panic!("expected InvalidRule error"),
            }
        }

        #[test]
        fn zero_or_negative_cooldown_is_none() {
            assert!(cpu_rule().build().unwrap().cooldown().is_none());
            assert!(cpu_rule().cooldown_secs(-5).build().unwrap().cooldown().is_none());
        }

        #[test]
        fn huge_cooldown_saturates() {
            let rule = cpu_rule().cooldown_secs(i64::MAX).build().unwrap();
            assert_eq!(rule.cooldown(), Some(chrono::Duration::MAX));
        }

        #[test]
        fn json_uses_flat_trigger_fields() {
            let rule = AlertRule::builder(
                "Stream down",
                object_types::STREAM,
                Trigger::event(events::STREAM_DISCONNECTED),
            )
            .cooldown_secs(300)
            .action(AlertAction::bell().with_title("{{rule_name}}"))
            .build()
            .unwrap();

            let value = serde_json::to_value(&rule).unwrap();
            assert_eq!(value["trigger_type"], "event");
            assert_eq!(value["event_name"], "stream.disconnected");
            assert_eq!(value["cooldown_secs"], 300);
            assert_eq!(value["actions"][0]["target"], "bell");
            assert_eq!(value["actions"][0]["template_title"], "{{rule_name}}");
        }

        #[test]
        fn deserializes_from_stored_json() {
            let input = r#"{
                "id": 3,
                "name": "Test Rule",
                "enabled": true,
                "object_type": "system",
                "trigger_type": "metric",
                "metric_name": "system.cpu_usage",
                "cooldown_secs": 600,
                "conditions": [
                    {"property": "value", "operator": "greater_than", "value": "80", "duration_secs": 120}
                ],
                "actions": [
                    {"target": "push", "template_title": "Alert"}
                ]
            }"#;

            let rule: AlertRule = serde_json::from_str(input).unwrap();
            assert_eq!(rule.id, RuleId(3));
            assert_eq!(rule.trigger, Trigger::metric("system.cpu_usage"));
            assert_eq!(rule.conditions[0].operator, ConditionOperator::GreaterThan);
            assert_eq!(rule.conditions[0].duration_secs, 120);
            assert_eq!(rule.actions[0].target, ActionTarget::Other("push".to_string()));
            assert!(rule.actions[0].message_template.is_empty());
        }
    }

    mod event_tests {
        use super::*;

        #[test]
        fn metric_event_carries_value() {
            let event = AlertEvent::metric(object_types::SYSTEM, metrics::CPU_USAGE, 91.5);
            assert_eq!(event.metric_name(), Some(metrics::CPU_USAGE));
            assert_eq!(event.metric_value(), Some(91.5));
            assert!(event.timestamp.is_none());
        }

        #[test]
        fn discrete_event_has_no_metric_value() {
            let event = AlertEvent::event(object_types::STREAM, events::STREAM_ERROR)
                .with_property(properties::VALUE, 3);
            assert_eq!(event.event_name(), Some(events::STREAM_ERROR));
            assert_eq!(event.metric_value(), None);
        }

        #[test]
        fn non_numeric_metric_value_is_ignored() {
            let event = AlertEvent::event(object_types::SYSTEM, "ignored");
            let event = AlertEvent {
                trigger: Trigger::metric(metrics::DISK_USAGE),
                ..event
            }
            .with_property(properties::VALUE, "full");
            assert_eq!(event.metric_value(), None);
        }
    }
}
