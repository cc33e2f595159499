//! Embedded alerting rules engine for Perch device monitoring.
//!
//! `perch-alerts` watches a stream of domain events (stream connectivity,
//! detections, integration failures) and periodic metric samples (CPU,
//! memory, disk), matches them against user-defined rules, and dispatches
//! notifications when a rule's conditions hold, without firing the same
//! rule more often than its cooldown allows.
//!
//! # Features
//!
//! - **Event Bus**: Non-blocking, bounded publish/subscribe with a single delivery worker
//! - **Sustained Thresholds**: Metric conditions that must hold over a time window
//! - **Cooldowns**: At most one fire per rule per cooldown period
//! - **Templates**: `{{placeholder}}` substitution in notification titles and messages
//! - **Built-in Rules**: A default rule set, seeded by name so it self-heals
//!
//! # Example
//!
//! ```rust
//! use perch_alerts::{
//!     AlertAction, AlertEvent, AlertRule, AlertRuleRepository, AlertingConfig,
//!     AlertingSystem, BusHandle, InMemoryRuleRepository, LogNotifier, Trigger,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> perch_alerts::Result<()> {
//! let repo = Arc::new(InMemoryRuleRepository::new());
//! repo.create_rule(
//!     AlertRule::builder("Stream down", "stream", Trigger::event("stream.disconnected"))
//!         .cooldown_secs(300)
//!         .action(AlertAction::bell().with_title("{{stream_name}} went offline"))
//!         .build()?,
//! )
//! .await?;
//!
//! // Producers hold a handle; it becomes live once the system starts.
//! let handle = BusHandle::new();
//! let system = AlertingSystem::start(
//!     repo,
//!     handle.clone(),
//!     Some(Arc::new(LogNotifier::default())),
//!     &AlertingConfig::default(),
//! )
//! .await?;
//!
//! handle.try_publish(
//!     AlertEvent::event("stream", "stream.disconnected").with_property("stream_name", "garden"),
//! );
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bridge;
pub mod bus;
pub mod config;
pub mod defaults;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod init;
pub mod notify;
pub mod repository;
pub mod tracker;
pub mod types;

// Re-export main types at crate root
pub use bridge::{Detection, DetectionAlertBridge};
pub use bus::{AlertEventBus, AlertEventHandler, BusHandle, PublishOutcome, handler_fn};
pub use config::{AlertingConfig, TrackerConfig};
pub use defaults::{default_rules, seed_default_rules};
pub use dispatcher::{ActionDispatcher, ActionSink, DispatchReport, render_template};
pub use engine::{AlertEngine, EvaluationResult};
pub use error::{AlertError, Result};
pub use evaluator::{evaluate_condition, evaluate_conditions};
pub use init::{AlertingSystem, initialize};
pub use notify::{LogNotifier, Notifier};
pub use repository::{AlertRuleRepository, HistoryQuery, InMemoryRuleRepository};
pub use tracker::{MetricTracker, Sample};
pub use types::{
    ActionTarget, AlertAction, AlertCondition, AlertEvent, AlertHistory, AlertRule,
    AlertRuleBuilder, ConditionOperator, HistoryId, Properties, PropertyValue, RuleId, Trigger,
    TriggerType,
};
