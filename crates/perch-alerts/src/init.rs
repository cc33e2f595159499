//! Wiring the alerting subsystem together at startup.

use std::sync::Arc;

use tracing::info;

use crate::bus::{AlertEventBus, BusHandle};
use crate::config::AlertingConfig;
use crate::defaults::seed_default_rules;
use crate::dispatcher::ActionDispatcher;
use crate::engine::AlertEngine;
use crate::error::Result;
use crate::notify::Notifier;
use crate::repository::AlertRuleRepository;

/// Builds the engine and connects it to `bus`.
///
/// Steps, in order: validate the config, seed missing built-in rules (if
/// enabled), build the dispatcher and engine, load rules, subscribe the
/// engine to the bus, bind `handle` to the bus, and start history cleanup.
///
/// # Errors
///
/// Returns an error if the config is invalid, seeding fails, or the initial
/// rule load fails. Nothing is subscribed or bound in that case.
pub async fn initialize(
    repo: Arc<dyn AlertRuleRepository>,
    bus: &AlertEventBus,
    handle: &BusHandle,
    notifier: Option<Arc<dyn Notifier>>,
    config: &AlertingConfig,
) -> Result<Arc<AlertEngine>> {
    config.validate()?;

    if config.seed_default_rules {
        seed_default_rules(repo.as_ref()).await?;
    }

    let dispatcher = ActionDispatcher::new(notifier).with_notify_timeout(config.notify_timeout());
    let engine = Arc::new(
        AlertEngine::new(repo, config.clone()).with_action_sink(Arc::new(dispatcher)),
    );

    let rules_loaded = engine.refresh_rules().await?;

    bus.subscribe(engine.clone());
    handle.set(bus.clone());
    engine.start_history_cleanup(config.history_retention_days);

    info!(rules_loaded, "alerting engine initialized");
    Ok(engine)
}

/// A running alerting subsystem: the bus and the engine subscribed to it.
#[derive(Debug, Clone)]
pub struct AlertingSystem {
    /// The event bus.
    pub bus: AlertEventBus,
    /// The engine handling bus events.
    pub engine: Arc<AlertEngine>,
    handle: BusHandle,
}

impl AlertingSystem {
    /// Creates a bus sized from `config` and runs [`initialize`] against it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the [`initialize`] error; the new bus is stopped first.
    pub async fn start(
        repo: Arc<dyn AlertRuleRepository>,
        handle: BusHandle,
        notifier: Option<Arc<dyn Notifier>>,
        config: &AlertingConfig,
    ) -> Result<Self> {
        let bus = AlertEventBus::with_capacity(config.bus_capacity);
        match initialize(repo, &bus, &handle, notifier, config).await {
            Ok(engine) => Ok(Self {
                bus,
                engine,
                handle,
            }),
            Err(e) => {
                bus.shutdown().await;
                Err(e)
            }
        }
    }

    /// Returns a handle producers can publish through.
    #[must_use]
    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Unbinds the handle, drains the bus, then stops the engine.
    pub async fn shutdown(&self) {
        self.handle.clear();
        self.bus.shutdown().await;
        self.engine.shutdown().await;
        info!("alerting subsystem stopped");
    }
}
