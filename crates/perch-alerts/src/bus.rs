//! Asynchronous publish/subscribe channel for alert events.
//!
//! Producers call [`AlertEventBus::publish`], which never blocks: events are
//! queued on a bounded channel and dropped when it is full. A single worker
//! task delivers each event to every subscribed handler, in registration
//! order. Handler errors and panics are logged and do not affect delivery
//! to other handlers.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::types::AlertEvent;

/// Default queue capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1000;

/// A subscriber that receives every published event.
#[async_trait]
pub trait AlertEventHandler: Send + Sync {
    /// Returns the handler name, used in logs.
    fn name(&self) -> &str;

    /// Handles one event. Errors are logged by the bus.
    async fn handle(&self, event: &AlertEvent) -> Result<()>;
}

/// Wraps a closure as a named [`AlertEventHandler`].
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn AlertEventHandler>
where
    F: Fn(AlertEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> AlertEventHandler for FnHandler<F>
where
    F: Fn(AlertEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &AlertEvent) -> Result<()> {
        (self.f)(event.clone()).await
    }
}

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Queued for delivery.
    Enqueued,
    /// Discarded because the queue was full.
    Dropped,
    /// Discarded because the bus has been stopped.
    Stopped,
}

type HandlerList = Arc<RwLock<Vec<Arc<dyn AlertEventHandler>>>>;

struct BusInner {
    sender: mpsc::Sender<AlertEvent>,
    handlers: HandlerList,
    cancel: CancellationToken,
    dropped: AtomicU64,
    failures: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Bounded, non-blocking event bus with a single delivery worker.
///
/// Cloning is cheap and every clone refers to the same queue.
#[derive(Clone)]
pub struct AlertEventBus {
    inner: Arc<BusInner>,
}

impl AlertEventBus {
    /// Creates a bus with the default capacity and starts its worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus with the given capacity and starts its worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handlers: HandlerList = Arc::new(RwLock::new(Vec::new()));
        let cancel = CancellationToken::new();
        let failures = Arc::new(AtomicU64::new(0));

        let worker = tokio::spawn(run_worker(
            receiver,
            Arc::clone(&handlers),
            cancel.clone(),
            Arc::clone(&failures),
        ));

        Self {
            inner: Arc::new(BusInner {
                sender,
                handlers,
                cancel,
                dropped: AtomicU64::new(0),
                failures,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// Registers a handler. Safe to call while events are flowing.
    pub fn subscribe(&self, handler: Arc<dyn AlertEventHandler>) {
        debug!(handler = handler.name(), "alert handler subscribed");
        self.inner.handlers.write().push(handler);
    }

    /// Publishes an event without blocking.
    ///
    /// Stamps the timestamp if unset. Drops the event if the queue is full
    /// or the bus has been stopped.
    pub fn publish(&self, mut event: AlertEvent) -> PublishOutcome {
        if self.inner.cancel.is_cancelled() {
            return PublishOutcome::Stopped;
        }

        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }

        match self.inner.sender.try_send(event) {
            Ok(()) => PublishOutcome::Enqueued,
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    object_type = %event.object_type,
                    trigger = %event.trigger,
                    dropped,
                    "alert bus full, event dropped"
                );
                PublishOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => PublishOutcome::Stopped,
        }
    }

    /// Signals the worker to drain queued events and exit. Idempotent.
    pub fn stop(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!("stopping alert event bus");
            self.inner.cancel.cancel();
        }
    }

    /// Waits for the worker to exit. Returns immediately if already awaited.
    pub async fn wait_stopped(&self) {
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "alert bus worker terminated abnormally");
            }
        }
    }

    /// Stops the bus and waits for queued events to be delivered.
    pub async fn shutdown(&self) {
        self.stop();
        self.wait_stopped().await;
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Returns the number of events dropped because the queue was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of handler invocations that failed or panicked.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Returns the number of events waiting for delivery.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.sender.max_capacity() - self.inner.sender.capacity()
    }

    /// Returns the number of subscribed handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }
}

impl std::fmt::Debug for AlertEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEventBus")
            .field("handlers", &self.handler_count())
            .field("queued", &self.queued())
            .field("dropped", &self.dropped_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<AlertEvent>,
    handlers: HandlerList,
    cancel: CancellationToken,
    failures: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                receiver.close();
                let mut drained = 0_usize;
                while let Some(event) = receiver.recv().await {
                    deliver(&handlers, &event, &failures).await;
                    drained += 1;
                }
                info!(drained, "alert event bus stopped");
                break;
            }
            received = receiver.recv() => match received {
                Some(event) => deliver(&handlers, &event, &failures).await,
                None => {
                    debug!("alert event bus closed");
                    break;
                }
            },
        }
    }
}

async fn deliver(handlers: &HandlerList, event: &AlertEvent, failures: &AtomicU64) {
    let snapshot: Vec<Arc<dyn AlertEventHandler>> = handlers.read().clone();

    for handler in snapshot {
        match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    handler = handler.name(),
                    trigger = %event.trigger,
                    error = %e,
                    "alert handler failed"
                );
            }
            Err(panic) => {
                failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    handler = handler.name(),
                    trigger = %event.trigger,
                    panic = panic_message(panic.as_ref()),
                    "alert handler panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// An optional, late-bound reference to the bus.
///
/// Producers that start before the bus exists hold a handle and publish
/// through it; publishing is a no-op until [`BusHandle::set`] is called.
#[derive(Clone, Default)]
pub struct BusHandle {
    bus: Arc<RwLock<Option<AlertEventBus>>>,
}

impl BusHandle {
    /// Creates an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle already bound to `bus`.
    #[must_use]
    pub fn bound(bus: AlertEventBus) -> Self {
        let handle = Self::new();
        handle.set(bus);
        handle
    }

    /// Binds the handle to `bus`, replacing any previous binding.
    pub fn set(&self, bus: AlertEventBus) {
        *self.bus.write() = Some(bus);
    }

    /// Unbinds the handle, returning the previous bus.
    pub fn clear(&self) -> Option<AlertEventBus> {
        self.bus.write().take()
    }

    /// Returns the bound bus, if any.
    #[must_use]
    pub fn get(&self) -> Option<AlertEventBus> {
        self.bus.read().clone()
    }

    /// Publishes through the bound bus.
    ///
    /// Returns `false` only when no bus is bound. A bound bus that drops the
    /// event still returns `true`.
    pub fn try_publish(&self, event: AlertEvent) -> bool {
        let Some(bus) = self.get() else {
            return false;
        };
        bus.publish(event);
        true
    }
}

impl std::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandle")
            .field("bound", &self.bus.read().is_some())
            .finish()
    }
}
