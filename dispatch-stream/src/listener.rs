//! Public listener API.
//!
//! A [`PooledListener`] multiplexes any number of waiters over one streaming
//! call to the dispatcher. The call is opened on first use, recovered
//! transparently after failures, and shared by every waiter of the listener.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ListenerConfig;
use crate::error::{ListenerError, Result};
use crate::protocol::{DurableProtocol, ListenerProtocol, RunProtocol};
use crate::shared::Shared;
use crate::transport::DispatcherTransport;
use crate::types::{
    ConnectionStatus, DurableEvent, RegisterDurableEventRequest, RegisterDurableEventResponse,
};
use crate::waiter::{WaitOptions, Waiter};

/// Multiplexes waiters for one dispatcher stream over a single connection.
///
/// # Example
///
/// ```rust,ignore
/// use dispatch_stream::{RunListener, RunId, WaitOptions};
///
/// let listener = RunListener::new(transport);
/// let event = listener.get(RunId::new("wf-123"), WaitOptions::default()).await?;
/// println!("run finished: {:?}", event.event_type);
/// ```
pub struct PooledListener<P: ListenerProtocol> {
    shared: Arc<Shared<P>>,
}

/// Listener for workflow-run events (one waiter per run).
///
/// Only terminal events resolve a waiter; progress events for a run are
/// consumed without reaching the caller.
pub type RunListener = PooledListener<RunProtocol>;

/// Listener for durable events (any number of waiters per key).
pub type DurableListener = PooledListener<DurableProtocol>;

impl<P: ListenerProtocol> PooledListener<P> {
    /// Create a listener with the variant's default configuration.
    pub fn new(transport: Arc<dyn DispatcherTransport>) -> Self {
        Self {
            shared: Arc::new(Shared::new(transport, P::default_config())),
        }
    }

    /// Create a listener with a custom configuration.
    pub fn with_config(
        transport: Arc<dyn DispatcherTransport>,
        config: ListenerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(transport, config)),
        })
    }

    /// Register interest in `key` and return a handle to await the event.
    ///
    /// Must be called within a Tokio runtime; the connection is started on
    /// first use. Fails fast once the listener has given up reconnecting or
    /// has been shut down.
    pub fn subscribe(&self, key: impl Into<P::Key>) -> Result<Waiter<P>> {
        self.shared.subscribe(key.into())
    }

    /// Subscribe to `key` and wait for its event.
    ///
    /// An already-fired signal rejects before anything is registered.
    pub async fn get(&self, key: impl Into<P::Key>, options: WaitOptions) -> Result<P::Event> {
        if options.is_cancelled() {
            return Err(ListenerError::Cancelled);
        }
        self.subscribe(key)?.wait(options).await
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Watch connection status changes.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_watch()
    }

    /// Number of keys with at least one live waiter.
    pub fn active_subscriptions(&self) -> usize {
        self.shared.lock().registry.len()
    }

    /// Number of live waiters across all keys.
    pub fn waiter_count(&self) -> usize {
        self.shared.lock().registry.subscriber_count()
    }

    /// Number of live waiters on `key`.
    pub fn waiters_for(&self, key: &P::Key) -> usize {
        self.shared.lock().registry.subscribers_for(key)
    }

    /// Whether `key` has at least one live waiter.
    pub fn is_subscribed(&self, key: &P::Key) -> bool {
        self.shared.lock().registry.contains_key(key)
    }

    /// Generation number of the most recent stream.
    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.shared.config
    }

    /// Shut the listener down.
    ///
    /// Every outstanding waiter is rejected with [`ListenerError::Shutdown`]
    /// and the connection task is given `shutdown_timeout` to stop.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::debug!("{} listener: shutting down", P::NAME);
        let Some(task) = self.shared.close() else {
            return Ok(());
        };

        match tokio::time::timeout(self.shared.config.shutdown_timeout, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ListenerError::ShutdownError(format!(
                "Connection task panicked: {e}"
            ))),
            Err(_) => Err(ListenerError::ShutdownError(format!(
                "Connection task shutdown timed out after {:?}",
                self.shared.config.shutdown_timeout
            ))),
        }
    }
}

impl PooledListener<DurableProtocol> {
    /// Establish server-side wait conditions for a durable event.
    ///
    /// Call before the first `subscribe` for the request's key.
    pub async fn register_durable_event(
        &self,
        request: RegisterDurableEventRequest,
    ) -> Result<RegisterDurableEventResponse> {
        tracing::debug!(
            "{} listener: registering {} ({} sleep, {} user event condition(s))",
            DurableProtocol::NAME,
            request.key(),
            request.conditions.sleep_conditions.len(),
            request.conditions.user_event_conditions.len()
        );

        self.shared
            .transport
            .register_durable_event(request)
            .await
            .map_err(ListenerError::Registration)
    }

    /// Register wait conditions, then wait for the matching event.
    pub async fn wait_for(
        &self,
        request: RegisterDurableEventRequest,
        options: WaitOptions,
    ) -> Result<DurableEvent> {
        if options.is_cancelled() {
            return Err(ListenerError::Cancelled);
        }

        let key = request.key();
        self.register_durable_event(request).await?;
        self.get(key, options).await
    }
}

impl<P: ListenerProtocol> Drop for PooledListener<P> {
    fn drop(&mut self) {
        self.shared.close();
    }
}
