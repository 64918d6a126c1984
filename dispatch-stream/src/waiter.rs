//! Single-resolution handles for one "await this event" call.
//!
//! A [`Waiter`] is created by `subscribe` and ends in exactly one terminal
//! state: resolved with an event, or rejected (caller cancellation, displaced
//! by a newer subscriber, listener shut down). Its registry entry is released
//! exactly once, whichever path finishes it, including being dropped unawaited.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{ListenerError, Result};
use crate::protocol::{DurableProtocol, ListenerProtocol, RunProtocol};
use crate::shared::Shared;
use crate::types::SubscriberId;

/// Options for awaiting a waiter.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Fires to abandon the wait; only this waiter is affected
    pub signal: Option<CancellationToken>,
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Whether the signal had already fired.
    pub fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// One pending event delivery.
pub struct Waiter<P: ListenerProtocol> {
    shared: Arc<Shared<P>>,
    key: P::Key,
    id: SubscriberId,
    completion: oneshot::Receiver<Result<P::Event>>,
    cleaned_up: bool,
}

/// Waiter on the workflow-run listener.
pub type RunWaiter = Waiter<RunProtocol>;

/// Waiter on the durable-event listener.
pub type DurableWaiter = Waiter<DurableProtocol>;

impl<P: ListenerProtocol> Waiter<P> {
    pub(crate) fn new(
        shared: Arc<Shared<P>>,
        key: P::Key,
        id: SubscriberId,
        completion: oneshot::Receiver<Result<P::Event>>,
    ) -> Self {
        Self {
            shared,
            key,
            id,
            completion,
            cleaned_up: false,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn key(&self) -> &P::Key {
        &self.key
    }

    /// Wait for the event.
    ///
    /// If `options.signal` has already fired the wait is rejected right away
    /// without looking at the completion slot. Otherwise the first of event
    /// delivery and signal wins.
    pub async fn wait(mut self, options: WaitOptions) -> Result<P::Event> {
        let outcome = match options.signal {
            Some(signal) if signal.is_cancelled() => Err(ListenerError::Cancelled),
            Some(signal) => {
                tokio::select! {
                    biased;
                    delivered = &mut self.completion => flatten(delivered),
                    _ = signal.cancelled() => Err(ListenerError::Cancelled),
                }
            }
            None => flatten((&mut self.completion).await),
        };

        self.cleanup();
        outcome
    }

    /// Release the registry entry. Runs at most once.
    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.shared.release(&self.key, self.id);
    }
}

fn flatten<E>(delivered: std::result::Result<Result<E>, oneshot::error::RecvError>) -> Result<E> {
    delivered.unwrap_or(Err(ListenerError::Shutdown))
}

impl<P: ListenerProtocol> IntoFuture for Waiter<P> {
    type Output = Result<P::Event>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait(WaitOptions::default()))
    }
}

impl<P: ListenerProtocol> Drop for Waiter<P> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<P: ListenerProtocol> fmt::Debug for Waiter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("cleaned_up", &self.cleaned_up)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::transport::OfflineTransport;
    use crate::types::{DurableEvent, DurableKey, RunId, WorkflowRunEvent, WorkflowRunEventType};
    use tokio_test::{assert_pending, assert_ready, task};

    fn shared<P: ListenerProtocol>() -> Arc<Shared<P>> {
        Arc::new(Shared::new(Arc::new(OfflineTransport), P::default_config()))
    }

    fn finished(run_id: &str) -> WorkflowRunEvent {
        WorkflowRunEvent::new(run_id, WorkflowRunEventType::Finished)
    }

    #[tokio::test]
    async fn test_pending_until_delivery() {
        let shared = shared::<RunProtocol>();
        let waiter = shared.subscribe(RunId::new("wf-1")).unwrap();

        let mut wait = task::spawn(waiter.wait(WaitOptions::default()));
        assert_pending!(wait.poll());

        shared.dispatch(finished("wf-1"));
        assert!(wait.is_woken());
        let event = assert_ready!(wait.poll()).unwrap();

        assert_eq!(event.workflow_run_id, RunId::new("wf-1"));
        assert!(shared.lock().registry.is_empty());
    }

    #[tokio::test]
    async fn test_pre_fired_signal_wins_over_delivered_event() {
        let shared = shared::<RunProtocol>();
        let waiter = shared.subscribe(RunId::new("wf-1")).unwrap();
        shared.dispatch(finished("wf-1"));

        let signal = CancellationToken::new();
        signal.cancel();
        let outcome = waiter.wait(WaitOptions::new().with_signal(signal)).await;

        assert!(matches!(outcome, Err(ListenerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_signal_rejects_pending_wait() {
        let shared = shared::<RunProtocol>();
        let waiter = shared.subscribe(RunId::new("wf-1")).unwrap();
        let signal = CancellationToken::new();

        let mut wait = task::spawn(waiter.wait(WaitOptions::new().with_signal(signal.clone())));
        assert_pending!(wait.poll());

        signal.cancel();
        assert!(wait.is_woken());
        assert!(assert_ready!(wait.poll()).unwrap_err().is_cancelled());
        assert!(!shared.lock().registry.contains_key(&RunId::new("wf-1")));

        // A late event for the key finds nobody
        shared.dispatch(finished("wf-1"));
    }

    #[tokio::test]
    async fn test_delivery_resolves_exactly_once() {
        let shared = shared::<RunProtocol>();
        let waiter = shared.subscribe(RunId::new("wf-1")).unwrap();

        shared.dispatch(finished("wf-1"));
        shared.dispatch(WorkflowRunEvent::new("wf-1", WorkflowRunEventType::Failed));

        let event = waiter.await.unwrap();
        assert_eq!(event.event_type, WorkflowRunEventType::Finished);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let shared = shared::<DurableProtocol>();
        let key = DurableKey::new("task-1", "signal");
        let first = shared.subscribe(key.clone()).unwrap();
        let _second = shared.subscribe(key.clone()).unwrap();
        let first_id = first.id();

        drop(first);
        assert_eq!(shared.lock().registry.subscribers_for(&key), 1);

        shared.release(&key, first_id);
        shared.release(&key, first_id);
        assert_eq!(shared.lock().registry.subscribers_for(&key), 1);
    }

    #[tokio::test]
    async fn test_dropped_slot_reads_as_shutdown() {
        let shared = shared::<DurableProtocol>();
        let key = DurableKey::new("task-1", "signal");
        let waiter = shared.subscribe(key.clone()).unwrap();

        drop(shared.lock().registry.take_all(&key));

        assert!(matches!(waiter.await, Err(ListenerError::Shutdown)));
    }

    #[tokio::test]
    async fn test_fan_out_delivers_clones() {
        let shared = shared::<DurableProtocol>();
        let key = DurableKey::new("task-1", "signal");
        let waiters: Vec<_> = (0..3)
            .map(|_| shared.subscribe(key.clone()).unwrap())
            .collect();

        shared.dispatch(DurableEvent {
            task_id: "task-1".to_string(),
            signal_key: "signal".to_string(),
            data: serde_json::json!({"n": 1}),
        });

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().data, serde_json::json!({"n": 1}));
        }
        assert!(shared.lock().registry.is_empty());
    }
}
