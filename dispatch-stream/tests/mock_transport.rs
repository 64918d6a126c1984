//! Scripted in-memory dispatcher for integration tests.
//!
//! Every stream the listener opens shows up as a [`MockConnection`] on the
//! matching receiver of [`MockConnections`]. The test reads the requests the
//! listener writes, pushes events back, and fails or closes the stream at will.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dispatch_stream::{
    DispatcherTransport, DurableEvent, InboundStream, ListenForDurableEventRequest,
    OutboundStream, RegisterDurableEventRequest, RegisterDurableEventResponse,
    SubscribeToWorkflowRunsRequest, TransportError, TransportResult, WorkflowRunEvent,
};
use futures::channel::mpsc as stream_channel;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type RunConnection = MockConnection<SubscribeToWorkflowRunsRequest, WorkflowRunEvent>;
pub type DurableConnection = MockConnection<ListenForDurableEventRequest, DurableEvent>;

/// How long a test waits for the listener before giving up.
const WAIT: Duration = Duration::from_secs(30);

/// One open stream, seen from the dispatcher side.
pub struct MockConnection<Req, Ev> {
    /// When the listener opened the stream
    pub opened_at: Instant,
    requests: OutboundStream<Req>,
    events: stream_channel::UnboundedSender<Result<Ev, TransportError>>,
}

impl<Req, Ev> MockConnection<Req, Ev> {
    /// Next request written by the listener.
    pub async fn next_request(&mut self) -> Req {
        tokio::time::timeout(WAIT, self.requests.next())
            .await
            .expect("Timed out waiting for a request")
            .expect("Outbound stream ended")
    }

    /// Next `count` requests, in order.
    pub async fn take_requests(&mut self, count: usize) -> Vec<Req> {
        let mut requests = Vec::with_capacity(count);
        for _ in 0..count {
            requests.push(self.next_request().await);
        }
        requests
    }

    /// A request that is ready right now, without waiting.
    pub fn ready_request(&mut self) -> Option<Req> {
        self.requests.next().now_or_never().flatten()
    }

    /// Whether the listener stopped writing on this stream.
    pub async fn outbound_finished(&mut self) -> bool {
        matches!(
            tokio::time::timeout(WAIT, self.requests.next()).await,
            Ok(None)
        )
    }

    pub fn push(&self, event: Ev) {
        let _ = self.events.unbounded_send(Ok(event));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.events.unbounded_send(Err(error));
    }

    /// End the stream cleanly from the dispatcher side.
    pub fn close(self) {}

    /// Whether the listener dropped its end of the inbound stream.
    pub fn is_retired(&self) -> bool {
        self.events.is_closed()
    }
}

/// Receivers for the streams opened through a [`MockTransport`].
pub struct MockConnections {
    runs: mpsc::UnboundedReceiver<RunConnection>,
    durables: mpsc::UnboundedReceiver<DurableConnection>,
}

impl MockConnections {
    pub async fn next_run(&mut self) -> RunConnection {
        tokio::time::timeout(WAIT, self.runs.recv())
            .await
            .expect("Timed out waiting for a run stream")
            .expect("Transport dropped")
    }

    pub async fn next_durable(&mut self) -> DurableConnection {
        tokio::time::timeout(WAIT, self.durables.recv())
            .await
            .expect("Timed out waiting for a durable stream")
            .expect("Transport dropped")
    }

    /// A run stream opened within `within`, if any.
    pub async fn try_next_run(&mut self, within: Duration) -> Option<RunConnection> {
        tokio::time::timeout(within, self.runs.recv()).await.ok().flatten()
    }
}

pub struct MockTransport {
    runs: mpsc::UnboundedSender<RunConnection>,
    durables: mpsc::UnboundedSender<DurableConnection>,
    open_errors: Mutex<VecDeque<TransportError>>,
    registration_error: Mutex<Option<TransportError>>,
    registrations: Mutex<Vec<RegisterDurableEventRequest>>,
    opens: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, MockConnections) {
        let (runs, run_rx) = mpsc::unbounded_channel();
        let (durables, durable_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            runs,
            durables,
            open_errors: Mutex::new(VecDeque::new()),
            registration_error: Mutex::new(None),
            registrations: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        });
        let connections = MockConnections {
            runs: run_rx,
            durables: durable_rx,
        };
        (transport, connections)
    }

    /// Make the next `count` stream opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        let mut errors = self.open_errors.lock().unwrap();
        for _ in 0..count {
            errors.push_back(TransportError::Unavailable("connection refused".to_string()));
        }
    }

    pub fn fail_registrations(&self, error: TransportError) {
        *self.registration_error.lock().unwrap() = Some(error);
    }

    /// Number of stream opens attempted, failed ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<RegisterDurableEventRequest> {
        self.registrations.lock().unwrap().clone()
    }

    fn open<Req, Ev>(
        &self,
        outbound: OutboundStream<Req>,
        sink: &mpsc::UnboundedSender<MockConnection<Req, Ev>>,
    ) -> TransportResult<InboundStream<Ev>>
    where
        Ev: Send + 'static,
    {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.open_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let (events, inbound) = stream_channel::unbounded();
        let connection = MockConnection {
            opened_at: Instant::now(),
            requests: outbound,
            events,
        };
        sink.send(connection)
            .map_err(|_| TransportError::Unavailable("test finished".to_string()))?;
        Ok(inbound.boxed())
    }
}

#[async_trait]
impl DispatcherTransport for MockTransport {
    async fn subscribe_to_workflow_runs(
        &self,
        outbound: OutboundStream<SubscribeToWorkflowRunsRequest>,
    ) -> TransportResult<InboundStream<WorkflowRunEvent>> {
        self.open(outbound, &self.runs)
    }

    async fn listen_for_durable_events(
        &self,
        outbound: OutboundStream<ListenForDurableEventRequest>,
    ) -> TransportResult<InboundStream<DurableEvent>> {
        self.open(outbound, &self.durables)
    }

    async fn register_durable_event(
        &self,
        request: RegisterDurableEventRequest,
    ) -> TransportResult<RegisterDurableEventResponse> {
        if let Some(error) = self.registration_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.registrations.lock().unwrap().push(request);
        Ok(RegisterDurableEventResponse::default())
    }
}

/// Build a durable event for `task_id`/`signal_key`.
pub fn durable_event(task_id: &str, signal_key: &str, data: serde_json::Value) -> DurableEvent {
    DurableEvent {
        task_id: task_id.to_string(),
        signal_key: signal_key.to_string(),
        data,
    }
}
