//! Listener variants.
//!
//! A [`ListenerProtocol`] binds the generic pooled listener to one stream of
//! the dispatcher: which key events are routed by, what request announces
//! interest in a key, and when an event completes its waiters.

use std::fmt;
use std::hash::Hash;

use futures::future::BoxFuture;

use crate::config::ListenerConfig;
use crate::error::TransportResult;
use crate::registry::Occupancy;
use crate::transport::{DispatcherTransport, InboundStream, OutboundStream};
use crate::types::{
    DurableEvent, DurableKey, ListenForDurableEventRequest, RunId,
    SubscribeToWorkflowRunsRequest, WorkflowRunEvent,
};

/// What an inbound event does to the waiters registered under its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resolve and remove every waiter for the key
    Resolve,
    /// Informational only; waiters keep waiting
    Progress,
}

/// Binding between a pooled listener and one dispatcher stream.
pub trait ListenerProtocol: Send + Sync + 'static {
    /// Identity events are routed by
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Outbound message announcing interest in a key
    type Request: Send + 'static;
    /// Inbound message delivered to waiters
    type Event: Clone + fmt::Debug + Send + 'static;

    /// Name used in log messages
    const NAME: &'static str;
    /// How many waiters may share a key
    const OCCUPANCY: Occupancy;
    /// Stop reconnecting once no waiter is left
    const IDLE_WHEN_EMPTY: bool;

    fn default_config() -> ListenerConfig;

    fn request_for(key: &Self::Key) -> Self::Request;

    fn key_of(event: &Self::Event) -> Self::Key;

    fn delivery(event: &Self::Event) -> Delivery;

    /// Whether the dispatcher asked the client to drop the stream.
    fn is_hangup(_event: &Self::Event) -> bool {
        false
    }

    fn open<'a>(
        transport: &'a dyn DispatcherTransport,
        outbound: OutboundStream<Self::Request>,
    ) -> BoxFuture<'a, TransportResult<InboundStream<Self::Event>>>;
}

/// Workflow-run events, one waiter per run.
#[derive(Debug)]
pub struct RunProtocol;

impl ListenerProtocol for RunProtocol {
    type Key = RunId;
    type Request = SubscribeToWorkflowRunsRequest;
    type Event = WorkflowRunEvent;

    const NAME: &'static str = "workflow-run";
    const OCCUPANCY: Occupancy = Occupancy::Single;
    const IDLE_WHEN_EMPTY: bool = true;

    fn default_config() -> ListenerConfig {
        ListenerConfig::run_listener()
    }

    fn request_for(key: &RunId) -> SubscribeToWorkflowRunsRequest {
        SubscribeToWorkflowRunsRequest {
            workflow_run_id: key.clone(),
        }
    }

    fn key_of(event: &WorkflowRunEvent) -> RunId {
        event.workflow_run_id.clone()
    }

    fn delivery(event: &WorkflowRunEvent) -> Delivery {
        if event.event_type.is_terminal() {
            Delivery::Resolve
        } else {
            Delivery::Progress
        }
    }

    fn is_hangup(event: &WorkflowRunEvent) -> bool {
        event.hangup
    }

    fn open<'a>(
        transport: &'a dyn DispatcherTransport,
        outbound: OutboundStream<SubscribeToWorkflowRunsRequest>,
    ) -> BoxFuture<'a, TransportResult<InboundStream<WorkflowRunEvent>>> {
        transport.subscribe_to_workflow_runs(outbound)
    }
}

/// Durable sleep / user-event conditions, fanned out to every waiter on a key.
#[derive(Debug)]
pub struct DurableProtocol;

impl ListenerProtocol for DurableProtocol {
    type Key = DurableKey;
    type Request = ListenForDurableEventRequest;
    type Event = DurableEvent;

    const NAME: &'static str = "durable-event";
    const OCCUPANCY: Occupancy = Occupancy::FanOut;
    const IDLE_WHEN_EMPTY: bool = false;

    fn default_config() -> ListenerConfig {
        ListenerConfig::durable_listener()
    }

    fn request_for(key: &DurableKey) -> ListenForDurableEventRequest {
        ListenForDurableEventRequest {
            task_id: key.task_id.clone(),
            signal_key: key.signal_key.clone(),
        }
    }

    fn key_of(event: &DurableEvent) -> DurableKey {
        event.key()
    }

    fn delivery(_event: &DurableEvent) -> Delivery {
        Delivery::Resolve
    }

    fn open<'a>(
        transport: &'a dyn DispatcherTransport,
        outbound: OutboundStream<ListenForDurableEventRequest>,
    ) -> BoxFuture<'a, TransportResult<InboundStream<DurableEvent>>> {
        transport.listen_for_durable_events(outbound)
    }
}
