//! The seam between the listeners and whatever carries their streams.
//!
//! Implementations wrap generated RPC stubs (or an in-memory fake in tests).
//! A listener hands the transport an outbound request stream and gets back
//! the inbound event stream for the same call.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{TransportError, TransportResult};
use crate::types::{
    DurableEvent, ListenForDurableEventRequest, RegisterDurableEventRequest,
    RegisterDurableEventResponse, SubscribeToWorkflowRunsRequest, WorkflowRunEvent,
};

/// Requests written by a listener onto an open call.
pub type OutboundStream<T> = BoxStream<'static, T>;

/// Events read back from an open call.
pub type InboundStream<T> = BoxStream<'static, Result<T, TransportError>>;

/// Raw call primitives offered by the dispatcher.
#[async_trait]
pub trait DispatcherTransport: Send + Sync {
    /// Open the bidirectional workflow-run event stream.
    async fn subscribe_to_workflow_runs(
        &self,
        outbound: OutboundStream<SubscribeToWorkflowRunsRequest>,
    ) -> TransportResult<InboundStream<WorkflowRunEvent>>;

    /// Open the bidirectional durable event stream.
    async fn listen_for_durable_events(
        &self,
        outbound: OutboundStream<ListenForDurableEventRequest>,
    ) -> TransportResult<InboundStream<DurableEvent>>;

    /// Establish server-side wait conditions for a durable event.
    async fn register_durable_event(
        &self,
        request: RegisterDurableEventRequest,
    ) -> TransportResult<RegisterDurableEventResponse>;
}

/// Transport whose streams never open and whose unary calls always fail.
#[cfg(test)]
pub(crate) struct OfflineTransport;

#[cfg(test)]
#[async_trait]
impl DispatcherTransport for OfflineTransport {
    async fn subscribe_to_workflow_runs(
        &self,
        _outbound: OutboundStream<SubscribeToWorkflowRunsRequest>,
    ) -> TransportResult<InboundStream<WorkflowRunEvent>> {
        std::future::pending().await
    }

    async fn listen_for_durable_events(
        &self,
        _outbound: OutboundStream<ListenForDurableEventRequest>,
    ) -> TransportResult<InboundStream<DurableEvent>> {
        std::future::pending().await
    }

    async fn register_durable_event(
        &self,
        _request: RegisterDurableEventRequest,
    ) -> TransportResult<RegisterDurableEventResponse> {
        Err(TransportError::Unavailable("offline".to_string()))
    }
}
