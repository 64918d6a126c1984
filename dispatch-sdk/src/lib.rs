//! # dispatch-sdk
//!
//! Client facade for awaiting workflow run results and durable events from a
//! dispatcher.
//!
//! ## Key Features
//!
//! - **Pooled streams**: all waits share one stream per listener
//! - **Run results**: terminal run events decoded into step outputs or errors
//! - **Durable waits**: register wait conditions and await the matching event
//! - **File and environment configuration**: see [`ClientConfig`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispatch_sdk::{ClientConfig, DispatcherClient, DurableEventListenerConditions, WaitOptions};
//!
//! dispatch_sdk::init_tracing()?;
//!
//! let client = DispatcherClient::new(transport, ClientConfig::new().with_namespace("acme_"))?;
//!
//! // Await a workflow run
//! let report: Report = client.run("wf-123").result_as(WaitOptions::default()).await?;
//!
//! // Await a durable signal
//! let event = client
//!     .wait_for_durable_event("task-1", "approval", conditions, WaitOptions::default())
//!     .await?;
//! ```
//!
//! The transport that carries the streams is supplied by the application; see
//! [`DispatcherTransport`].

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod run;

// Re-export main types for convenience
pub use client::DispatcherClient;
pub use config::{ClientConfig, ListenerOverrides};
pub use error::{Result, SdkError};
pub use logging::{init_logging, init_logging_from_env, init_tracing, LoggingError, LoggingMode};
pub use run::{RunOutput, WorkflowRunRef};

// Re-export commonly used types from dispatch-stream
pub use dispatch_stream::{
    Action, BaseMatchCondition, CancellationToken, ConnectionStatus, DispatcherTransport,
    DurableEvent, DurableEventListenerConditions, DurableKey, ListenerConfig, ListenerError,
    RunId, SleepMatchCondition, TransportError, UserEventMatchCondition, WaitOptions,
    WorkflowRunEvent, WorkflowRunEventType,
};
