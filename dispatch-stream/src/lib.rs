//! # dispatch-stream
//!
//! Pooled streaming listeners for a workflow dispatcher.
//!
//! Many concurrent callers want to wait for "the event for key K". Instead of
//! opening one server stream per caller, a listener multiplexes every waiter
//! over a single long-lived bidirectional stream, keeps it alive across
//! failures, and routes each inbound event to the waiters registered under its
//! key.
//!
//! ## Key Features
//!
//! - **One stream per listener**: opened lazily on the first subscribe
//! - **Transparent recovery**: exponential backoff, bounded or unbounded retries
//! - **Replay after reconnect**: every active key is re-announced on each new stream
//! - **Per-waiter cancellation**: a fired signal only affects its own waiter
//! - **Two variants**: [`RunListener`] (one waiter per run, terminal events only)
//!   and [`DurableListener`] (fan-out, bounded retries, periodic rotation)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dispatch_stream::{DurableKey, DurableListener, RegisterDurableEventRequest, WaitOptions};
//!
//! let listener = DurableListener::new(Arc::new(transport));
//!
//! let request = RegisterDurableEventRequest::new(DurableKey::new("task-1", "approval"), vec![], vec![]);
//! let event = listener.wait_for(request, WaitOptions::default()).await?;
//! println!("payload: {}", event.data);
//! ```
//!
//! ## Architecture
//!
//! 1. **Registry**: key to waiters, each with a single-use completion slot
//! 2. **Request bus**: subscribe calls push keys; the current stream consumes them
//! 3. **Generations**: every (re)opened stream is a new generation that replays
//!    the registry, then forwards live keys not yet announced on it
//! 4. **Connection task**: one per listener; opens, pumps and recovers the stream
//!
//! The network side is abstracted behind [`DispatcherTransport`].

mod config;
mod connection;
mod error;
mod listener;
mod multiplexer;
mod protocol;
mod registry;
mod shared;
mod transport;
mod types;
mod waiter;

pub use config::ListenerConfig;
pub use error::{ListenerError, Result, TransportError, TransportResult};
pub use listener::{DurableListener, PooledListener, RunListener};
pub use protocol::{Delivery, DurableProtocol, ListenerProtocol, RunProtocol};
pub use registry::Occupancy;
pub use transport::{DispatcherTransport, InboundStream, OutboundStream};
pub use types::*;
pub use waiter::{DurableWaiter, RunWaiter, WaitOptions, Waiter};

// Re-export commonly used types from dependencies
pub use tokio_util::sync::CancellationToken;
