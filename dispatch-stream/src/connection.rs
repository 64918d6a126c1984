//! Connection supervision for a pooled listener.
//!
//! One task per listener owns the streaming call. It opens the stream for the
//! current generation, routes inbound events to the registry, and decides what
//! to do when the stream ends:
//!
//! - deliberate abort (shutdown): stop without retrying
//! - forced rotation or dispatcher hang-up: reopen immediately, retry count reset
//! - anything else: back off `min(base * 2^(n-1), max)` and reopen, unless
//!   the retry budget is spent (listener becomes unusable) or, for listeners
//!   that idle when empty, no waiter is left
//!
//! Every reopened stream replays the active subscriptions before forwarding
//! new ones (see [`multiplexer`](crate::multiplexer)).

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::multiplexer;
use crate::protocol::ListenerProtocol;
use crate::shared::{Recovery, Shared};
use crate::types::ConnectionStatus;

/// Why a stream generation ended.
#[derive(Debug)]
enum Termination {
    /// Cancelled by shutdown
    Aborted,
    /// Lifetime bound reached
    Rotated,
    /// The dispatcher asked the client to drop the stream
    HungUp,
    /// The transport reported an error
    Failed(TransportError),
    /// The dispatcher closed the stream
    Closed,
}

/// Body of the connection task.
pub(crate) async fn run<P: ListenerProtocol>(shared: Arc<Shared<P>>) {
    let mut retry_count: u32 = 0;
    let mut reconnecting = false;

    loop {
        let Some((generation, bus)) = shared.begin_generation() else {
            break;
        };

        let token = shared.shutdown.child_token();
        let settle = reconnecting.then_some(shared.config.replay_settle_delay);
        let outbound =
            multiplexer::outbound_requests(Arc::clone(&shared), generation, bus, settle, token.clone());

        tracing::debug!(
            "{} listener: opening stream (generation {})",
            P::NAME,
            generation
        );
        shared.set_status(ConnectionStatus::Connecting { generation });

        let termination = consume(&shared, generation, outbound, &token, &mut retry_count).await;
        token.cancel();
        reconnecting = true;

        match termination {
            Termination::Aborted => {
                tracing::debug!("{} listener: stream aborted, stopping", P::NAME);
                break;
            }
            Termination::Rotated => {
                tracing::info!(
                    "{} listener: rotating stream after {:?} (generation {})",
                    P::NAME,
                    shared.config.rotation_interval.unwrap_or_default(),
                    generation
                );
                retry_count = 0;
                continue;
            }
            Termination::HungUp => {
                tracing::debug!("{} listener: dispatcher hung up (generation {})", P::NAME, generation);
                retry_count = 0;
                match shared.recovery(retry_count) {
                    Recovery::Reconnect => continue,
                    Recovery::Idle => return,
                    Recovery::Exhausted | Recovery::Shutdown => break,
                }
            }
            Termination::Failed(error) => {
                tracing::warn!(
                    "{} listener: stream failed (generation {}): {}",
                    P::NAME,
                    generation,
                    error
                );
            }
            Termination::Closed => {
                tracing::debug!(
                    "{} listener: stream closed by dispatcher (generation {})",
                    P::NAME,
                    generation
                );
            }
        }

        retry_count += 1;
        match shared.recovery(retry_count) {
            Recovery::Reconnect => {}
            Recovery::Idle => {
                tracing::debug!("{} listener: no active waiters, going idle", P::NAME);
                return;
            }
            Recovery::Exhausted => {
                tracing::error!(
                    "{} listener: giving up after {} reconnection attempts; listener is unusable",
                    P::NAME,
                    retry_count - 1
                );
                return;
            }
            Recovery::Shutdown => break,
        }

        let delay = shared.config.backoff_delay(retry_count);
        tracing::info!(
            "{} listener: reconnecting in {:?} (attempt {})",
            P::NAME,
            delay,
            retry_count
        );
        shared.set_status(ConnectionStatus::Backoff {
            attempt: retry_count,
            delay,
        });

        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("{} listener: connection task stopped", P::NAME);
}

/// Open the stream for one generation and pump it until it ends.
async fn consume<P: ListenerProtocol>(
    shared: &Shared<P>,
    generation: u64,
    outbound: crate::transport::OutboundStream<P::Request>,
    token: &CancellationToken,
    retry_count: &mut u32,
) -> Termination {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return Termination::Aborted,
        opened = P::open(shared.transport.as_ref(), outbound) => opened,
    };

    let mut inbound = match opened {
        Ok(inbound) => inbound,
        Err(error) => return Termination::Failed(error),
    };

    tracing::debug!(
        "{} listener: stream open (generation {})",
        P::NAME,
        generation
    );
    shared.set_status(ConnectionStatus::Connected { generation });

    let rotation_interval = shared.config.rotation_interval;
    let rotation = async move {
        match rotation_interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(rotation);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Termination::Aborted,
            _ = &mut rotation => return Termination::Rotated,
            message = inbound.next() => match message {
                Some(Ok(event)) => {
                    *retry_count = 0;
                    let hangup = P::is_hangup(&event);
                    shared.dispatch(event);
                    if hangup {
                        return Termination::HungUp;
                    }
                }
                Some(Err(error)) => return Termination::Failed(error),
                None => return Termination::Closed,
            },
        }
    }
}
