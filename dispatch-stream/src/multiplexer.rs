//! Outbound request generation for one stream generation.
//!
//! Subscribe calls can happen at any time: before a stream exists, while one
//! is reconnecting, or for a key that is already active. The stream built here
//! turns them into one ordered sequence of requests for a single generation:
//!
//! 1. after a reconnect, wait `replay_settle_delay`;
//! 2. replay every key still in the registry, unconditionally;
//! 3. forward keys from the request bus, skipping keys that were already
//!    announced on this generation or whose waiters are gone.
//!
//! The stream ends as soon as its generation is cancelled or superseded, so
//! nothing is ever written onto a retired call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::ListenerProtocol;
use crate::shared::{Claim, Shared};
use crate::transport::OutboundStream;

enum Phase<K> {
    Settle(Duration),
    Snapshot,
    Replay(VecDeque<K>),
    Live,
}

struct Outbound<P: ListenerProtocol> {
    shared: Arc<Shared<P>>,
    generation: u64,
    token: CancellationToken,
    bus: mpsc::UnboundedReceiver<P::Key>,
    phase: Phase<P::Key>,
}

/// Build the outbound request stream for `generation`.
///
/// `settle` is `Some` when the generation replaces a previous stream.
pub(crate) fn outbound_requests<P: ListenerProtocol>(
    shared: Arc<Shared<P>>,
    generation: u64,
    bus: mpsc::UnboundedReceiver<P::Key>,
    settle: Option<Duration>,
    token: CancellationToken,
) -> OutboundStream<P::Request> {
    let phase = match settle {
        Some(delay) => Phase::Settle(delay),
        None => Phase::Snapshot,
    };

    let outbound = Outbound {
        shared,
        generation,
        token,
        bus,
        phase,
    };

    Box::pin(stream::unfold(outbound, |mut out| async move {
        loop {
            match std::mem::replace(&mut out.phase, Phase::Live) {
                Phase::Settle(delay) => {
                    tokio::select! {
                        biased;
                        _ = out.token.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    out.phase = Phase::Snapshot;
                }
                Phase::Snapshot => {
                    let Some(keys) = out.shared.replay_snapshot(out.generation) else {
                        return None;
                    };
                    if !keys.is_empty() {
                        tracing::debug!(
                            "{} listener: replaying {} subscription(s) on generation {}",
                            P::NAME,
                            keys.len(),
                            out.generation
                        );
                    }
                    out.phase = Phase::Replay(keys.into());
                }
                Phase::Replay(mut queue) => {
                    let Some(key) = queue.pop_front() else {
                        continue;
                    };
                    if out.token.is_cancelled() || !out.shared.is_current(out.generation) {
                        return None;
                    }
                    let request = P::request_for(&key);
                    out.phase = Phase::Replay(queue);
                    return Some((request, out));
                }
                Phase::Live => {
                    let key = tokio::select! {
                        biased;
                        _ = out.token.cancelled() => return None,
                        key = out.bus.recv() => key,
                    };
                    let Some(key) = key else {
                        return None;
                    };

                    match out.shared.claim(out.generation, &key) {
                        Claim::Announce => {
                            tracing::trace!(
                                "{} listener: announcing {} on generation {}",
                                P::NAME,
                                key,
                                out.generation
                            );
                            let request = P::request_for(&key);
                            return Some((request, out));
                        }
                        Claim::Skip => {}
                        Claim::Superseded => return None,
                    }
                }
            }
        }
    }))
}
