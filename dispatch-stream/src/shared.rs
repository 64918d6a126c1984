//! State shared between a listener handle, its waiters and its connection task.
//!
//! Everything mutable lives in one [`ListenerState`] behind a `std::sync::Mutex`.
//! Critical sections are short and synchronous; the guard is never held across
//! an `.await` (it is `!Send`, so the connection task would not compile if it
//! were).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::connection;
use crate::error::{ListenerError, Result};
use crate::protocol::{Delivery, ListenerProtocol};
use crate::registry::{Registry, Removal};
use crate::transport::DispatcherTransport;
use crate::types::{ConnectionStatus, SubscriberId};
use crate::waiter::Waiter;

/// Lifecycle of the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Supervisor {
    Stopped,
    Running,
    Exhausted { attempts: u32 },
    Shutdown,
}

/// What the multiplexer should do with a key taken off the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    Announce,
    Skip,
    Superseded,
}

/// What the connection task should do after a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    Reconnect,
    Idle,
    Exhausted,
    Shutdown,
}

pub(crate) struct ListenerState<P: ListenerProtocol> {
    pub registry: Registry<P::Key, P::Event>,
    /// Keys already requested on the current generation's stream
    pub announced: HashSet<P::Key>,
    pub generation: u64,
    pub supervisor: Supervisor,
    task: Option<JoinHandle<()>>,
    /// Request bus feeding the current (or next) generation
    bus: mpsc::UnboundedSender<P::Key>,
    /// Receiver end waiting for the next generation to pick it up
    pending_bus: Option<mpsc::UnboundedReceiver<P::Key>>,
    next_subscriber: u64,
}

impl<P: ListenerProtocol> ListenerState<P> {
    fn new() -> Self {
        let (bus, pending_bus) = mpsc::unbounded_channel();
        Self {
            registry: Registry::new(P::OCCUPANCY),
            announced: HashSet::new(),
            generation: 0,
            supervisor: Supervisor::Stopped,
            task: None,
            bus,
            pending_bus: Some(pending_bus),
            next_subscriber: 1,
        }
    }

    fn allocate_subscriber(&mut self) -> SubscriberId {
        let id = SubscriberId::new(self.next_subscriber);
        self.next_subscriber += 1;
        id
    }

    /// Replace the bus, retiring whichever generation held the old receiver.
    fn fresh_bus(&mut self) -> mpsc::UnboundedReceiver<P::Key> {
        let (bus, receiver) = mpsc::unbounded_channel();
        self.bus = bus;
        receiver
    }

    fn park_bus(&mut self) {
        let receiver = self.fresh_bus();
        self.pending_bus = Some(receiver);
    }
}

pub(crate) struct Shared<P: ListenerProtocol> {
    pub transport: Arc<dyn DispatcherTransport>,
    pub config: ListenerConfig,
    pub shutdown: CancellationToken,
    status: watch::Sender<ConnectionStatus>,
    state: Mutex<ListenerState<P>>,
}

impl<P: ListenerProtocol> Shared<P> {
    pub fn new(transport: Arc<dyn DispatcherTransport>, config: ListenerConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            transport,
            config,
            shutdown: CancellationToken::new(),
            status,
            state: Mutex::new(ListenerState::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ListenerState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a status change. `Shutdown` is final.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == ConnectionStatus::Shutdown || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Register a waiter for `key` and make sure a connection is carrying it.
    pub fn subscribe(self: &Arc<Self>, key: P::Key) -> Result<Waiter<P>> {
        let runtime = Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;
        let (slot, completion) = oneshot::channel();

        let mut state = self.lock();
        match state.supervisor {
            Supervisor::Exhausted { attempts } => {
                return Err(ListenerError::RetriesExhausted { attempts })
            }
            Supervisor::Shutdown => return Err(ListenerError::Shutdown),
            Supervisor::Stopped | Supervisor::Running => {}
        }

        let id = state.allocate_subscriber();
        if let Some((displaced, old_slot)) = state.registry.insert(key.clone(), id, slot) {
            tracing::debug!(
                "{} listener: {} displaced {} on {}",
                P::NAME,
                id,
                displaced,
                key
            );
            let _ = old_slot.send(Err(ListenerError::SubscriptionReplaced(displaced)));
        }

        // The receiver only disappears when its generation is retired, and the
        // next generation replays the registry anyway.
        let _ = state.bus.send(key.clone());

        if state.supervisor == Supervisor::Stopped {
            tracing::debug!("{} listener: starting connection task", P::NAME);
            state.supervisor = Supervisor::Running;
            state.task = Some(runtime.spawn(connection::run(Arc::clone(self))));
        }
        drop(state);

        tracing::trace!("{} listener: {} waiting on {}", P::NAME, id, key);
        Ok(Waiter::new(Arc::clone(self), key, id, completion))
    }

    /// Unregister one waiter; idempotent.
    pub fn release(&self, key: &P::Key, id: SubscriberId) {
        let mut state = self.lock();
        if state.registry.remove(key, id) == Removal::KeyEmptied {
            state.announced.remove(key);
            tracing::trace!("{} listener: no waiters left on {}", P::NAME, key);
        }
    }

    /// Route one inbound event to the waiters registered under its key.
    pub fn dispatch(&self, event: P::Event) {
        let key = P::key_of(&event);

        let slots = match P::delivery(&event) {
            Delivery::Progress => {
                tracing::trace!("{} listener: progress event for {}", P::NAME, key);
                return;
            }
            Delivery::Resolve => {
                let mut state = self.lock();
                let slots = state.registry.take_all(&key);
                if !slots.is_empty() {
                    state.announced.remove(&key);
                }
                slots
            }
        };

        if slots.is_empty() {
            tracing::debug!("{} listener: dropping event for unknown key {}", P::NAME, key);
            return;
        }

        tracing::debug!(
            "{} listener: delivering event for {} to {} waiter(s)",
            P::NAME,
            key,
            slots.len()
        );
        for (id, slot) in slots {
            if slot.send(Ok(event.clone())).is_err() {
                tracing::trace!("{} listener: {} went away before delivery", P::NAME, id);
            }
        }
    }

    /// Start a new generation, returning its number and its request bus.
    pub fn begin_generation(&self) -> Option<(u64, mpsc::UnboundedReceiver<P::Key>)> {
        let mut state = self.lock();
        if state.supervisor == Supervisor::Shutdown {
            return None;
        }

        state.generation += 1;
        state.announced.clear();
        let bus = match state.pending_bus.take() {
            Some(receiver) => receiver,
            None => state.fresh_bus(),
        };
        Some((state.generation, bus))
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Every active key, marked announced for `generation`.
    pub fn replay_snapshot(&self, generation: u64) -> Option<Vec<P::Key>> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }

        let keys = state.registry.keys();
        state.announced.extend(keys.iter().cloned());
        Some(keys)
    }

    pub fn claim(&self, generation: u64, key: &P::Key) -> Claim {
        let mut state = self.lock();
        if state.generation != generation {
            Claim::Superseded
        } else if !state.registry.contains_key(key) {
            Claim::Skip
        } else if state.announced.insert(key.clone()) {
            Claim::Announce
        } else {
            Claim::Skip
        }
    }

    /// Decide whether the connection task should try again after `attempt`
    /// consecutive failures. Transitions the supervisor and status when it
    /// should not; both happen under the lock so a concurrent subscribe sees
    /// either the old task or a stopped one.
    pub fn recovery(&self, attempt: u32) -> Recovery {
        let mut state = self.lock();
        if state.supervisor == Supervisor::Shutdown {
            return Recovery::Shutdown;
        }

        if let Some(max_retries) = self.config.max_retries {
            if attempt > max_retries {
                state.supervisor = Supervisor::Exhausted {
                    attempts: max_retries,
                };
                state.park_bus();
                self.set_status(ConnectionStatus::Exhausted);
                return Recovery::Exhausted;
            }
        }

        if P::IDLE_WHEN_EMPTY && state.registry.is_empty() {
            state.supervisor = Supervisor::Stopped;
            state.park_bus();
            self.set_status(ConnectionStatus::Idle);
            return Recovery::Idle;
        }

        Recovery::Reconnect
    }

    /// Tear the listener down: fail every waiter and stop the connection task.
    pub fn close(&self) -> Option<JoinHandle<()>> {
        let (task, slots) = {
            let mut state = self.lock();
            if state.supervisor == Supervisor::Shutdown {
                return None;
            }
            state.supervisor = Supervisor::Shutdown;
            state.announced.clear();
            (state.task.take(), state.registry.clear())
        };

        self.shutdown.cancel();
        self.set_status(ConnectionStatus::Shutdown);

        for slot in slots {
            let _ = slot.send(Err(ListenerError::Shutdown));
        }
        task
    }
}
