//! Subscription registry mapping keys to live waiters
//!
//! The registry keeps two mappings: key → subscriber ids, and subscriber id →
//! completion slot. A key entry exists only while at least one subscriber is
//! registered under it.
//!
//! Every method is synchronous. The owning listener keeps the registry behind
//! a plain mutex and never holds it across an `.await`, so check-then-mutate
//! sequences are atomic with respect to the connection task.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::oneshot;

use crate::error::Result;
use crate::types::SubscriberId;

/// Completion slot of one waiter.
pub(crate) type Slot<E> = oneshot::Sender<Result<E>>;

/// How many waiters may share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// A new subscriber displaces the outstanding one
    Single,
    /// Every subscriber on the key receives each event
    FanOut,
}

/// Outcome of removing one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    /// The subscriber was not registered (already delivered or displaced)
    Missing,
    /// Removed; other subscribers remain on the key
    Removed,
    /// Removed, and the key entry went away with it
    KeyEmptied,
}

pub(crate) struct Registry<K, E> {
    occupancy: Occupancy,
    /// Subscriber ids per key, in subscription order
    keys: HashMap<K, Vec<SubscriberId>>,
    /// Completion slot per subscriber id
    slots: HashMap<SubscriberId, Slot<E>>,
}

impl<K, E> Registry<K, E>
where
    K: Clone + Eq + Hash,
{
    pub fn new(occupancy: Occupancy) -> Self {
        Self {
            occupancy,
            keys: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    /// Register a subscriber, returning any subscriber it displaced.
    pub fn insert(
        &mut self,
        key: K,
        id: SubscriberId,
        slot: Slot<E>,
    ) -> Option<(SubscriberId, Slot<E>)> {
        let displaced = match self.occupancy {
            Occupancy::Single => self
                .keys
                .insert(key, vec![id])
                .and_then(|previous| previous.into_iter().next())
                .and_then(|old| self.slots.remove(&old).map(|slot| (old, slot))),
            Occupancy::FanOut => {
                self.keys.entry(key).or_default().push(id);
                None
            }
        };

        self.slots.insert(id, slot);
        displaced
    }

    /// Remove one subscriber. Safe to call any number of times.
    pub fn remove(&mut self, key: &K, id: SubscriberId) -> Removal {
        let Some(ids) = self.keys.get_mut(key) else {
            return Removal::Missing;
        };
        let Some(position) = ids.iter().position(|candidate| *candidate == id) else {
            return Removal::Missing;
        };

        ids.remove(position);
        self.slots.remove(&id);

        if ids.is_empty() {
            self.keys.remove(key);
            Removal::KeyEmptied
        } else {
            Removal::Removed
        }
    }

    /// Remove the key entry and hand back every slot registered under it.
    pub fn take_all(&mut self, key: &K) -> Vec<(SubscriberId, Slot<E>)> {
        self.keys
            .remove(key)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.slots.remove(&id).map(|slot| (id, slot)))
            .collect()
    }

    /// Drop every entry, returning the outstanding slots.
    pub fn clear(&mut self) -> Vec<Slot<E>> {
        self.keys.clear();
        self.slots.drain().map(|(_, slot)| slot).collect()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.keys.contains_key(key)
    }

    /// Snapshot of every active key.
    pub fn keys(&self) -> Vec<K> {
        self.keys.keys().cloned().collect()
    }

    /// Number of active keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of live subscribers across all keys
    pub fn subscriber_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of live subscribers on one key
    pub fn subscribers_for(&self, key: &K) -> usize {
        self.keys.get(key).map_or(0, Vec::len)
    }
}
