//! # Subscriber registry and producer state machine.
//!
//! The registry is the single lock-protected piece of state of a channel:
//! registered entries plus the producer slot. Keeping both under one lock makes
//! subscriber-count edges and producer transitions atomic.
//!
//! ## Architecture
//! ```text
//! subscribe ──► Registry::insert ──► 0→1 edge? ──► ProducerState::Idle → Running{gen, token}
//! cancel    ──► Registry::remove ──► 1→0 edge? ──► ProducerState::Running → Idle (token returned)
//! pump exit ──► Registry::finish(gen) ─────────► Running{gen} → Idle
//! ```
//!
//! ## Rules
//! - Entries keep registration order; delivery follows it.
//! - A producer slot is `Running` only while at least one entry exists.
//! - Generations guard against a stale pump resetting a newer instance.
//! - No user code ever runs while the registry lock is held.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::subscription::{Scope, SubscriptionId, SubscriptionState};

/// Subscriber callback; `Arc` identity is the callback identity.
pub type Callback<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// One registered callback.
pub(crate) struct Entry<V> {
    pub(crate) state: Arc<SubscriptionState>,
    pub(crate) callback: Callback<V>,
    pub(crate) scope: Scope,
}

impl<V> Entry<V> {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.state.id()
    }

    /// Returns `true` if delivery to this entry is still permitted.
    pub(crate) fn is_live(&self) -> bool {
        !self.state.is_cancelled() && self.scope.is_alive()
    }
}

/// Producer slot of a channel.
#[derive(Debug, Default)]
pub(crate) enum ProducerState {
    #[default]
    Idle,
    Running {
        generation: u64,
        token: CancellationToken,
    },
}

/// Transition requested by a registry change, applied after the lock is released.
#[derive(Debug)]
pub(crate) enum Transition {
    Start {
        generation: u64,
        token: CancellationToken,
    },
    Stop {
        token: CancellationToken,
    },
}

/// Outcome of an insertion.
pub(crate) struct Inserted {
    /// Subscriber count after the insertion.
    pub(crate) count: usize,
    /// `true` when an identical registration was replaced in place.
    pub(crate) replaced: bool,
    pub(crate) transition: Option<Transition>,
}

/// Subscriber registry with the producer slot.
pub(crate) struct Registry<V> {
    entries: Vec<Arc<Entry<V>>>,
    producer: ProducerState,
    has_factory: bool,
    next_generation: u64,
}

impl<V> Registry<V> {
    pub(crate) fn new(has_factory: bool) -> Self {
        Self {
            entries: Vec::new(),
            producer: ProducerState::Idle,
            has_factory,
            next_generation: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(self.producer, ProducerState::Running { .. })
    }

    /// Returns the current entries in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Entry<V>>> {
        self.entries.clone()
    }

    /// Registers `entry`, replacing an identical callback + scope pair.
    pub(crate) fn insert(&mut self, entry: Entry<V>) -> Inserted {
        let existing = self.entries.iter().position(|e| {
            Arc::ptr_eq(&e.callback, &entry.callback) && e.scope.same(&entry.scope)
        });

        if let Some(idx) = existing {
            self.entries[idx].state.mark_cancelled();
            self.entries[idx] = Arc::new(entry);
            return Inserted {
                count: self.entries.len(),
                replaced: true,
                transition: None,
            };
        }

        self.entries.push(Arc::new(entry));
        let transition = if self.entries.len() == 1 {
            self.start()
        } else {
            None
        };
        Inserted {
            count: self.entries.len(),
            replaced: false,
            transition,
        }
    }

    /// Removes the entry with `id`; returns the count after removal and a stop
    /// transition on the 1→0 edge. `None` if the id was not registered.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<(usize, Option<Transition>)> {
        let idx = self.entries.iter().position(|e| e.id() == id)?;
        self.entries.remove(idx);
        let transition = if self.entries.is_empty() {
            self.stop()
        } else {
            None
        };
        Some((self.entries.len(), transition))
    }

    /// Returns ids of entries whose scope no longer permits delivery.
    pub(crate) fn stale(&self) -> Vec<Arc<SubscriptionState>> {
        self.entries
            .iter()
            .filter(|e| !e.scope.is_alive())
            .map(|e| Arc::clone(&e.state))
            .collect()
    }

    /// Resets the slot after the pump of `generation` ended on its own.
    ///
    /// Returns `false` if a newer instance owns the slot.
    pub(crate) fn finish(&mut self, generation: u64) -> bool {
        match &self.producer {
            ProducerState::Running { generation: g, .. } if *g == generation => {
                self.producer = ProducerState::Idle;
                true
            }
            _ => false,
        }
    }

    fn start(&mut self) -> Option<Transition> {
        if !self.has_factory || self.is_running() {
            return None;
        }
        self.next_generation += 1;
        let token = CancellationToken::new();
        self.producer = ProducerState::Running {
            generation: self.next_generation,
            token: token.clone(),
        };
        Some(Transition::Start {
            generation: self.next_generation,
            token,
        })
    }

    fn stop(&mut self) -> Option<Transition> {
        match std::mem::take(&mut self.producer) {
            ProducerState::Running { token, .. } => Some(Transition::Stop { token }),
            ProducerState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::subscription::Detach;
    use std::sync::Weak;

    struct NoOwner;

    impl Detach for NoOwner {
        fn detach(&self, _id: SubscriptionId) {}
    }

    fn entry(callback: &Callback<u32>) -> Entry<u32> {
        let owner: Weak<dyn Detach> = Weak::<NoOwner>::new();
        Entry {
            state: SubscriptionState::new(SubscriptionId::next(), owner),
            callback: Arc::clone(callback),
            scope: Scope::None,
        }
    }

    #[test]
    fn test_first_insert_starts_producer() {
        let mut reg = Registry::<u32>::new(true);
        let cb: Callback<u32> = Arc::new(|_| {});
        let ins = reg.insert(entry(&cb));
        assert!(matches!(ins.transition, Some(Transition::Start { generation: 1, .. })));
        assert!(reg.is_running());

        let other: Callback<u32> = Arc::new(|_| {});
        let ins = reg.insert(entry(&other));
        assert!(ins.transition.is_none());
        assert_eq!(ins.count, 2);
    }

    #[test]
    fn test_identical_callback_replaces() {
        let mut reg = Registry::<u32>::new(true);
        let cb: Callback<u32> = Arc::new(|_| {});
        let first = entry(&cb);
        let first_state = Arc::clone(&first.state);
        reg.insert(first);

        let ins = reg.insert(entry(&cb));
        assert!(ins.replaced);
        assert_eq!(reg.len(), 1);
        assert!(first_state.is_cancelled());
    }

    #[test]
    fn test_last_remove_stops_producer() {
        let mut reg = Registry::<u32>::new(true);
        let cb: Callback<u32> = Arc::new(|_| {});
        let e = entry(&cb);
        let id = e.id();
        reg.insert(e);

        let (count, transition) = reg.remove(id).unwrap();
        assert_eq!(count, 0);
        assert!(matches!(transition, Some(Transition::Stop { .. })));
        assert!(!reg.is_running());
        assert!(reg.remove(id).is_none());
    }

    #[test]
    fn test_no_factory_never_runs() {
        let mut reg = Registry::<u32>::new(false);
        let cb: Callback<u32> = Arc::new(|_| {});
        let ins = reg.insert(entry(&cb));
        assert!(ins.transition.is_none());
        assert!(!reg.is_running());
    }

    #[test]
    fn test_stale_generation_does_not_reset() {
        let mut reg = Registry::<u32>::new(true);
        let cb: Callback<u32> = Arc::new(|_| {});
        let e = entry(&cb);
        let id = e.id();
        reg.insert(e);
        reg.remove(id);
        reg.insert(entry(&cb));

        assert!(!reg.finish(1));
        assert!(reg.is_running());
        assert!(reg.finish(2));
        assert!(!reg.is_running());
    }
}
