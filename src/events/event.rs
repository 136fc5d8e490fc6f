//! # Lifecycle and fault events emitted by channels.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Subscriber events**: registry edges and isolated callback panics
//! - **Producer events**: start, stop, exhaustion and faults of a channel's producer
//! - **Stage events**: faults of per-value computations in transform stages
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! subscription involved, the subscriber count after the change and a reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events from several channels are merged.
//!
//! ## Example
//! ```rust
//! use conflux::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProducerFailed)
//!     .with_reason("socket closed")
//!     .with_subscribers(2);
//!
//! assert_eq!(ev.kind, EventKind::ProducerFailed);
//! assert_eq!(ev.reason.as_deref(), Some("socket closed"));
//! assert_eq!(ev.subscribers, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::channel::SubscriptionId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of channel events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// A subscription was registered.
    ///
    /// Sets:
    /// - `subscription`: id of the new subscription
    /// - `subscribers`: count after the change
    SubscriberAdded,

    /// A subscription was removed (cancel, token, or liveness probe).
    ///
    /// Sets:
    /// - `subscription`: id of the removed subscription
    /// - `subscribers`: count after the change
    SubscriberRemoved,

    /// A subscriber callback panicked during delivery.
    ///
    /// Sets:
    /// - `subscription`: id of the faulting subscription
    /// - `reason`: panic info/message
    SubscriberPanicked,

    // === Producer events ===
    /// The producer was instantiated on a 0→1 subscriber edge.
    ProducerStarted,

    /// The producer was stopped on a 1→0 subscriber edge.
    ProducerStopped,

    /// The producer ran out of values.
    ProducerExhausted,

    /// The producer (or its factory) faulted; the pump loop ended.
    ///
    /// Sets:
    /// - `reason`: error label and message
    ProducerFailed,

    // === Stage events ===
    /// A per-value computation in a transform stage faulted.
    ///
    /// Sets:
    /// - `reason`: error label and message
    TransformFailed,
}

/// Channel event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Subscription involved, if applicable.
    pub subscription: Option<SubscriptionId>,
    /// Subscriber count after the change, if applicable.
    pub subscribers: Option<usize>,
    /// Human-readable reason (errors, panic payloads).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subscription: None,
            subscribers: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the subscription involved.
    #[inline]
    pub fn with_subscription(mut self, id: SubscriptionId) -> Self {
        self.subscription = Some(id);
        self
    }

    /// Attaches the subscriber count after the change.
    #[inline]
    pub fn with_subscribers(mut self, n: usize) -> Self {
        self.subscribers = Some(n);
        self
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(id: SubscriptionId, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_subscription(id)
            .with_reason(info)
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberPanicked | EventKind::ProducerFailed | EventKind::TransformFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ProducerStarted);
        let b = Event::new(EventKind::ProducerStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_fault_classification() {
        assert!(Event::new(EventKind::TransformFailed).is_fault());
        assert!(!Event::new(EventKind::SubscriberAdded).is_fault());
    }
}
