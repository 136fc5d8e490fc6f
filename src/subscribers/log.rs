//! # Event renderer for debugging and demos.
//!
//! [`LogWriter`] renders [`Event`]s through `tracing`: faults at `WARN`,
//! producer lifecycle at `DEBUG`, subscriber edges at `TRACE`.
//!
//! ## Output format (fmt subscriber)
//! ```text
//! DEBUG conflux: [producer-started] seq=3
//! WARN  conflux: [producer-failed] seq=9 reason="producer_failed: error: socket closed"
//! WARN  conflux: [subscriber-panicked] seq=12 subscription=sub#4 reason="index out of bounds"
//! TRACE conflux: [subscriber-removed] seq=14 subscription=sub#4 subscribers=1
//! ```
//!
//! ## Example
//! ```
//! # use conflux::{Channel, LogWriter};
//! let ch = Channel::<u32>::new();
//! let _log = LogWriter::new().attach(&ch);
//! ```

use crate::channel::{Channel, Subscription};
use crate::events::{Event, EventKind};

/// Renders channel events as `tracing` records.
///
/// Enabled via the `logging` feature.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Subscribes this writer to `channel`'s events.
    pub fn attach<V>(self, channel: &Channel<V>) -> Subscription
    where
        V: Clone + Send + Sync + 'static,
    {
        channel.events().subscribe(move |e| self.write(e))
    }

    /// Renders one event.
    pub fn write(&self, e: &Event) {
        let subscription = e.subscription.map(|id| id.to_string());
        let subscription = subscription.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("unknown");

        match e.kind {
            EventKind::SubscriberAdded => {
                tracing::trace!(
                    "[subscriber-added] seq={} subscription={} subscribers={:?}",
                    e.seq,
                    subscription,
                    e.subscribers
                );
            }
            EventKind::SubscriberRemoved => {
                tracing::trace!(
                    "[subscriber-removed] seq={} subscription={} subscribers={:?}",
                    e.seq,
                    subscription,
                    e.subscribers
                );
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(
                    "[subscriber-panicked] seq={} subscription={} reason={:?}",
                    e.seq,
                    subscription,
                    reason
                );
            }
            EventKind::ProducerStarted => {
                tracing::debug!("[producer-started] seq={}", e.seq);
            }
            EventKind::ProducerStopped => {
                tracing::debug!("[producer-stopped] seq={}", e.seq);
            }
            EventKind::ProducerExhausted => {
                tracing::debug!("[producer-exhausted] seq={}", e.seq);
            }
            EventKind::ProducerFailed => {
                tracing::warn!("[producer-failed] seq={} reason={:?}", e.seq, reason);
            }
            EventKind::TransformFailed => {
                tracing::warn!("[transform-failed] seq={} reason={:?}", e.seq, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_subscribes_to_events() {
        let ch = Channel::<u32>::new();
        let events = ch.events();
        let sub = LogWriter::new().attach(&ch);
        assert_eq!(events.subscriber_count(), 1);

        // every kind renders without panicking
        let _ = ch.subscribe(|_| panic!("render me"));
        ch.submit(1);
        sub.cancel();
        assert_eq!(events.subscriber_count(), 0);
    }
}
