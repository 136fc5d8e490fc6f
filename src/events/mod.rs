//! Channel events: types and the reporting handle.
//!
//! This module groups the event **data model** published on each channel's
//! [`events`](crate::Channel::events) side channel and the internal [`Reporter`]
//! used by producer pumps and transform stages to publish faults.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Reporter`] weak handle that logs a record and publishes it on a channel
//!
//! ## Quick reference
//! - **Publishers**: the subscriber registry (added/removed/panicked), the
//!   producer pump (started/stopped/exhausted/failed), transform stages (failed).
//! - **Consumers**: anything subscribed to `Channel::events()`, e.g. `LogWriter`.

mod event;

use std::sync::Weak;

pub use event::{Event, EventKind};

/// Sink able to publish an [`Event`] on a channel's side channel.
pub(crate) trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Weak, type-erased handle to a channel's event side channel.
///
/// Holding a `Reporter` never keeps the channel alive; events reported after
/// the channel is gone are only logged.
#[derive(Clone)]
pub(crate) struct Reporter {
    sink: Weak<dyn EventSink>,
}

impl Reporter {
    pub(crate) fn new(sink: Weak<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Publishes a fault event, logging it first.
    pub(crate) fn fault(&self, event: Event) {
        tracing::warn!(
            kind = ?event.kind,
            reason = event.reason.as_deref().unwrap_or("unknown"),
            "channel fault"
        );
        self.publish(event);
    }

    /// Publishes an event without logging it.
    pub(crate) fn publish(&self, event: Event) {
        if let Some(sink) = self.sink.upgrade() {
            sink.publish(event);
        }
    }
}
