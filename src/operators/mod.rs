//! Operators deriving new channels from existing ones.
//!
//! Every operator returns a cold [`Channel`](crate::Channel) whose producer
//! iterates the upstream's pull view: subscribing to the derived channel
//! subscribes it upstream, and its last cancel releases the upstream
//! subscription. Derived channels need a tokio runtime.
//!
//! ## Contents
//! - `compose`: [`map`](crate::Channel::map), [`filter`](crate::Channel::filter),
//!   [`merge`](crate::Channel::merge) and the async stages
//!   [`map_async`](crate::Channel::map_async),
//!   [`filter_async`](crate::Channel::filter_async),
//!   [`stage`](crate::Channel::stage),
//!   [`map_offload`](crate::Channel::map_offload)
//! - `time`: [`debounce`](crate::Channel::debounce),
//!   [`throttle`](crate::Channel::throttle), [`audit`](crate::Channel::audit),
//!   [`sample`](crate::Channel::sample), [`rate_limit`](crate::Channel::rate_limit)

mod compose;
mod time;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::{Channel, Subscription};

    /// Records every value delivered to `ch`.
    pub(crate) fn record<V: Clone + Send + Sync + 'static>(
        ch: &Channel<V>,
    ) -> (Arc<Mutex<Vec<V>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = ch.subscribe(move |v: &V| sink.lock().push(v.clone()));
        (seen, sub)
    }

    /// Lets spawned pumps drain their queues.
    pub(crate) async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }
}
