//! # Pull view over a channel.
//!
//! [`ChannelStream`] bridges push delivery into a [`futures::Stream`]: it
//! registers a callback that enqueues every delivered value into an unbounded
//! FIFO queue and yields queued values one at a time.
//!
//! ## Rules
//! - [`Channel::stream`](crate::Channel::stream) subscribes on the first poll;
//!   [`Channel::listen`](crate::Channel::listen) subscribes immediately.
//! - Dropping the stream cancels its subscription (early termination).
//! - The queue is unbounded: a fast producer and a slow consumer grow memory
//!   without limit.
//! - The stream never ends on its own; channels have no completion signal.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::channel::Channel;
use super::subscription::Subscription;

/// Attached state: the registration and its queue.
struct Attached<V> {
    rx: mpsc::UnboundedReceiver<V>,
    subscription: Subscription,
}

/// Asynchronous iterator over the values of a [`Channel`].
pub struct ChannelStream<V> {
    source: Channel<V>,
    attached: Option<Attached<V>>,
}

impl<V> ChannelStream<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a detached stream; the subscription happens on first poll.
    pub(crate) fn lazy(source: Channel<V>) -> Self {
        Self {
            source,
            attached: None,
        }
    }

    /// Creates a stream that is already subscribed.
    pub(crate) fn attached(source: Channel<V>) -> Self {
        let mut stream = Self::lazy(source);
        stream.attach();
        stream
    }

    /// Returns `true` once the stream holds a live subscription.
    pub fn is_attached(&self) -> bool {
        self.attached
            .as_ref()
            .is_some_and(|a| !a.subscription.is_cancelled())
    }

    /// Returns the number of values buffered and not yet yielded.
    pub fn queued(&self) -> usize {
        self.attached.as_ref().map_or(0, |a| a.rx.len())
    }

    fn attach(&mut self) -> &mut Attached<V> {
        let source = &self.source;
        self.attached.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let subscription = source.subscribe(move |value: &V| {
                let _ = tx.send(value.clone());
            });
            Attached { rx, subscription }
        })
    }
}

impl<V> Stream for ChannelStream<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Item = V;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<V>> {
        let this = self.get_mut();
        this.attach().rx.poll_recv(cx)
    }
}

impl<V> Drop for ChannelStream<V> {
    fn drop(&mut self) {
        if let Some(attached) = self.attached.take() {
            attached.subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_lazy_stream_subscribes_on_first_poll() {
        let ch = Channel::<u32>::new();
        let mut stream = ch.stream();
        assert_eq!(ch.subscriber_count(), 0);
        assert!(!stream.is_attached());

        // nothing queued yet; the poll attaches
        assert!(futures::poll!(stream.next()).is_pending());
        assert_eq!(ch.subscriber_count(), 1);

        ch.submit_all([1, 2, 3]);
        assert_eq!(stream.queued(), 3);
        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
        assert_eq!(stream.next().await, Some(3));
    }

    #[tokio::test]
    async fn test_drop_cancels_subscription() {
        let ch = Channel::<u32>::new();
        let stream = ch.listen();
        assert_eq!(ch.subscriber_count(), 1);
        drop(stream);
        assert_eq!(ch.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_take_terminates_early() {
        let ch = Channel::<u32>::new();
        let stream = ch.listen();
        ch.submit_all([10, 20, 30]);

        let got: Vec<u32> = stream.take(2).collect().await;
        assert_eq!(got, vec![10, 20]);
        assert_eq!(ch.subscriber_count(), 0);
    }
}
