//! # Producers backing cold channels.
//!
//! A [`Producer`] is a resumable source of values: the channel repeatedly
//! awaits [`Producer::next`] and broadcasts each value, and calls
//! [`Producer::stop`] when the last subscriber leaves.
//!
//! ## Pump loop
//! ```text
//! 0→1 edge ──► factory() ──► spawn pump(producer, token)
//!
//! loop {
//!   ├─► token cancelled?      ─► producer.stop(), ProducerStopped, exit
//!   ├─► next() = Ok(Some(v))  ─► channel.submit(v)
//!   ├─► next() = Ok(None)     ─► ProducerExhausted, exit
//!   └─► next() = Err / panic  ─► ProducerFailed, exit (no retry)
//! }
//! ```
//!
//! ## Rules
//! - At most one live instance per channel; it exists only while subscribers exist.
//! - A running pump keeps its channel alive, so subscribers outlive dropped
//!   handles; the 1→0 edge ends the pump and releases it.
//! - Cancellation wins over a simultaneously ready value.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ProducerError, panic_message};

use super::channel::Shared;

/// Resumable, stoppable source of values for a channel.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use conflux::{Producer, ProducerError};
///
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl Producer<u32> for Countdown {
///     async fn next(&mut self) -> Result<Option<u32>, ProducerError> {
///         if self.0 == 0 {
///             return Ok(None);
///         }
///         self.0 -= 1;
///         Ok(Some(self.0))
///     }
/// }
/// ```
#[async_trait]
pub trait Producer<V: Send + 'static>: Send + 'static {
    /// Produces the next value; `Ok(None)` signals exhaustion.
    async fn next(&mut self) -> Result<Option<V>, ProducerError>;

    /// Releases resources once the channel no longer needs values.
    ///
    /// Called only when the producer is stopped by a 1→0 subscriber edge.
    async fn stop(&mut self) {}
}

/// Owned, type-erased producer instance.
pub type BoxProducer<V> = Box<dyn Producer<V>>;

/// Factory creating a fresh producer instance per 0→1 subscriber edge.
pub type ProducerFactory<V> = Arc<dyn Fn() -> BoxProducer<V> + Send + Sync>;

/// Stream-backed producer.
///
/// Wraps any `Stream<Item = V>`; the stream ending is exhaustion and stopping
/// drops it.
pub struct StreamProducer<V> {
    stream: Option<BoxStream<'static, V>>,
}

impl<V: Send + 'static> StreamProducer<V> {
    /// Wraps a stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = V> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
        }
    }
}

#[async_trait]
impl<V: Send + 'static> Producer<V> for StreamProducer<V> {
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream.next().await),
            None => Ok(None),
        }
    }

    async fn stop(&mut self) {
        self.stream = None;
    }
}

/// Fallible stream-backed producer: the first `Err` item is a producer fault.
pub struct TryStreamProducer<V> {
    stream: Option<BoxStream<'static, Result<V, ProducerError>>>,
}

impl<V: Send + 'static> TryStreamProducer<V> {
    /// Wraps a stream of results.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<V, ProducerError>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
        }
    }
}

#[async_trait]
impl<V: Send + 'static> Producer<V> for TryStreamProducer<V> {
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await.transpose(),
            None => Ok(None),
        }
    }

    async fn stop(&mut self) {
        self.stream = None;
    }
}

/// How a pump loop ended.
#[derive(Debug)]
pub(crate) enum PumpExit {
    Stopped,
    Exhausted,
    Failed(ProducerError),
}

/// Drives one producer instance until stop, exhaustion or fault.
pub(crate) fn pump<V>(
    shared: Arc<Shared<V>>,
    mut producer: BoxProducer<V>,
    token: CancellationToken,
    generation: u64,
) -> impl Future<Output = ()> + Send + 'static
where
    V: Clone + Send + Sync + 'static,
{
    async move {
        let exit = loop {
            let step = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                next = AssertUnwindSafe(producer.next()).catch_unwind() => Some(next),
            };

            match step {
                None => {
                    producer.stop().await;
                    break PumpExit::Stopped;
                }
                Some(Ok(Ok(Some(value)))) => {
                    if token.is_cancelled() {
                        producer.stop().await;
                        break PumpExit::Stopped;
                    }
                    shared.deliver(&value);
                }
                Some(Ok(Ok(None))) => break PumpExit::Exhausted,
                Some(Ok(Err(err))) => break PumpExit::Failed(err),
                Some(Err(panic)) => {
                    break PumpExit::Failed(ProducerError::Panicked {
                        info: panic_message(&*panic),
                    });
                }
            }
        };

        shared.producer_finished(generation, exit);
    }
}
