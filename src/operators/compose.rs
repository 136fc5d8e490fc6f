//! Value-wise composition and async transform stages.

use std::fmt::Display;
use std::future::{self, Future};
use std::sync::Arc;

use futures::StreamExt;

use crate::channel::{Channel, StreamProducer};
use crate::config::StageConfig;
use crate::executor::{Step, execute};
use crate::offload::Worker;

impl<V> Channel<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Transforms every value with `f`.
    pub fn map<U, F>(&self, f: F) -> Channel<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&V) -> U + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Channel::from_stream(move || {
            let f = Arc::clone(&f);
            upstream.listen().map(move |value| f(&value))
        })
    }

    /// Forwards the values for which `predicate` holds.
    pub fn filter<F>(&self, predicate: F) -> Channel<V>
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let predicate = Arc::new(predicate);
        Channel::from_stream(move || {
            let predicate = Arc::clone(&predicate);
            upstream
                .listen()
                .filter(move |value| future::ready(predicate(value)))
        })
    }

    /// Interleaves the values of `self` and `other`.
    ///
    /// Order is kept per source; interleaving between sources follows scheduling.
    pub fn merge(&self, other: &Channel<V>) -> Channel<V> {
        let (left, right) = (self.clone(), other.clone());
        Channel::from_stream(move || futures::stream::select(left.listen(), right.listen()))
    }

    /// Runs a fallible async step per value under `config.strategy`.
    ///
    /// A fault (`Err` or panic) is published as
    /// [`TransformFailed`](crate::EventKind::TransformFailed) on the returned
    /// channel's [`events`](Channel::events). Ordered strategies close the
    /// stage on a fault or [`Step::Stop`]; the unordered strategy drops the
    /// faulting value.
    ///
    /// # Example
    /// ```
    /// use conflux::{Channel, StageConfig, Step, Strategy};
    ///
    /// let source = Channel::<u32>::new();
    /// let evens = source.stage(StageConfig::new(Strategy::ConcurrentOrdered), |v: u32| async move {
    ///     Ok::<_, std::convert::Infallible>(if v % 2 == 0 { Step::Emit(v) } else { Step::Skip })
    /// });
    /// # let _ = evens;
    /// ```
    pub fn stage<U, E, F, Fut>(&self, config: StageConfig, f: F) -> Channel<U>
    where
        U: Clone + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Step<U>, E>> + Send + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Channel::with_reporting_producer(move |reporter| {
            let f = Arc::clone(&f);
            StreamProducer::new(execute(upstream.listen(), config, reporter, move |value| {
                f(value)
            }))
        })
    }

    /// Maps every value through an async function.
    pub fn map_async<U, E, F, Fut>(&self, config: StageConfig, f: F) -> Channel<U>
    where
        U: Clone + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
    {
        self.stage(config, move |value| {
            let fut = f(value);
            async move { fut.await.map(Step::Emit) }
        })
    }

    /// Forwards the values for which the async `predicate` resolves to `true`.
    pub fn filter_async<E, F, Fut>(&self, config: StageConfig, predicate: F) -> Channel<V>
    where
        E: Display + Send + 'static,
        F: Fn(&V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
    {
        self.stage(config, move |value: V| {
            let keep = predicate(&value);
            async move {
                match keep.await {
                    Ok(true) => Ok(Step::Emit(value)),
                    Ok(false) => Ok(Step::Skip),
                    Err(err) => Err(err),
                }
            }
        })
    }

    /// Maps every value through `worker`, typically off the async threads.
    pub fn map_offload<U, W>(&self, config: StageConfig, worker: Arc<W>) -> Channel<U>
    where
        U: Clone + Send + Sync + 'static,
        W: Worker<V, U>,
    {
        self.stage(config, move |value| {
            let worker = Arc::clone(&worker);
            async move { worker.execute(value).await.map(Step::Emit) }
        })
    }
}
