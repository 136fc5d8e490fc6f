//! # Ordered concurrency executor.
//!
//! Drives an async per-value function over an input stream under one of three
//! [`Strategy`] contracts and yields the emitted results.
//!
//! ## Architecture
//! ```text
//! Sequential:          input ──► then(f) ──────────────────────────────► results (input order)
//! ConcurrentOrdered:   input ──► map(spawn(f)) ──► buffered(limit) ────► results (input order)
//! ConcurrentUnordered: input ──► map(spawn(f)) ──► buffer_unordered ───► results (completion order)
//!
//! results ──► fault? ──► report TransformFailed ──► Stop (ordered) / Skip (unordered)
//!         ──► take_while(!Stop) ──► filter_map(Emit)
//! ```
//!
//! ## Rules
//! - Concurrent strategies start each computation as soon as its input arrives
//!   (bounded by [`StageConfig::max_concurrent`] when set).
//! - Dropping the output does not abort computations already in flight; their
//!   results are discarded.
//! - Pending results are buffered without bound.

mod strategy;

pub use strategy::{Step, Strategy};

use std::fmt::Display;
use std::future::{self, Future};
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};

use crate::config::StageConfig;
use crate::error::{StageError, panic_message};
use crate::events::{Event, EventKind, Reporter};

/// Runs `f` over `input` under `config.strategy`; faults are reported through `reporter`.
pub(crate) fn execute<S, V, U, E, F, Fut>(
    input: S,
    config: StageConfig,
    reporter: Reporter,
    f: F,
) -> BoxStream<'static, U>
where
    S: Stream<Item = V> + Send + 'static,
    V: Send + 'static,
    U: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Step<U>, E>> + Send + 'static,
{
    let limit = config.concurrency_limit().unwrap_or(usize::MAX);
    let strategy = config.strategy;

    let outcomes: BoxStream<'static, Result<Step<U>, StageError>> = match strategy {
        Strategy::Sequential => input
            .then(move |value| {
                let started = start(&f, value);
                async move {
                    match started {
                        Ok(fut) => settle(fut).await,
                        Err(err) => Err(err),
                    }
                }
            })
            .boxed(),
        Strategy::ConcurrentOrdered => input
            .map(move |value| spawn(&f, value))
            .buffered(limit)
            .boxed(),
        Strategy::ConcurrentUnordered => input
            .map(move |value| spawn(&f, value))
            .buffer_unordered(limit)
            .boxed(),
    };

    outcomes
        .map(move |outcome| match outcome {
            Ok(step) => step,
            Err(err) => {
                reporter.fault(
                    Event::new(EventKind::TransformFailed)
                        .with_reason(format!("{}: {}", err.as_label(), err.as_message())),
                );
                if strategy.preserves_order() {
                    Step::Stop
                } else {
                    Step::Skip
                }
            }
        })
        .take_while(|step| future::ready(!step.is_stop()))
        .filter_map(|step| future::ready(step.into_value()))
        .boxed()
}

/// Calls `f`, catching a panic raised before the future exists.
fn start<V, F, Fut>(f: &F, value: V) -> Result<Fut, StageError>
where
    F: Fn(V) -> Fut,
{
    catch_unwind(AssertUnwindSafe(|| f(value))).map_err(|panic| StageError::Panicked {
        info: panic_message(&*panic),
    })
}

/// Awaits one computation, converting errors and panics into [`StageError`].
async fn settle<U, E, Fut>(fut: Fut) -> Result<Step<U>, StageError>
where
    E: Display,
    Fut: Future<Output = Result<Step<U>, E>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(step)) => Ok(step),
        Ok(Err(err)) => Err(StageError::failed(err)),
        Err(panic) => Err(StageError::Panicked {
            info: panic_message(&*panic),
        }),
    }
}

/// Starts a computation on the runtime immediately and returns its completion.
fn spawn<V, U, E, F, Fut>(
    f: &F,
    value: V,
) -> impl Future<Output = Result<Step<U>, StageError>> + Send + 'static + use<V, U, E, F, Fut>
where
    U: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(V) -> Fut,
    Fut: Future<Output = Result<Step<U>, E>> + Send + 'static,
{
    let handle = start(f, value).map(|fut| tokio::spawn(settle(fut)));
    async move {
        match handle?.await {
            Ok(outcome) => outcome,
            Err(join) if join.is_panic() => Err(StageError::Panicked {
                info: panic_message(&*join.into_panic()),
            }),
            Err(_) => Err(StageError::Canceled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::stream;
    use tokio::time::{Instant, sleep};

    use crate::Channel;

    const DELAYS: [u64; 3] = [30, 10, 20];

    async fn run_scenario(config: StageConfig) -> Vec<(u32, u64)> {
        let started = Instant::now();
        let out = execute(
            stream::iter(vec![1u32, 2, 3]),
            config,
            Channel::<u32>::new().reporter(),
            |v: u32| async move {
                sleep(Duration::from_millis(DELAYS[(v - 1) as usize])).await;
                Ok::<_, Infallible>(Step::Emit(v * 10))
            },
        );
        out.map(|r| (r, started.elapsed().as_millis() as u64))
            .collect()
            .await
    }

    fn assert_timeline(got: &[(u32, u64)], want: &[(u32, u64)]) {
        let values: Vec<u32> = got.iter().map(|(v, _)| *v).collect();
        let expected: Vec<u32> = want.iter().map(|(v, _)| *v).collect();
        assert_eq!(values, expected);
        for ((_, at), (_, due)) in got.iter().zip(want) {
            assert!(
                *at >= *due && *at <= due + 2,
                "emitted at {at}ms, expected ~{due}ms ({got:?})"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_timeline() {
        let got = run_scenario(StageConfig::new(Strategy::Sequential)).await;
        assert_timeline(&got, &[(10, 30), (20, 40), (30, 60)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ordered_timeline() {
        let got = run_scenario(StageConfig::new(Strategy::ConcurrentOrdered)).await;
        assert_timeline(&got, &[(10, 30), (20, 30), (30, 30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_unordered_timeline() {
        let got = run_scenario(StageConfig::new(Strategy::ConcurrentUnordered)).await;
        assert_timeline(&got, &[(20, 10), (30, 20), (10, 30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordered_limit_one_serializes() {
        let config = StageConfig::new(Strategy::ConcurrentOrdered).with_max_concurrent(1);
        let got = run_scenario(config).await;
        assert_timeline(&got, &[(10, 30), (20, 40), (30, 60)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordered_release_for_adversarial_timings() {
        // later inputs finish first
        let input: Vec<u64> = (1..=8).collect();
        let out: Vec<u64> = execute(
            stream::iter(input.clone()),
            StageConfig::new(Strategy::ConcurrentOrdered),
            Channel::<u64>::new().reporter(),
            |v: u64| async move {
                sleep(Duration::from_millis(100 - v * 10)).await;
                Ok::<_, Infallible>(Step::Emit(v))
            },
        )
        .collect()
        .await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_stop_closes_sequential_stage() {
        let out: Vec<u32> = execute(
            stream::iter(vec![1u32, 2, 3, 4]),
            StageConfig::default(),
            Channel::<u32>::new().reporter(),
            |v: u32| async move {
                Ok::<_, Infallible>(if v == 3 { Step::Stop } else { Step::Emit(v) })
            },
        )
        .collect()
        .await;
        assert_eq!(out, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unordered_stop_closes_when_dequeued() {
        let out: Vec<u32> = execute(
            stream::iter(vec![1u32, 2, 3]),
            StageConfig::new(Strategy::ConcurrentUnordered),
            Channel::<u32>::new().reporter(),
            |v: u32| async move {
                // 1 stops late, 2 finishes before it, 3 after it
                let delay = [20u64, 10, 30][(v - 1) as usize];
                sleep(Duration::from_millis(delay)).await;
                Ok::<_, Infallible>(if v == 1 { Step::Stop } else { Step::Emit(v) })
            },
        )
        .collect()
        .await;
        assert_eq!(out, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_ordered_stage() {
        let out: Vec<u32> = execute(
            stream::iter(vec![1u32, 2, 3]),
            StageConfig::new(Strategy::ConcurrentOrdered),
            Channel::<u32>::new().reporter(),
            |v: u32| async move {
                // 3 completes first but comes after the stop
                let delay = [20u64, 30, 5][(v - 1) as usize];
                sleep(Duration::from_millis(delay)).await;
                Ok::<_, Infallible>(if v == 2 { Step::Stop } else { Step::Emit(v) })
            },
        )
        .collect()
        .await;
        assert_eq!(out, vec![1]);
    }

    #[tokio::test]
    async fn test_fault_stops_ordered_and_is_reported() {
        let ch = Channel::<u32>::new();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = ch.events().subscribe(move |e: &Event| sink.lock().push(e.clone()));

        let out: Vec<u32> = execute(
            stream::iter(vec![1u32, 2, 3]),
            StageConfig::new(Strategy::ConcurrentOrdered),
            ch.reporter(),
            |v: u32| async move {
                if v == 2 {
                    Err("bad input")
                } else {
                    Ok(Step::Emit(v))
                }
            },
        )
        .collect()
        .await;
        assert_eq!(out, vec![1]);

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::TransformFailed);
        assert_eq!(
            events[0].reason.as_deref(),
            Some("stage_failed: error: bad input")
        );
    }

    #[tokio::test]
    async fn test_fault_skips_unordered() {
        let mut out: Vec<u32> = execute(
            stream::iter(vec![1u32, 2, 3]),
            StageConfig::new(Strategy::ConcurrentUnordered),
            Channel::<u32>::new().reporter(),
            |v: u32| async move {
                if v == 2 {
                    panic!("worker blew up");
                }
                Ok::<_, Infallible>(Step::Emit(v))
            },
        )
        .collect()
        .await;
        out.sort_unstable();
        assert_eq!(out, vec![1, 3]);
    }
}
