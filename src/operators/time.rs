//! Temporal gating operators.
//!
//! All timing goes through `tokio::time`, so a paused test clock drives them
//! deterministically.
//!
//! | Operator      | Emits                                                        |
//! |---------------|--------------------------------------------------------------|
//! | `debounce(d)` | the latest value once `d` passed without a newer one         |
//! | `throttle(d)` | a value if nothing was emitted during the last `d`           |
//! | `audit(d)`    | a value, then closes a gate that a `d` timer reopens         |
//! | `sample(t)`   | the latest value on each trigger, if it is new               |
//! | `rate_limit`  | a value if fewer than `count` passed in the trailing window  |

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::time::{Instant, sleep, sleep_until};

use crate::channel::{Channel, ChannelStream, Producer};
use crate::error::ProducerError;

impl<V> Channel<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Emits the latest value once `period` elapses with no newer value.
    pub fn debounce(&self, period: Duration) -> Channel<V> {
        let upstream = self.clone();
        Channel::with_producer(move || Debounce {
            upstream: upstream.listen(),
            period,
            pending: None,
        })
    }

    /// Emits a value only if nothing was emitted during the last `period`.
    ///
    /// The first value passes immediately; suppressed values are dropped.
    pub fn throttle(&self, period: Duration) -> Channel<V> {
        let upstream = self.clone();
        Channel::with_producer(move || Throttle {
            upstream: upstream.listen(),
            period,
            last: None,
        })
    }

    /// Emits a value and ignores the following ones until a `period` timer
    /// reopens the gate.
    pub fn audit(&self, period: Duration) -> Channel<V> {
        let upstream = self.clone();
        Channel::with_producer(move || Audit {
            upstream: upstream.listen(),
            period,
            reopens_at: None,
        })
    }

    /// On every `trigger` value, emits the latest value if one arrived since
    /// the previous sample.
    pub fn sample<T>(&self, trigger: &Channel<T>) -> Channel<V>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (upstream, trigger) = (self.clone(), trigger.clone());
        Channel::with_producer(move || Sample {
            upstream: upstream.listen(),
            trigger: trigger.listen(),
            latest: None,
        })
    }

    /// Admits a value only if fewer than `count` were admitted during the
    /// trailing `window`.
    pub fn rate_limit(&self, count: usize, window: Duration) -> Channel<V> {
        let upstream = self.clone();
        Channel::with_producer(move || RateLimit {
            upstream: upstream.listen(),
            count,
            window,
            admitted: VecDeque::with_capacity(count),
        })
    }
}

struct Debounce<V> {
    upstream: ChannelStream<V>,
    period: Duration,
    pending: Option<V>,
}

#[async_trait]
impl<V> Producer<V> for Debounce<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        loop {
            if self.pending.is_none() {
                match self.upstream.next().await {
                    Some(value) => self.pending = Some(value),
                    None => return Ok(None),
                }
                continue;
            }

            tokio::select! {
                biased;
                next = self.upstream.next() => match next {
                    Some(value) => self.pending = Some(value),
                    None => return Ok(self.pending.take()),
                },
                _ = sleep(self.period) => {
                    // a value due at the deadline itself still restarts the wait
                    tokio::task::yield_now().await;
                    match self.upstream.next().now_or_never() {
                        Some(Some(value)) => self.pending = Some(value),
                        _ => return Ok(self.pending.take()),
                    }
                }
            }
        }
    }
}

struct Throttle<V> {
    upstream: ChannelStream<V>,
    period: Duration,
    last: Option<Instant>,
}

#[async_trait]
impl<V> Producer<V> for Throttle<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        while let Some(value) = self.upstream.next().await {
            let now = Instant::now();
            if self.last.is_none_or(|at| now.duration_since(at) >= self.period) {
                self.last = Some(now);
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

struct Audit<V> {
    upstream: ChannelStream<V>,
    period: Duration,
    reopens_at: Option<Instant>,
}

#[async_trait]
impl<V> Producer<V> for Audit<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        loop {
            match self.reopens_at {
                Some(deadline) => tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => self.reopens_at = None,
                    next = self.upstream.next() => {
                        if next.is_none() {
                            return Ok(None);
                        }
                    }
                },
                None => {
                    let Some(value) = self.upstream.next().await else {
                        return Ok(None);
                    };
                    self.reopens_at = Some(Instant::now() + self.period);
                    return Ok(Some(value));
                }
            }
        }
    }
}

struct Sample<V, T> {
    upstream: ChannelStream<V>,
    trigger: ChannelStream<T>,
    latest: Option<V>,
}

#[async_trait]
impl<V, T> Producer<V> for Sample<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        loop {
            tokio::select! {
                biased;
                next = self.upstream.next() => match next {
                    Some(value) => self.latest = Some(value),
                    None => return Ok(None),
                },
                tick = self.trigger.next() => {
                    if tick.is_none() {
                        return Ok(None);
                    }
                    if let Some(value) = self.latest.take() {
                        return Ok(Some(value));
                    }
                }
            }
        }
    }
}

struct RateLimit<V> {
    upstream: ChannelStream<V>,
    count: usize,
    window: Duration,
    /// Admission instants inside the trailing window, oldest first.
    admitted: VecDeque<Instant>,
}

#[async_trait]
impl<V> Producer<V> for RateLimit<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<V>, ProducerError> {
        while let Some(value) = self.upstream.next().await {
            let now = Instant::now();
            while self
                .admitted
                .front()
                .is_some_and(|at| now.duration_since(*at) >= self.window)
            {
                self.admitted.pop_front();
            }
            if self.admitted.len() < self.count {
                self.admitted.push_back(now);
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::testing::{record, settle};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_emits_after_silence() {
        let source = Channel::<u32>::new();
        let (seen, _sub) = record(&source.debounce(ms(100)));

        source.submit(1);
        sleep(ms(50)).await;
        source.submit(2);
        sleep(ms(100)).await; // t = 150
        source.submit(3);
        sleep(ms(150)).await; // t = 300

        assert_eq!(*seen.lock(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_separated_values_all_pass() {
        let source = Channel::<u32>::new();
        let (seen, _sub) = record(&source.debounce(ms(20)));

        source.submit(1);
        sleep(ms(50)).await;
        source.submit(2);
        sleep(ms(50)).await;

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_drops_inside_window() {
        let source = Channel::<u32>::new();
        let (seen, _sub) = record(&source.throttle(ms(100)));

        source.submit(1);
        sleep(ms(50)).await;
        source.submit(2);
        sleep(ms(70)).await; // t = 120
        source.submit(3);
        settle().await;

        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audit_reopens_on_timer() {
        let source = Channel::<u32>::new();
        let (seen, _sub) = record(&source.audit(ms(100)));

        source.submit(1);
        sleep(ms(50)).await;
        source.submit(2);
        sleep(ms(60)).await; // t = 110, gate reopened at 100
        source.submit(3);
        sleep(ms(20)).await;
        source.submit(4);
        settle().await;

        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_sample_emits_only_new_values() {
        let source = Channel::<u32>::new();
        let trigger = Channel::<()>::new();
        let (seen, _sub) = record(&source.sample(&trigger));

        source.submit_all([1, 2]);
        settle().await;
        trigger.submit(());
        settle().await;
        trigger.submit(());
        settle().await;
        source.submit(3);
        settle().await;
        trigger.submit(());
        settle().await;

        assert_eq!(*seen.lock(), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sliding_window() {
        let source = Channel::<u32>::new();
        let (seen, _sub) = record(&source.rate_limit(2, ms(100)));

        source.submit(1);
        sleep(ms(10)).await;
        source.submit(2);
        sleep(ms(10)).await;
        source.submit(3); // t = 20, window full
        sleep(ms(80)).await;
        source.submit(4); // t = 100, first admission left the window
        sleep(ms(5)).await;
        source.submit(5); // t = 105, window holds 10 and 100
        settle().await;

        assert_eq!(*seen.lock(), vec![1, 2, 4]);
    }
}
