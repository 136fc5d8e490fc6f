//! # Bounded replaying cache.
//!
//! [`Cache`] mirrors the recent values of an upstream [`Channel`] under an
//! optional size limit and an optional time-to-live, replays them to late
//! subscribers, and reports every limit-driven removal on
//! [`evicted`](Cache::evicted).
//!
//! ## Architecture
//! ```text
//! upstream.submit(v) ──► Cache::insert(v)          (under the delivery gate)
//!                          ├─► push (v, now, id); spawn TTL timer (if ttl)
//!                          ├─► len > size? ──► pop oldest/newest, abort its timer
//!                          │                   └─► evicted.submit(Eviction{_, Size})
//!                          └─► output.submit(v)
//!
//! timer(id) fires ──► remove id (if present) ──► evicted.submit(Eviction{_, Ttl})
//!
//! output.subscribe(cb) ──► gate ──► register cb ──► cb(each cached value) ──► live values
//! ```
//!
//! ## Rules
//! - The cache subscribes to its upstream when created and keeps retaining
//!   values without downstream subscribers.
//! - Subscribers of [`Cache::channel`] keep the cache alive; once every handle
//!   is dropped and no subscriber remains, it unsubscribes from upstream.
//! - Replay is atomic with registration: no live value is delivered between
//!   the snapshot and the registration.
//! - Reads prune entries past their TTL even if their timer has not run yet.
//! - [`Cache::clear`] aborts timers and never reports evictions; it is safe to
//!   call from an eviction handler.
//! - TTL timers need a tokio runtime; without one, expiry happens on read.

mod eviction;

pub use eviction::{DropStrategy, Eviction, EvictionReason};

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::channel::{Channel, ChannelStream, ReplaySource, Scope, Subscription, WeakChannel};
use crate::config::CacheConfig;

/// One retained value.
struct Entry<V> {
    id: u64,
    value: V,
    inserted_at: Instant,
    timer: Option<AbortHandle>,
}

impl<V> Entry<V> {
    fn disarm(&self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

struct Inner<V> {
    entries: Mutex<VecDeque<Entry<V>>>,
    next_id: AtomicU64,
    /// Shared with the output channel's replay path.
    gate: Arc<ReentrantMutex<()>>,
    size: Option<usize>,
    ttl: Option<Duration>,
    drop_strategy: DropStrategy,
    /// The output channel owns this state, so it is only referenced weakly here.
    output: OnceLock<WeakChannel<V>>,
    evicted: Channel<Eviction<V>>,
    upstream: Mutex<Option<Subscription>>,
}

/// Size- and time-limited view of a channel's recent values.
///
/// Cloning is cheap; clones share the same entries.
///
/// # Example
/// ```
/// use conflux::{CacheConfig, Channel};
///
/// let source = Channel::<u32>::new();
/// let cache = source.cache(CacheConfig::default().with_size(2));
///
/// source.submit_all([1, 2, 3, 4]);
/// assert_eq!(cache.values(), vec![3, 4]);
///
/// let late = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
/// let sink = late.clone();
/// let _sub = cache.subscribe(move |v| sink.lock().unwrap().push(*v));
/// assert_eq!(*late.lock().unwrap(), vec![3, 4]);
/// ```
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
    output: Channel<V>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            output: self.output.clone(),
        }
    }
}

impl<V> Channel<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Mirrors this channel into a [`Cache`] configured by `config`.
    pub fn cache(&self, config: CacheConfig<V>) -> Cache<V> {
        let cache = Cache::new(&config);
        for value in config.initial_values {
            cache.inner.insert(value);
        }

        let weak = Arc::downgrade(&cache.inner);
        let subscription = self.subscribe_with(
            move |value: &V| {
                if let Some(inner) = weak.upgrade() {
                    inner.insert(value.clone());
                }
            },
            Scope::liveness(&cache.inner),
        );
        *cache.inner.upstream.lock() = Some(subscription);
        cache
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new(config: &CacheConfig<V>) -> Self {
        let inner = Arc::new(Inner {
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
            gate: Arc::new(ReentrantMutex::new(())),
            size: config.size,
            ttl: config.effective_ttl(),
            drop_strategy: config.drop_strategy,
            output: OnceLock::new(),
            evicted: Channel::new(),
            upstream: Mutex::new(None),
        });

        let source = Arc::clone(&inner);
        let output = Channel::with_replay(ReplaySource {
            gate: Arc::clone(&inner.gate),
            snapshot: Box::new(move || source.values()),
        });
        // freshly created, so the slot is empty
        let _ = inner.output.set(output.downgrade());

        Self { inner, output }
    }

    /// Returns the retained values in insertion order.
    pub fn values(&self) -> Vec<V> {
        self.inner.values()
    }

    /// Number of retained values, after pruning expired ones.
    pub fn len(&self) -> usize {
        self.inner.prune();
        self.inner.entries.lock().len()
    }

    /// Returns `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured size limit.
    pub fn size(&self) -> Option<usize> {
        self.inner.size
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Option<Duration> {
        self.inner.ttl
    }

    /// Configured overflow strategy.
    pub fn drop_strategy(&self) -> DropStrategy {
        self.inner.drop_strategy
    }

    /// Empties the cache and aborts pending TTL timers without reporting evictions.
    pub fn clear(&self) {
        let drained: Vec<Entry<V>> = self.inner.entries.lock().drain(..).collect();
        for entry in &drained {
            entry.disarm();
        }
        tracing::trace!(cleared = drained.len(), "cache cleared");
    }

    /// Channel of size- and TTL-driven removals.
    pub fn evicted(&self) -> Channel<Eviction<V>> {
        self.inner.evicted.clone()
    }

    /// Replaying output channel: cached values first, then live values.
    ///
    /// The channel keeps the cache alive, so it stays fed after every
    /// [`Cache`] handle is dropped.
    pub fn channel(&self) -> Channel<V> {
        self.output.clone()
    }

    /// Shorthand for `self.channel().subscribe(callback)`.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.output.subscribe(callback)
    }

    /// Pull view over the replaying output.
    pub fn stream(&self) -> ChannelStream<V> {
        self.output.stream()
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn insert(self: &Arc<Self>, value: V) {
        let _gate = self.gate.lock();

        let overflow = {
            let mut entries = self.entries.lock();
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let inserted_at = Instant::now();
            let timer = self
                .expires_at(inserted_at)
                .and_then(|deadline| self.schedule_expiry(id, deadline));
            entries.push_back(Entry {
                id,
                value: value.clone(),
                inserted_at,
                timer,
            });

            match self.size {
                Some(size) if entries.len() > size => match self.drop_strategy {
                    DropStrategy::Oldest => entries.pop_front(),
                    DropStrategy::Newest => entries.pop_back(),
                },
                _ => None,
            }
        };

        if let Some(entry) = overflow {
            entry.disarm();
            self.evicted.submit(Eviction::size(entry.value));
        }
        if let Some(output) = self.output.get().and_then(WeakChannel::upgrade) {
            output.submit(value);
        }
    }

    /// Expiry instant of an entry; `None` when there is no TTL or it lies beyond `Instant`'s range.
    fn expires_at(&self, inserted_at: Instant) -> Option<Instant> {
        self.ttl.and_then(|ttl| inserted_at.checked_add(ttl))
    }

    fn schedule_expiry(self: &Arc<Self>, id: u64, deadline: Instant) -> Option<AbortHandle> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(id);
            }
        });
        Some(task.abort_handle())
    }

    fn expire(&self, id: u64) {
        let removed = {
            let mut entries = self.entries.lock();
            entries
                .iter()
                .position(|e| e.id == id)
                .and_then(|idx| entries.remove(idx))
        };
        if let Some(entry) = removed {
            self.evicted.submit(Eviction::ttl(entry.value));
        }
    }

    /// Removes entries past their TTL and reports them.
    fn prune(&self) {
        if self.ttl.is_none() {
            return;
        }
        let now = Instant::now();
        let expired: Vec<Entry<V>> = {
            let mut entries = self.entries.lock();
            let mut expired = Vec::new();
            // insertion order keeps `inserted_at` non-decreasing
            while entries
                .front()
                .and_then(|e| self.expires_at(e.inserted_at))
                .is_some_and(|deadline| deadline <= now)
            {
                if let Some(entry) = entries.pop_front() {
                    expired.push(entry);
                }
            }
            expired
        };
        for entry in expired {
            entry.disarm();
            self.evicted.submit(Eviction::ttl(entry.value));
        }
    }

    fn values(&self) -> Vec<V> {
        self.prune();
        self.entries.lock().iter().map(|e| e.value.clone()).collect()
    }
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        if let Some(subscription) = self.upstream.get_mut().take() {
            subscription.cancel();
        }
        for entry in self.entries.get_mut().drain(..) {
            entry.disarm();
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.inner.entries.lock().len())
            .field("size", &self.inner.size)
            .field("ttl", &self.inner.ttl)
            .field("drop_strategy", &self.inner.drop_strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recorder<V: Clone + Send + Sync + 'static>(
        ch: &Channel<V>,
    ) -> (Arc<Mutex<Vec<V>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = ch.subscribe(move |v: &V| sink.lock().push(v.clone()));
        (seen, sub)
    }

    #[test]
    fn test_size_eviction_drops_oldest() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_size(2));
        let (evicted, _sub) = recorder(&cache.evicted());

        source.submit_all([1, 2, 3, 4]);
        assert_eq!(cache.values(), vec![3, 4]);
        assert_eq!(
            *evicted.lock(),
            vec![Eviction::size(1), Eviction::size(2)]
        );
    }

    #[test]
    fn test_newest_strategy_keeps_first_values_and_forwards_live() {
        let source = Channel::<u32>::new();
        let cache = source.cache(
            CacheConfig::default()
                .with_size(2)
                .with_drop_strategy(DropStrategy::Newest),
        );
        let (evicted, _e) = recorder(&cache.evicted());
        let (live, _l) = recorder(&cache.channel());

        source.submit_all([1, 2, 3]);
        assert_eq!(cache.values(), vec![1, 2]);
        assert_eq!(*evicted.lock(), vec![Eviction::size(3)]);
        assert_eq!(*live.lock(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_timeline() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_ttl(Duration::from_millis(50)));
        let (evicted, _sub) = recorder(&cache.evicted());

        source.submit(1);
        sleep(Duration::from_millis(30)).await;
        source.submit(2);

        sleep(Duration::from_millis(40)).await; // t = 70
        assert_eq!(cache.values(), vec![2]);

        sleep(Duration::from_millis(40)).await; // t = 110
        assert_eq!(cache.values(), Vec::<u32>::new());
        assert_eq!(*evicted.lock(), vec![Eviction::ttl(1), Eviction::ttl(2)]);
    }

    #[test]
    fn test_ttl_prunes_on_read_without_runtime() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_ttl(Duration::from_millis(1)));
        source.submit(1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_eviction_aborts_ttl_timer() {
        let source = Channel::<u32>::new();
        let cache = source.cache(
            CacheConfig::default()
                .with_size(1)
                .with_ttl(Duration::from_millis(50)),
        );
        let (evicted, _sub) = recorder(&cache.evicted());

        source.submit_all([1, 2]);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(*evicted.lock(), vec![Eviction::size(1), Eviction::ttl(2)]);
    }

    #[test]
    fn test_late_subscriber_gets_replay_then_live() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_size(5));
        source.submit_all([1, 2, 3]);

        let (seen, _sub) = recorder(&cache.channel());
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        source.submit(4);
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_live_value_submitted_during_replay_follows_replay() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_size(3));
        source.submit_all([1, 2, 3]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, upstream) = (Arc::clone(&seen), source.clone());
        let _sub = cache.subscribe(move |v: &u32| {
            sink.lock().push(*v);
            if *v == 1 {
                upstream.submit(99);
            }
        });

        assert_eq!(*seen.lock(), vec![1, 2, 3, 99]);
        assert_eq!(cache.values(), vec![2, 3, 99]);
    }

    #[test]
    fn test_output_channel_outlives_cache_handle() {
        let source = Channel::<u32>::new();
        let output = source.cache(CacheConfig::default().with_size(3)).channel();
        let (seen, _sub) = recorder(&output);

        source.submit_all([1, 2, 3]);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(source.subscriber_count(), 1);
    }

    #[test]
    fn test_subscription_keeps_cache_until_cancelled() {
        let source = Channel::<u32>::new();
        let (seen, sub) = recorder(&source.cache(CacheConfig::default()).channel());

        source.submit(1);
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(source.subscriber_count(), 1);

        sub.cancel();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_ttl(Duration::MAX));
        let (evicted, _sub) = recorder(&cache.evicted());

        source.submit(1);
        sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(cache.values(), vec![1]);
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn test_subscribe_during_delivery_has_no_duplicates() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default());
        let output = cache.channel();

        let late = Arc::new(Mutex::new(Vec::new()));
        let late_sub = Arc::new(Mutex::new(None::<Subscription>));
        let (slot, sink, out) = (Arc::clone(&late_sub), Arc::clone(&late), output.clone());
        let _trigger = output.subscribe(move |v: &u32| {
            if *v == 2 && slot.lock().is_none() {
                let sink = Arc::clone(&sink);
                *slot.lock() = Some(out.subscribe(move |v: &u32| sink.lock().push(*v)));
            }
        });

        source.submit_all([1, 2, 3]);
        assert_eq!(*late.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clear_is_silent_and_reentrant() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_size(1));
        let (evicted, _e) = recorder(&cache.evicted());

        let handle = cache.clone();
        let clearing = cache.evicted().subscribe(move |_| handle.clear());

        source.submit_all([1, 2]);
        assert!(cache.is_empty());
        assert_eq!(*evicted.lock(), vec![Eviction::size(1)]);
        clearing.cancel();

        source.submit(3);
        cache.clear();
        assert!(cache.values().is_empty());
        assert_eq!(evicted.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_aborts_pending_timers() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default().with_ttl(Duration::from_millis(50)));
        let (evicted, _sub) = recorder(&cache.evicted());

        source.submit(1);
        cache.clear();
        sleep(Duration::from_millis(60)).await;
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn test_initial_values_are_seeded_and_bounded() {
        let source = Channel::<u32>::new();
        let cache = source.cache(
            CacheConfig::default()
                .with_size(2)
                .with_initial_values([1, 2, 3]),
        );
        assert_eq!(cache.values(), vec![2, 3]);

        let (seen, _sub) = recorder(&cache.channel());
        assert_eq!(*seen.lock(), vec![2, 3]);
    }

    #[test]
    fn test_dropping_cache_unsubscribes_upstream() {
        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default());
        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(cache.size(), None);
        assert_eq!(cache.drop_strategy(), DropStrategy::Oldest);

        drop(cache);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_replays_cached_values() {
        use futures::StreamExt;

        let source = Channel::<u32>::new();
        let cache = source.cache(CacheConfig::default());
        source.submit_all([7, 8]);

        let mut stream = cache.stream();
        assert_eq!(stream.next().await, Some(7));
        assert_eq!(stream.next().await, Some(8));
    }
}
