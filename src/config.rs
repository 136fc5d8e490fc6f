//! # Operator configuration.
//!
//! [`CacheConfig`] shapes a [`Cache`](crate::Cache): size limit, time-to-live,
//! overflow drop strategy, and seed values.
//! [`StageConfig`] shapes an async transform stage: ordering strategy and
//! concurrency limit.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use conflux::{CacheConfig, DropStrategy, StageConfig, Strategy};
//!
//! let cache = CacheConfig::<u32>::default()
//!     .with_size(2)
//!     .with_ttl(Duration::from_millis(50))
//!     .with_drop_strategy(DropStrategy::Newest);
//! assert_eq!(cache.size, Some(2));
//!
//! let mut stage = StageConfig::default();
//! stage.strategy = Strategy::ConcurrentOrdered;
//! stage.max_concurrent = 4;
//! assert_eq!(stage.concurrency_limit(), Some(4));
//! ```

use std::time::Duration;

use crate::cache::DropStrategy;
use crate::executor::Strategy;

/// Configuration of a [`Cache`](crate::Cache).
#[derive(Clone, Debug)]
pub struct CacheConfig<V> {
    /// Maximum number of retained entries (`None` = unbounded).
    pub size: Option<usize>,
    /// Maximum age of a retained entry (`None` = never expires).
    pub ttl: Option<Duration>,
    /// Which entry to drop when `size` is exceeded.
    pub drop_strategy: DropStrategy,
    /// Values inserted at construction, in order, before any upstream value.
    pub initial_values: Vec<V>,
}

impl<V> Default for CacheConfig<V> {
    /// Provides an unbounded, non-expiring configuration:
    /// - `size = None`
    /// - `ttl = None`
    /// - `drop_strategy = DropStrategy::Oldest`
    /// - `initial_values = []`
    fn default() -> Self {
        Self {
            size: None,
            ttl: None,
            drop_strategy: DropStrategy::default(),
            initial_values: Vec::new(),
        }
    }
}

impl<V> CacheConfig<V> {
    /// Sets the size limit.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the time-to-live of each entry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets which entry is evicted when the size limit is exceeded.
    pub fn with_drop_strategy(mut self, strategy: DropStrategy) -> Self {
        self.drop_strategy = strategy;
        self
    }

    /// Seeds the cache.
    pub fn with_initial_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
    {
        self.initial_values = values.into_iter().collect();
        self
    }

    /// Returns the TTL, treating a zero duration as "no expiry".
    pub(crate) fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|ttl| !ttl.is_zero())
    }
}

/// Configuration of an async transform stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageConfig {
    /// Ordering contract of the stage.
    pub strategy: Strategy,
    /// Maximum computations in flight (0 = unlimited).
    ///
    /// Ignored by [`Strategy::Sequential`], which never runs more than one.
    pub max_concurrent: usize,
}

impl StageConfig {
    /// Creates a configuration with the given strategy and no concurrency cap.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            max_concurrent: 0,
        }
    }

    /// Caps in-flight computations; `0` means unlimited.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Returns the concurrency limit as `Option` (0 → `None`).
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_defaults_are_sequential_and_unbounded() {
        let cfg = StageConfig::default();
        assert_eq!(cfg.strategy, Strategy::Sequential);
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(
            StageConfig::new(Strategy::ConcurrentUnordered)
                .with_max_concurrent(3)
                .concurrency_limit(),
            Some(3)
        );
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let cfg = CacheConfig::<u8>::default().with_ttl(Duration::ZERO);
        assert_eq!(cfg.effective_ttl(), None);
        assert_eq!(cfg.drop_strategy, DropStrategy::Oldest);
    }
}
