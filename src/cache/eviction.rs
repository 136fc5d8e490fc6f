//! Eviction records and the overflow drop strategy.

use std::fmt;

/// Which entry a full cache drops on insertion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DropStrategy {
    /// Drop the earliest retained entry.
    #[default]
    Oldest,
    /// Drop the entry that was just appended.
    Newest,
}

/// Why an entry left the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// The size limit was exceeded.
    Size,
    /// The entry outlived its time-to-live.
    Ttl,
}

impl EvictionReason {
    /// Stable snake_case label.
    pub fn as_label(self) -> &'static str {
        match self {
            EvictionReason::Size => "size",
            EvictionReason::Ttl => "ttl",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// An entry removed by the size or TTL limit.
///
/// Explicit [`Cache::clear`](super::Cache::clear) never produces one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eviction<V> {
    pub value: V,
    pub reason: EvictionReason,
}

impl<V> Eviction<V> {
    pub(crate) fn size(value: V) -> Self {
        Self {
            value,
            reason: EvictionReason::Size,
        }
    }

    pub(crate) fn ttl(value: V) -> Self {
        Self {
            value,
            reason: EvictionReason::Ttl,
        }
    }
}
