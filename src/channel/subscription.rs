//! # Subscription handles, scopes and liveness probes.
//!
//! A [`Subscription`] is returned by every `subscribe*` call on a
//! [`Channel`](crate::Channel). It is owned exclusively by the caller and
//! cancelling it is idempotent.
//!
//! ## Scopes
//! A registration may be tied to a [`Scope`]:
//! - [`Scope::None`]: lives until [`Subscription::cancel`] (default)
//! - [`Scope::Token`]: auto-cancels when the [`CancellationToken`] fires
//! - [`Scope::Liveness`]: auto-cancels once the [`LivenessProbe`] reports the
//!   scope gone (checked at delivery time and by [`Channel::prune`](crate::Channel::prune))
//!
//! ## Rules
//! - Dropping a `Subscription` does **not** cancel it; use [`Subscription::guard`]
//!   for cancel-on-drop.
//! - An already-cancelled token or dead probe yields a pre-cancelled subscription.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

/// Global counter for subscription ids.
static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Registry key of a subscription, unique per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Best-effort detection that the owner of a subscription is gone.
///
/// Implemented for [`std::sync::Weak`]: the scope is alive while a strong
/// reference exists.
pub trait LivenessProbe: Send + Sync + 'static {
    /// Returns `false` once the observed scope is unreachable.
    fn is_alive(&self) -> bool;
}

impl<T: Send + Sync + 'static> LivenessProbe for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Lifetime scope of a registration.
#[derive(Clone, Default)]
pub enum Scope {
    /// Explicit ownership: lives until cancelled.
    #[default]
    None,
    /// Cancelled together with the token.
    Token(CancellationToken),
    /// Cancelled once the probe reports the scope gone.
    Liveness(Arc<dyn LivenessProbe>),
}

impl Scope {
    /// Ties a registration to the liveness of `owner`.
    pub fn liveness<T: Send + Sync + 'static>(owner: &Arc<T>) -> Self {
        Scope::Liveness(Arc::new(Arc::downgrade(owner)))
    }

    /// Returns `true` while the scope still permits delivery.
    pub fn is_alive(&self) -> bool {
        match self {
            Scope::None => true,
            Scope::Token(token) => !token.is_cancelled(),
            Scope::Liveness(probe) => probe.is_alive(),
        }
    }

    /// Identity comparison used to detect re-registration.
    ///
    /// Tokens carry no identity, so two token scopes are never identical.
    pub(crate) fn same(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::None, Scope::None) => true,
            (Scope::Liveness(a), Scope::Liveness(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::None => f.write_str("Scope::None"),
            Scope::Token(token) => f
                .debug_tuple("Scope::Token")
                .field(&token.is_cancelled())
                .finish(),
            Scope::Liveness(probe) => f
                .debug_tuple("Scope::Liveness")
                .field(&probe.is_alive())
                .finish(),
        }
    }
}

/// Removes a registration from its owning channel.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: SubscriptionId);
}

/// Shared cancellation state of one registration.
pub(crate) struct SubscriptionState {
    id: SubscriptionId,
    cancelled: AtomicBool,
    /// Fires on cancel; lets token watchers exit.
    closed: CancellationToken,
    owner: Option<Weak<dyn Detach>>,
}

impl SubscriptionState {
    pub(crate) fn new(id: SubscriptionId, owner: Weak<dyn Detach>) -> Arc<Self> {
        Arc::new(Self {
            id,
            cancelled: AtomicBool::new(false),
            closed: CancellationToken::new(),
            owner: Some(owner),
        })
    }

    fn cancelled(id: SubscriptionId) -> Arc<Self> {
        let closed = CancellationToken::new();
        closed.cancel();
        Arc::new(Self {
            id,
            cancelled: AtomicBool::new(true),
            closed,
            owner: None,
        })
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Marks the registration cancelled without touching the registry.
    ///
    /// Returns `true` if this call performed the transition.
    pub(crate) fn mark_cancelled(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.closed.cancel();
        }
        first
    }

    pub(crate) fn cancel(&self) {
        if !self.mark_cancelled() {
            return;
        }
        if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
            owner.detach(self.id);
        }
    }
}

/// Caller-owned handle for one registered callback.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use conflux::Channel;
///
/// let ch = Channel::<u32>::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let sub = ch.subscribe(move |_| { counter.fetch_add(1, Ordering::SeqCst); });
///
/// ch.submit(1);
/// sub.cancel();
/// sub.cancel(); // idempotent
/// ch.submit(2);
///
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// assert!(sub.is_cancelled());
/// ```
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn from_state(state: Arc<SubscriptionState>) -> Self {
        Self { state }
    }

    pub(crate) fn pre_cancelled() -> Self {
        Self {
            state: SubscriptionState::cancelled(SubscriptionId::next()),
        }
    }

    /// Returns the registry key of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.state.id()
    }

    /// Unregisters the callback. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Returns `true` once the subscription no longer receives values.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Converts the subscription into a guard that cancels on drop.
    #[must_use]
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard {
            inner: Some(self),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancels the wrapped [`Subscription`] when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    inner: Option<Subscription>,
}

impl SubscriptionGuard {
    /// Returns the subscription without cancelling it.
    pub fn disarm(mut self) -> Subscription {
        match self.inner.take() {
            Some(sub) => sub,
            None => Subscription::pre_cancelled(),
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(sub) = self.inner.take() {
            sub.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_cancelled_is_cancelled() {
        let sub = Subscription::pre_cancelled();
        assert!(sub.is_cancelled());
        sub.cancel();
        assert!(sub.is_cancelled());
    }

    #[test]
    fn test_weak_probe_tracks_owner() {
        let owner = Arc::new(());
        let scope = Scope::liveness(&owner);
        assert!(scope.is_alive());
        drop(owner);
        assert!(!scope.is_alive());
    }

    #[test]
    fn test_scope_identity() {
        let owner = Arc::new(());
        let probe: Arc<dyn LivenessProbe> = Arc::new(Arc::downgrade(&owner));
        let a = Scope::Liveness(probe.clone());
        let b = Scope::Liveness(probe);
        assert!(a.same(&b));
        assert!(Scope::None.same(&Scope::None));

        let token = CancellationToken::new();
        assert!(!Scope::Token(token.clone()).same(&Scope::Token(token)));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SubscriptionId::next(), SubscriptionId::next());
    }
}
