//! # Channel: push/pull reactive conduit.
//!
//! A [`Channel`] broadcasts submitted values to every registered callback and
//! can be backed by a lazily started [`Producer`](super::Producer).
//!
//! ## Architecture
//! ```text
//! submit(v) ──► snapshot registry ──► for each live entry: catch_unwind(cb(&v))
//!                                        └─► panic → SubscriberPanicked on events()
//!
//! subscribe(cb) ──► Registry::insert ──► 0→1 edge ──► factory() ──► spawn pump
//! cancel()      ──► Registry::remove ──► 1→0 edge ──► token.cancel() ──► producer.stop()
//! ```
//!
//! ## Rules
//! - `submit()` never suspends; all callbacks for a batch run before it returns.
//! - Every subscriber sees value *i* before any subscriber sees *i+1*.
//! - The registry lock is never held while user code runs, so callbacks may
//!   reenter the channel (submit, subscribe, cancel).
//! - A subscription cancelled mid-batch receives nothing after the cancel.
//! - A replaying channel is kept alive by its subscribers; a cold one by its
//!   running pump. Both let go on the 1→0 edge.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock, Weak};

use futures::Stream;
use parking_lot::{Mutex, ReentrantMutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ProducerError, panic_message};
use crate::events::{Event, EventKind, EventSink, Reporter};

use super::producer::{
    BoxProducer, Producer, ProducerFactory, PumpExit, StreamProducer, TryStreamProducer, pump,
};
use super::registry::{Callback, Entry, Registry, Transition};
use super::stream::ChannelStream;
use super::subscription::{Detach, Scope, Subscription, SubscriptionId, SubscriptionState};

/// Subscriber-count change published on
/// [`subscriber_added`](Channel::subscriber_added) and
/// [`subscriber_removed`](Channel::subscriber_removed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriberChange {
    /// Subscription that was added or removed.
    pub id: SubscriptionId,
    /// Subscriber count after the change.
    pub subscribers: usize,
}

/// Replay hook run atomically with registration.
pub(crate) struct ReplaySource<V> {
    /// Serializes registration+replay against the feeding side.
    pub(crate) gate: Arc<ReentrantMutex<()>>,
    pub(crate) snapshot: Box<dyn Fn() -> Vec<V> + Send + Sync>,
}

/// Shared state behind every [`Channel`] handle.
pub(crate) struct Shared<V> {
    registry: Mutex<Registry<V>>,
    factory: Option<ProducerFactory<V>>,
    replay: Option<ReplaySource<V>>,
    /// Self-reference held while a replaying channel has subscribers.
    anchor: Mutex<Option<Arc<Shared<V>>>>,
    /// Live values held back from registrations still replaying.
    replaying: Mutex<HashMap<SubscriptionId, VecDeque<V>>>,
    added: OnceLock<Channel<SubscriberChange>>,
    removed: OnceLock<Channel<SubscriberChange>>,
    events: OnceLock<Channel<Event>>,
}

/// Typed multi-subscriber conduit bridging push delivery and pull iteration.
///
/// Cloning a `Channel` is cheap; clones share subscribers and producer.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use conflux::Channel;
///
/// let ch = Channel::<&'static str>::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let _sub = ch.subscribe(move |v| sink.lock().unwrap().push(*v));
///
/// ch.submit_all(["a", "b"]);
/// assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
/// ```
pub struct Channel<V> {
    shared: Arc<Shared<V>>,
}

/// Non-owning handle to a [`Channel`].
pub(crate) struct WeakChannel<V> {
    shared: Weak<Shared<V>>,
}

impl<V> WeakChannel<V> {
    pub(crate) fn upgrade(&self) -> Option<Channel<V>> {
        self.shared.upgrade().map(|shared| Channel { shared })
    }
}

impl<V> Clone for Channel<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> fmt::Debug for Channel<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("Channel")
            .field("subscribers", &registry.len())
            .field("running", &registry.is_running())
            .field("cold", &self.shared.factory.is_some())
            .finish()
    }
}

impl<V> Default for Channel<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Channel<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a hot channel fed only by [`submit`](Self::submit).
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates a cold channel backed by a producer factory.
    ///
    /// The factory is invoked on every 0→1 subscriber edge; the instance is
    /// stopped on the matching 1→0 edge. Pumping requires a tokio runtime.
    pub fn with_producer<F, P>(factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Producer<V>,
    {
        let factory: ProducerFactory<V> = Arc::new(move || Box::new(factory()) as BoxProducer<V>);
        Self::build(Some(factory), None)
    }

    /// Creates a cold channel whose producer iterates a fresh stream per edge.
    pub fn from_stream<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = V> + Send + 'static,
    {
        Self::with_producer(move || StreamProducer::new(factory()))
    }

    /// Creates a cold channel from a stream of results; the first `Err` ends the instance.
    pub fn from_try_stream<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<V, ProducerError>> + Send + 'static,
    {
        Self::with_producer(move || TryStreamProducer::new(factory()))
    }

    /// Creates a cold channel whose factory gets a [`Reporter`] for this channel.
    pub(crate) fn with_reporting_producer<F, P>(factory: F) -> Self
    where
        F: Fn(Reporter) -> P + Send + Sync + 'static,
        P: Producer<V>,
    {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<V>>| {
            let sink: Weak<dyn EventSink> = weak.clone();
            let reporter = Reporter::new(sink);
            let factory: ProducerFactory<V> =
                Arc::new(move || Box::new(factory(reporter.clone())) as BoxProducer<V>);
            Shared::new(Some(factory), None)
        });
        Self { shared }
    }

    /// Creates a hot channel whose new subscribers first receive `replay`'s snapshot.
    pub(crate) fn with_replay(replay: ReplaySource<V>) -> Self {
        Self::build(None, Some(replay))
    }

    fn build(factory: Option<ProducerFactory<V>>, replay: Option<ReplaySource<V>>) -> Self {
        Self {
            shared: Arc::new(Shared::new(factory, replay)),
        }
    }

    /// Delivers `value` to every registered subscriber.
    pub fn submit(&self, value: V) {
        self.shared.deliver(&value);
    }

    /// Delivers each value in order; all subscribers see value *i* before *i+1*.
    pub fn submit_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = V>,
    {
        for value in values {
            self.shared.deliver(&value);
        }
    }

    /// Registers a callback with explicit ownership.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(callback), Scope::None)
    }

    /// Registers a callback tied to `scope`.
    pub fn subscribe_with<F>(&self, callback: F, scope: Scope) -> Subscription
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(callback), scope)
    }

    /// Registers a shared callback; the same `Arc` with an identical scope
    /// replaces its earlier registration.
    pub fn subscribe_callback(&self, callback: Callback<V>, scope: Scope) -> Subscription {
        self.shared.register(callback, scope)
    }

    /// Returns a pull view that subscribes on first poll.
    pub fn stream(&self) -> ChannelStream<V> {
        ChannelStream::lazy(self.clone())
    }

    /// Returns a pull view that is subscribed immediately.
    ///
    /// Values submitted after this call are buffered even before the first poll.
    pub fn listen(&self) -> ChannelStream<V> {
        ChannelStream::attached(self.clone())
    }

    /// Composition sugar: returns `f(self)`.
    pub fn derive<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Self) -> R,
    {
        f(self)
    }

    /// Removes registrations whose scope is gone; returns how many were removed.
    pub fn prune(&self) -> usize {
        let stale = self.shared.registry.lock().stale();
        let n = stale.len();
        for state in stale {
            state.cancel();
        }
        n
    }

    /// Returns the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Returns `true` while a producer instance is live.
    pub fn is_running(&self) -> bool {
        self.shared.registry.lock().is_running()
    }

    /// Returns `true` if the channel is backed by a producer factory.
    pub fn is_cold(&self) -> bool {
        self.shared.factory.is_some()
    }

    /// Channel of subscriber-added notifications (created on first use).
    pub fn subscriber_added(&self) -> Channel<SubscriberChange> {
        self.shared.added.get_or_init(Channel::new).clone()
    }

    /// Channel of subscriber-removed notifications (created on first use).
    pub fn subscriber_removed(&self) -> Channel<SubscriberChange> {
        self.shared.removed.get_or_init(Channel::new).clone()
    }

    /// Channel of lifecycle and fault [`Event`]s (created on first use).
    pub fn events(&self) -> Channel<Event> {
        self.shared.events.get_or_init(Channel::new).clone()
    }

    pub(crate) fn downgrade(&self) -> WeakChannel<V> {
        WeakChannel {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Returns a weak reporter publishing on this channel's events.
    #[cfg(test)]
    pub(crate) fn reporter(&self) -> Reporter {
        let weak: Weak<Shared<V>> = Arc::downgrade(&self.shared);
        let sink: Weak<dyn EventSink> = weak;
        Reporter::new(sink)
    }
}

impl<V> Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new(factory: Option<ProducerFactory<V>>, replay: Option<ReplaySource<V>>) -> Self {
        Self {
            registry: Mutex::new(Registry::new(factory.is_some())),
            factory,
            replay,
            anchor: Mutex::new(None),
            replaying: Mutex::new(HashMap::new()),
            added: OnceLock::new(),
            removed: OnceLock::new(),
            events: OnceLock::new(),
        }
    }

    /// Broadcasts one value to a snapshot of the registry.
    pub(crate) fn deliver(&self, value: &V) {
        let entries = self.registry.lock().snapshot();
        for entry in entries {
            if !entry.is_live() {
                // no-op for entries already cancelled
                entry.state.cancel();
                continue;
            }
            if self.defer(entry.id(), value) {
                continue;
            }
            self.invoke(entry.id(), &entry.callback, value);
        }
    }

    /// Queues `value` for a registration that is still replaying.
    fn defer(&self, id: SubscriptionId, value: &V) -> bool {
        if self.replay.is_none() {
            return false;
        }
        match self.replaying.lock().get_mut(&id) {
            Some(queue) => {
                queue.push_back(value.clone());
                true
            }
            None => false,
        }
    }

    /// Runs one callback with panic isolation.
    fn invoke(&self, id: SubscriptionId, callback: &Callback<V>, value: &V) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
            let info = panic_message(&*panic);
            tracing::warn!(subscription = %id, info = %info, "subscriber callback panicked");
            self.publish_event(Event::subscriber_panicked(id, info));
        }
    }

    fn register(self: &Arc<Self>, callback: Callback<V>, scope: Scope) -> Subscription {
        if !scope.is_alive() {
            return Subscription::pre_cancelled();
        }

        let id = SubscriptionId::next();
        let weak: Weak<Shared<V>> = Arc::downgrade(self);
        let owner: Weak<dyn Detach> = weak;
        let state = SubscriptionState::new(id, owner);
        let entry = Entry {
            state: Arc::clone(&state),
            callback: Arc::clone(&callback),
            scope: scope.clone(),
        };

        let inserted = match &self.replay {
            Some(replay) => {
                let _gate = replay.gate.lock();
                self.replaying.lock().insert(id, VecDeque::new());
                let inserted = {
                    let mut registry = self.registry.lock();
                    let inserted = registry.insert(entry);
                    if !inserted.replaced && inserted.count == 1 {
                        *self.anchor.lock() = Some(Arc::clone(self));
                    }
                    inserted
                };
                for value in (replay.snapshot)() {
                    if state.is_cancelled() {
                        break;
                    }
                    self.invoke(id, &callback, &value);
                }
                self.drain_replaying(id, &state, &callback);
                inserted
            }
            None => self.registry.lock().insert(entry),
        };

        if !inserted.replaced {
            tracing::trace!(subscription = %id, subscribers = inserted.count, "subscriber added");
            let change = SubscriberChange {
                id,
                subscribers: inserted.count,
            };
            if let Some(added) = self.added.get() {
                added.submit(change);
            }
            self.publish_event(
                Event::new(EventKind::SubscriberAdded)
                    .with_subscription(id)
                    .with_subscribers(inserted.count),
            );
        }

        if let Some(transition) = inserted.transition {
            self.apply(transition);
        }

        if let Scope::Token(token) = scope {
            watch_token(&state, token);
        }

        Subscription::from_state(state)
    }

    /// Delivers values held back during replay, then switches the registration to live.
    fn drain_replaying(
        &self,
        id: SubscriptionId,
        state: &SubscriptionState,
        callback: &Callback<V>,
    ) {
        loop {
            let next = {
                let mut replaying = self.replaying.lock();
                let next = replaying.get_mut(&id).and_then(VecDeque::pop_front);
                if next.is_none() {
                    replaying.remove(&id);
                }
                next
            };
            match next {
                Some(value) if !state.is_cancelled() => self.invoke(id, callback, &value),
                Some(_) => {}
                None => break,
            }
        }
    }

    fn apply(self: &Arc<Self>, transition: Transition) {
        match transition {
            Transition::Start { generation, token } => self.start_producer(generation, token),
            Transition::Stop { token } => token.cancel(),
        }
    }

    fn start_producer(self: &Arc<Self>, generation: u64, token: CancellationToken) {
        let Some(factory) = &self.factory else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.producer_finished(
                    generation,
                    PumpExit::Failed(ProducerError::failed("no tokio runtime to drive the producer")),
                );
                return;
            }
        };

        let producer = match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(producer) => producer,
            Err(panic) => {
                self.producer_finished(
                    generation,
                    PumpExit::Failed(ProducerError::Panicked {
                        info: panic_message(&*panic),
                    }),
                );
                return;
            }
        };

        tracing::debug!(generation, "producer started");
        self.publish_event(Event::new(EventKind::ProducerStarted));
        runtime.spawn(pump(Arc::clone(self), producer, token, generation));
    }

    /// Called by the pump when its loop ends.
    pub(crate) fn producer_finished(&self, generation: u64, exit: PumpExit) {
        self.registry.lock().finish(generation);
        match exit {
            PumpExit::Stopped => {
                tracing::debug!(generation, "producer stopped");
                self.publish_event(Event::new(EventKind::ProducerStopped));
            }
            PumpExit::Exhausted => {
                tracing::debug!(generation, "producer exhausted");
                self.publish_event(Event::new(EventKind::ProducerExhausted));
            }
            PumpExit::Failed(err) => {
                tracing::warn!(generation, error = %err, "producer failed");
                self.publish_event(
                    Event::new(EventKind::ProducerFailed)
                        .with_reason(format!("{}: {}", err.as_label(), err.as_message())),
                );
            }
        }
    }

    fn publish_event(&self, event: Event) {
        if let Some(events) = self.events.get() {
            events.submit(event);
        }
    }
}

impl<V> Detach for Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn detach(&self, id: SubscriptionId) {
        let (removed, _released) = {
            let mut registry = self.registry.lock();
            let removed = registry.remove(id);
            let released = match removed {
                Some((0, _)) => self.anchor.lock().take(),
                _ => None,
            };
            (removed, released)
        };
        let Some((count, transition)) = removed else {
            return;
        };

        tracing::trace!(subscription = %id, subscribers = count, "subscriber removed");
        if let Some(removed) = self.removed.get() {
            removed.submit(SubscriberChange {
                id,
                subscribers: count,
            });
        }
        self.publish_event(
            Event::new(EventKind::SubscriberRemoved)
                .with_subscription(id)
                .with_subscribers(count),
        );

        if let Some(Transition::Stop { token }) = transition {
            token.cancel();
        }
    }
}

impl<V> EventSink for Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn publish(&self, event: Event) {
        self.publish_event(event);
    }
}

/// Cancels `state` when `token` fires; exits early if the subscription is cancelled first.
fn watch_token(state: &Arc<SubscriptionState>, token: CancellationToken) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        // checked lazily at delivery time instead
        return;
    };
    let state = Arc::clone(state);
    runtime.spawn(async move {
        tokio::select! {
            _ = token.cancelled() => state.cancel(),
            _ = state.closed().cancelled() => {}
        }
    });
}
