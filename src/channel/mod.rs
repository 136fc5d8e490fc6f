//! Channel core: the reactive primitive every operator composes over.
//!
//! ## Contents
//! - [`Channel`] subscriber registry, broadcast, hot/cold producer lifecycle
//! - [`Subscription`], [`SubscriptionGuard`], [`Scope`], [`LivenessProbe`] registration handles and lifetimes
//! - [`Producer`], [`StreamProducer`], [`TryStreamProducer`] sources backing cold channels
//! - [`ChannelStream`] pull view bridging push delivery into a `Stream`
//!
//! ## Quick reference
//! - **Hot channel**: [`Channel::new`], fed by [`Channel::submit`].
//! - **Cold channel**: [`Channel::with_producer`] / [`Channel::from_stream`];
//!   the producer runs only while somebody is subscribed.
//! - **Derived channel**: any operator; it is cold and subscribes upstream when
//!   it gets its first subscriber.

#[allow(clippy::module_inception)]
mod channel;
mod producer;
mod registry;
mod stream;
mod subscription;

pub use channel::{Channel, SubscriberChange};
pub use producer::{BoxProducer, Producer, ProducerFactory, StreamProducer, TryStreamProducer};
pub use registry::Callback;
pub use stream::ChannelStream;
pub use subscription::{LivenessProbe, Scope, Subscription, SubscriptionGuard, SubscriptionId};

pub(crate) use channel::{ReplaySource, WeakChannel};
