//! # conflux
//!
//! **Conflux** is a reactive channel library for Rust on top of tokio.
//!
//! One abstraction, [`Channel`], unifies push delivery (`submit` + callbacks)
//! with pull iteration (`futures::Stream`). Operators derive new channels that
//! transform, combine, delay, and cache the values flowing through.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//!     │ submit(v)    │     │   Producer   │     │  Producer    │
//!     │ (hot source) │     │ (cold source)│     │ (operator)   │
//!     └──────┬───────┘     └──────┬───────┘     └──────┬───────┘
//!            ▼                    ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Channel<V>                                                       │
//! │  - Registry (subscribers in registration order + producer slot)   │
//! │  - Producer pump (spawned on 0→1, cancelled on 1→0)               │
//! │  - Side channels: subscriber_added / subscriber_removed / events  │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     callback           callback        ChannelStream         │ Event
//!    (catch_unwind)     (catch_unwind)   (mpsc queue)          ▼
//!                                          │             events() ──► LogWriter
//!                                          ▼
//!                              derived channel's producer
//!                  (map / stage / debounce / cache / ...)
//! ```
//!
//! ### Lifecycle of a cold channel
//! ```text
//! subscribe ──► Registry::insert
//!
//! 0→1 edge:
//!   ├─► factory() ──► Producer
//!   ├─► publish ProducerStarted
//!   └─► spawn pump
//!         loop {
//!           ├─ cancelled         ─► producer.stop(), ProducerStopped, exit
//!           ├─ next() = Some(v)  ─► submit(v) to every subscriber
//!           ├─ next() = None     ─► ProducerExhausted, exit
//!           └─ next() = Err/panic─► ProducerFailed, exit (no retry)
//!         }
//!
//! 1→0 edge: cancel pump token; the next 0→1 edge creates a fresh instance
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                       |
//! |-------------------|-----------------------------------------------------------------|------------------------------------------|
//! | **Channels**      | Broadcast, hot/cold lifecycle, push→pull bridging.              | [`Channel`], [`Producer`], [`ChannelStream`] |
//! | **Subscriptions** | Explicit, token-scoped or liveness-scoped registrations.        | [`Subscription`], [`Scope`], [`LivenessProbe`] |
//! | **Stages**        | Async per-value transforms with three ordering contracts.       | [`Strategy`], [`Step`], [`StageConfig`]  |
//! | **Offload**       | Run CPU-heavy work on the blocking pool.                        | [`Worker`], [`BlockingWorker`]           |
//! | **Cache**         | Size/TTL-bounded replay with eviction records.                  | [`Cache`], [`CacheConfig`], [`Eviction`] |
//! | **Time**          | debounce, throttle, audit, sample, rate limit.                  | [`Channel::debounce`] and friends        |
//! | **Events**        | Lifecycle and fault records per channel.                        | [`Event`], [`EventKind`]                 |
//! | **Errors**        | Typed producer and stage faults.                                | [`ProducerError`], [`StageError`]        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use futures::StreamExt;
//! use conflux::{CacheConfig, Channel, StageConfig, Strategy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let readings = Channel::<u32>::new();
//!
//!     // Keep the last three readings for late subscribers
//!     let recent = readings.cache(CacheConfig::default().with_size(3));
//!
//!     // Enrich every reading concurrently, releasing results in input order
//!     let enriched = readings.map_async(
//!         StageConfig::new(Strategy::ConcurrentOrdered),
//!         |v: u32| async move {
//!             tokio::time::sleep(Duration::from_millis(u64::from(10 - v))).await;
//!             Ok::<_, std::convert::Infallible>(v * 10)
//!         },
//!     );
//!
//!     let mut out = enriched.listen();
//!     readings.submit_all([1, 2, 3, 4]);
//!
//!     let got: Vec<u32> = (&mut out).take(4).collect().await;
//!     assert_eq!(got, vec![10, 20, 30, 40]);
//!     assert_eq!(recent.values(), vec![2, 3, 4]);
//! }
//! ```
mod cache;
mod channel;
mod config;
mod error;
mod events;
mod executor;
mod offload;
mod operators;

// ---- Public re-exports ----

pub use cache::{Cache, DropStrategy, Eviction, EvictionReason};
pub use channel::{
    BoxProducer, Callback, Channel, ChannelStream, LivenessProbe, Producer, ProducerFactory,
    Scope, StreamProducer, SubscriberChange, Subscription, SubscriptionGuard, SubscriptionId,
    TryStreamProducer,
};
pub use config::{CacheConfig, StageConfig};
pub use error::{ProducerError, StageError};
pub use events::{Event, EventKind};
pub use executor::{Step, Strategy};
pub use offload::{BlockingWorker, Worker};

// Optional: expose a simple built-in event renderer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
mod subscribers;
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
