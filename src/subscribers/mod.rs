//! # Ready-made event consumers.
//!
//! Anything subscribed to [`Channel::events`](crate::Channel::events) consumes
//! lifecycle and fault [`Event`](crate::Event)s; this module ships the built-in
//! ones.
//!
//! ## Architecture
//! ```text
//!   registry / pump / stage ── Event ──► channel.events() ──► callbacks
//!                                                               │
//!                                                     ┌─────────┼─────────┐
//!                                                     ▼         ▼         ▼
//!                                                 LogWriter  Metrics   Custom
//! ```
//!
//! ## Implementing custom consumers
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use conflux::Channel;
//!
//! let ch = Channel::<u32>::new();
//! let faults = Arc::new(AtomicUsize::new(0));
//! let counter = faults.clone();
//! let _sub = ch.events().subscribe(move |e| {
//!     if e.is_fault() {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     }
//! });
//!
//! let _bad = ch.subscribe(|_| panic!("boom"));
//! ch.submit(1);
//! assert_eq!(faults.load(Ordering::Relaxed), 1);
//! ```

mod log;

pub use log::LogWriter;
