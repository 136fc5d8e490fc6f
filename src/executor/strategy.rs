//! # Ordering strategies for async transform stages.
//!
//! [`Strategy`] selects how per-value computations of a stage are scheduled
//! and in which order their results are released:
//! - [`Strategy::Sequential`]: one computation at a time, input order;
//! - [`Strategy::ConcurrentUnordered`]: all started eagerly, completion order;
//! - [`Strategy::ConcurrentOrdered`]: all started eagerly, input order.
//!
//! [`Step`] is what a stage function returns per value.
//!
//! # Example
//! ```
//! use conflux::{Step, Strategy};
//!
//! assert_eq!(Strategy::default(), Strategy::Sequential);
//! assert!(Strategy::ConcurrentOrdered.preserves_order());
//! assert!(!Strategy::ConcurrentUnordered.preserves_order());
//!
//! let step: Step<u32> = Step::Emit(7);
//! assert!(step.is_emit());
//! ```

/// Scheduling and release order of a stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Await each computation fully before starting the next.
    #[default]
    Sequential,
    /// Start every computation immediately; release in completion order.
    ConcurrentUnordered,
    /// Start every computation immediately; release in input order.
    ConcurrentOrdered,
}

impl Strategy {
    /// Returns `true` if results are released in input order.
    pub fn preserves_order(self) -> bool {
        !matches!(self, Strategy::ConcurrentUnordered)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::ConcurrentUnordered => "concurrent_unordered",
            Strategy::ConcurrentOrdered => "concurrent_ordered",
        }
    }
}

/// Outcome of one per-value computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step<U> {
    /// Forward the value downstream.
    Emit(U),
    /// Forward nothing for this input.
    Skip,
    /// Close the stage.
    ///
    /// Ordered strategies close at this input; the unordered strategy closes
    /// when the signal completes, possibly after later inputs were forwarded.
    Stop,
}

impl<U> Step<U> {
    /// Returns `true` for [`Step::Emit`].
    pub fn is_emit(&self) -> bool {
        matches!(self, Step::Emit(_))
    }

    /// Returns `true` for [`Step::Stop`].
    pub fn is_stop(&self) -> bool {
        matches!(self, Step::Stop)
    }

    /// Returns the emitted value, if any.
    pub fn into_value(self) -> Option<U> {
        match self {
            Step::Emit(value) => Some(value),
            Step::Skip | Step::Stop => None,
        }
    }
}

impl<U> From<Option<U>> for Step<U> {
    /// `Some` emits, `None` skips.
    fn from(value: Option<U>) -> Self {
        match value {
            Some(value) => Step::Emit(value),
            None => Step::Skip,
        }
    }
}
