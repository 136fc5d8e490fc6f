//! Error types used by channels, producers and transform stages.
//!
//! This module defines two main error enums:
//!
//! - [`ProducerError`]: faults raised by a channel's producer while pumping values.
//! - [`StageError`]: faults raised by a per-value computation inside a transform stage.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logs and
//! [`Event`](crate::Event) reasons. None of them is ever delivered to subscribers as a
//! value: faults stay local and are reported on the owning channel's
//! [`events`](crate::Channel::events) side channel.

use std::any::Any;

use thiserror::Error;

/// # Faults produced by a channel producer.
///
/// A producer fault ends the current producer instance. The channel does not
/// retry; a fresh instance is created on the next 0→1 subscriber edge.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    /// The producer reported a failure while computing its next value.
    #[error("producer failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The producer (or its factory) panicked.
    #[error("producer panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl ProducerError {
    /// Builds a [`ProducerError::Failed`] from anything printable.
    pub fn failed(error: impl ToString) -> Self {
        ProducerError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use conflux::ProducerError;
    ///
    /// let err = ProducerError::failed("socket closed");
    /// assert_eq!(err.as_label(), "producer_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProducerError::Failed { .. } => "producer_failed",
            ProducerError::Panicked { .. } => "producer_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProducerError::Failed { error } => format!("error: {error}"),
            ProducerError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Faults produced by a transform stage.
///
/// Under [`Strategy::Sequential`](crate::Strategy::Sequential) and
/// [`Strategy::ConcurrentOrdered`](crate::Strategy::ConcurrentOrdered) a fault closes
/// the stage; under [`Strategy::ConcurrentUnordered`](crate::Strategy::ConcurrentUnordered)
/// the faulting value is dropped.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// The per-value function returned an error.
    #[error("stage failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The per-value function panicked.
    #[error("stage panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The computation was cancelled before it produced a result.
    #[error("stage computation cancelled")]
    Canceled,
}

impl StageError {
    /// Builds a [`StageError::Failed`] from anything printable.
    pub fn failed(error: impl ToString) -> Self {
        StageError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use conflux::StageError;
    ///
    /// assert_eq!(StageError::Canceled.as_label(), "stage_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StageError::Failed { .. } => "stage_failed",
            StageError::Panicked { .. } => "stage_panicked",
            StageError::Canceled => "stage_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StageError::Failed { error } => format!("error: {error}"),
            StageError::Panicked { info } => format!("panic: {info}"),
            StageError::Canceled => "computation cancelled".to_string(),
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(ProducerError::failed("x").as_label(), "producer_failed");
        assert_eq!(
            ProducerError::Panicked { info: "x".into() }.as_label(),
            "producer_panicked"
        );
        assert_eq!(StageError::failed("x").as_label(), "stage_failed");
        assert_eq!(
            StageError::Panicked { info: "x".into() }.as_label(),
            "stage_panicked"
        );
    }

    #[test]
    fn test_display_carries_error() {
        let err = StageError::failed("boom");
        assert_eq!(err.to_string(), "stage failed: boom");
        assert_eq!(err.as_message(), "error: boom");
    }

    #[test]
    fn test_panic_message_downcasts() {
        let from_str = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*from_str), "static");

        let from_string =
            std::panic::catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_message(&*from_string), "owned");

        let other = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(&*other), "unknown panic");
    }
}
