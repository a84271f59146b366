//! Error types used by the fanfold combinators.
//!
//! This module defines three error types:
//!
//! - [`ProducerError`]: an inner task or stream failed while producing.
//! - [`FlowError`]: terminal outcome of a combinator run (producer failure
//!   or cancellation before settling).
//! - [`ConfigError`]: invalid combinator configuration, rejected at
//!   construction time.
//!
//! All types provide `as_label()` helpers for logging/metrics. Errors carry
//! their message as `Arc<str>` so they stay cheap to clone across fan-out
//! boundaries.

use std::sync::Arc;
use thiserror::Error;

/// # Failure reported by an inner producer.
///
/// Wraps the message of a failed task or stream. Combinators either surface
/// it (fail-fast), forward it as a per-item marker (error-isolated), or
/// swallow it into a fallback value (fail-soft pipelines).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProducerError {
    message: Arc<str>,
}

impl ProducerError {
    /// Creates a producer error from any message.
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates a producer error describing a panicked inner unit.
    pub fn panicked(info: impl std::fmt::Display) -> Self {
        Self::new(format!("producer panicked: {info}"))
    }

    /// Returns the underlying message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ProducerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ProducerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// # Terminal outcome of a combinator run.
///
/// A combinator's consumer sees exactly one of: values followed by
/// completion, a single [`FlowError::Producer`], or
/// [`FlowError::Canceled`] when the consumer itself gave up first.
/// A cancellation is never surfaced to unrelated siblings.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// An inner producer failed; first error wins under fail-fast policies.
    #[error("producer failed: {0}")]
    Producer(#[from] ProducerError),

    /// The subscription was cancelled before the combinator settled.
    #[error("canceled before settling")]
    Canceled,
}

impl FlowError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fanfold::{FlowError, ProducerError};
    ///
    /// let err = FlowError::Producer(ProducerError::new("boom"));
    /// assert_eq!(err.as_label(), "producer_failed");
    /// assert_eq!(FlowError::Canceled.as_label(), "canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FlowError::Producer(_) => "producer_failed",
            FlowError::Canceled => "canceled",
        }
    }

    /// True when the run ended because the consumer cancelled it.
    pub fn is_canceled(&self) -> bool {
        matches!(self, FlowError::Canceled)
    }
}

/// # Invalid combinator configuration.
///
/// Rejected at construction, before any producer is launched.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A concurrency limit of zero would admit no work at all.
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    /// A replay buffer that can hold nothing cannot replay anything.
    #[error("replay capacity must be at least 1")]
    ZeroCapacity,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ZeroConcurrency => "zero_concurrency",
            ConfigError::ZeroCapacity => "zero_capacity",
        }
    }
}
