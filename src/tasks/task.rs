//! # Task trait and shared handle type.
//!
//! [`Task`] is the unit the fan-in combinators operate on: an asynchronous,
//! cancelable computation that eventually yields a value of type `T` or fails
//! with a [`ProducerError`]. The common handle type is [`TaskRef`], an
//! `Arc<dyn Task<T>>` suitable for sharing across combinators.
//!
//! A task receives a [`CancellationToken`] and should check it at await
//! points to stop cooperatively when a sibling fails or the consumer cancels.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::ProducerError;

/// Boxed future produced by one task launch.
pub type BoxTaskFuture<T> = BoxFuture<'static, Result<T, ProducerError>>;

/// Shared task handle.
pub type TaskRef<T> = Arc<dyn Task<T>>;

/// Global sequence counter for task launches.
static LAUNCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Returns the next launch sequence number.
///
/// Combinators stamp every inner launch with one of these, so log lines for
/// a launch and its settlement (or supersession) can be correlated.
pub fn next_launch_seq() -> u64 {
    LAUNCH_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
}

/// # Asynchronous, cancelable, single-settlement unit.
///
/// A `Task` has a stable [`name`](Task::name) and a [`spawn`](Task::spawn)
/// method that creates a **fresh** future per launch. Implementors should
/// observe the token and return promptly once it is cancelled; combinators
/// rely on this to propagate cancellation within one scheduling tick.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use fanfold::{BoxTaskFuture, ProducerError, Task};
///
/// struct FetchAnswer;
///
/// impl Task<u32> for FetchAnswer {
///     fn name(&self) -> &str { "answer" }
///
///     fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture<u32> {
///         Box::pin(async move {
///             if ctx.is_cancelled() {
///                 return Err(ProducerError::new("canceled"));
///             }
///             Ok(42)
///         })
///     }
/// }
/// ```
pub trait Task<T>: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates one settlement attempt.
    ///
    /// Every call returns a new future owning its own state; a task may be
    /// launched any number of times and each launch settles independently.
    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture<T>;
}
