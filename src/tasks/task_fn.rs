//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(CancellationToken) -> Fut`, producing a
//! fresh future per launch. This avoids shared mutable state: if launches
//! need to observe each other, share an `Arc<...>` explicitly inside the
//! closure.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use fanfold::{ProducerError, Task, TaskFn, TaskRef};
//!
//! let t: TaskRef<u32> = TaskFn::arc("worker", |ctx: CancellationToken| async move {
//!     if ctx.is_cancelled() {
//!         return Err(ProducerError::new("canceled"));
//!     }
//!     Ok(7)
//! });
//!
//! assert_eq!(t.name(), "worker");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::ProducerError;
use crate::tasks::task::{BoxTaskFuture, Task};

/// Function-backed task implementation.
///
/// Wraps a closure that *creates* a new future per launch.
#[derive(Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`](crate::TaskRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the task and returns it as a shared handle (`Arc<TaskFn<F>>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut, T> Task<T> for TaskFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<T, ProducerError>> + Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture<T> {
        Box::pin((self.f)(ctx))
    }
}
