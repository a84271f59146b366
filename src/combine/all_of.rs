//! # AllOf: join-all over a fixed set of tasks.
//!
//! Launches every task concurrently and settles once with an index-aligned
//! vector of all results, or with the **first** error. On error (or consumer
//! cancellation) every still-pending sibling is cancelled and joined before
//! the outcome is surfaced, so cancellation is fully observed.
//!
//! ## Flow
//! ```text
//! AllOf::new([t0, t1, t2]).run(ctx)
//!
//!   spawn t0 ──┐
//!   spawn t1 ──┼──► JoinSet ──► slots[index] = value
//!   spawn t2 ──┘                  │
//!                                 ├─ all filled ──► Ok([v0, v1, v2])
//!                                 ├─ first error ─► cancel siblings, join, Err(Producer)
//!                                 └─ ctx cancelled ► cancel all, join, Err(Canceled)
//! ```
//!
//! ## Rules
//! - Result order is **input order**, never completion order.
//! - Zero tasks settle immediately with an empty vector.
//! - Defined only over producers that eventually settle: a task that never
//!   returns simply keeps the run pending (caller error, not defended
//!   against at the type level).

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{FlowError, ProducerError};
use crate::tasks::{next_launch_seq, TaskRef};

/// Join-all combinator: all succeed, or first error wins.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use fanfold::{AllOf, TaskFn, TaskRef};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let tasks: Vec<TaskRef<u32>> = (0u32..3)
///         .map(|n| {
///             TaskFn::arc(format!("task-{n}"), move |_ctx: CancellationToken| async move {
///                 Ok(n)
///             }) as TaskRef<u32>
///         })
///         .collect();
///
///     let values = AllOf::new(tasks).run(CancellationToken::new()).await.unwrap();
///     assert_eq!(values, vec![0, 1, 2]);
/// }
/// ```
pub struct AllOf<T> {
    tasks: Vec<TaskRef<T>>,
}

impl<T: Send + 'static> AllOf<T> {
    /// Creates the combinator over a fixed, ordered collection of tasks.
    pub fn new(tasks: Vec<TaskRef<T>>) -> Self {
        Self { tasks }
    }

    /// Number of input tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when there are no input tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task to settlement.
    ///
    /// Cancelling `ctx` aborts the run: all inner tasks are cancelled and the
    /// result is [`FlowError::Canceled`].
    pub async fn run(self, ctx: CancellationToken) -> Result<Vec<T>, FlowError> {
        if self.tasks.is_empty() {
            return Ok(Vec::new());
        }

        let n = self.tasks.len();
        let inner = ctx.child_token();
        let mut set: JoinSet<(usize, Result<T, ProducerError>)> = JoinSet::new();

        for (index, task) in self.tasks.into_iter().enumerate() {
            let seq = next_launch_seq();
            tracing::debug!(task = task.name(), seq, index, "launching joined task");
            let child = inner.child_token();
            set.spawn(async move { (index, task.spawn(child).await) });
        }

        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(n).collect();
        let mut filled = 0usize;

        while filled < n {
            // Biased: once the consumer cancels, the verdict is Canceled even
            // when inner tasks have already settled with errors in response
            // to that same cancellation.
            let joined = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    return Err(abort(&inner, &mut set, FlowError::Canceled).await);
                }
                joined = set.join_next() => joined,
            };
            match joined {
                Some(Ok((index, Ok(value)))) => {
                    slots[index] = Some(value);
                    filled += 1;
                }
                Some(Ok((_, Err(err)))) => {
                    return Err(abort(&inner, &mut set, FlowError::Producer(err)).await);
                }
                Some(Err(join_err)) => {
                    let err = ProducerError::panicked(join_err);
                    return Err(abort(&inner, &mut set, FlowError::Producer(err)).await);
                }
                None => break,
            }
        }

        // filled == n guarantees every slot is occupied.
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Cancels all pending siblings and joins them before surfacing `err`.
async fn abort<R: Send + 'static>(
    inner: &CancellationToken,
    set: &mut JoinSet<R>,
    err: FlowError,
) -> FlowError {
    inner.cancel();
    while set.join_next().await.is_some() {}
    err
}
