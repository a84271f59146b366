//! Task abstraction: single-settlement asynchronous computations.
//!
//! A [`Task`] runs once and settles with exactly one of three outcomes:
//! a value, a [`ProducerError`](crate::ProducerError), or cancellation
//! (observed through its [`CancellationToken`](tokio_util::sync::CancellationToken)).
//! Once settled it is immutable; combinators share settled values freely.

mod task;
mod task_fn;

pub use task::{next_launch_seq, BoxTaskFuture, Task, TaskRef};
pub use task_fn::TaskFn;
