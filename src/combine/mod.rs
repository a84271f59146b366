//! Fan-out/fan-in combinators.
//!
//! Three combination strategies over tasks and streams:
//!
//! - [`AllOf`] is join-all: one index-aligned result vector once every task
//!   succeeds; fail-fast on the first error.
//! - [`LatestOf`] is join-latest: a combined vector of latest values every
//!   time any input emits, once all have emitted; fail-fast.
//! - [`FlattenConcurrent`] is a bounded-concurrency flatten: inner results in
//!   completion order, with a configurable error policy.
//!
//! Each combinator instance drives its inputs from a single worker loop, so
//! inner callbacks are processed one at a time in arrival order. That is the
//! ordering guarantee the data-model invariants rely on. Cancelling a
//! combinator's output cancels every still-pending inner unit within one
//! scheduling tick.

mod all_of;
mod flatten;
mod latest_of;

pub use all_of::AllOf;
pub use flatten::{ErrorMode, FlattenConcurrent, FlattenConfig};
pub use latest_of::LatestOf;

use crate::error::ProducerError;

/// How a combinator worker seals its output after the main loop.
pub(crate) enum Seal {
    /// All inputs done; seal with completion.
    Complete,
    /// Terminal failure; seal with the error.
    Fail(ProducerError),
    /// Consumer cancelled; leave the outlet unsealed and drop it.
    Abandon,
}
