//! Stream abstraction: multi-value asynchronous producers.
//!
//! A [`Source`] produces an ordered sequence of values terminating in
//! completion or error. Every [`Source::subscribe`] call creates an
//! independent cursor, a [`Subscription`], backed by its own channel and
//! its own producer future; subscriptions never share mutable state.
//!
//! The producer side of a subscription is an [`Outlet`]: values go out with
//! [`Outlet::send`], and the terminal state is sealed by consuming the outlet
//! with [`Outlet::complete`] or [`Outlet::fail`]. After the terminal item no
//! further values can be delivered; the type system enforces it.

mod item;
mod outlet;
mod source;
mod subscription;

pub use item::Item;
pub use outlet::{channel, Outlet};
pub use source::{from_values, once, Source, SourceFn, SourceRef};
pub use subscription::Subscription;

/// Default per-subscription channel capacity.
pub(crate) const DEFAULT_CAPACITY: usize = 32;
