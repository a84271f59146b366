//! Replay multicast: one upstream run shared by many subscribers.
//!
//! [`ReplayBuffer`] wraps a [`Source`](crate::Source) and changes its
//! subscription semantics: instead of re-running the producer per subscriber,
//! the first subscription starts a single upstream run and every subscriber
//! taps into it. Late subscribers are caught up from a bounded buffer of the
//! most recent values before receiving live ones.
//!
//! When the last tap detaches, the upstream run survives for a grace window;
//! a new tap inside the window reattaches without restarting the producer.

mod buffer;

pub use buffer::{ReplayBuffer, ReplayConfig};
