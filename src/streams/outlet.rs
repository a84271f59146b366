//! # Producer side of a subscription.
//!
//! An [`Outlet`] is handed to whatever produces values: a closure-backed
//! [`SourceFn`](crate::SourceFn), a combinator worker, or an external
//! collaborator such as an HTTP client. It enforces two contracts:
//!
//! - **Terminal sealing**: [`complete`](Outlet::complete) and
//!   [`fail`](Outlet::fail) consume the outlet, so no value can follow the
//!   terminal item.
//! - **Cancellation**: once the consumer cancels its subscription, every
//!   `send` returns `false` within one scheduling tick; producers should stop
//!   promptly.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProducerError;
use crate::streams::item::Item;
use crate::streams::subscription::Subscription;

/// Creates a connected producer/consumer pair.
///
/// The capacity is clamped to a minimum of 1. This is the seam for external
/// producers: hold the [`Outlet`], hand the [`Subscription`] to a combinator.
///
/// # Example
/// ```
/// use fanfold::{channel, Item};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let (outlet, mut sub) = channel::<u32>(8);
///     outlet.send(1).await;
///     outlet.complete().await;
///
///     assert_eq!(sub.recv().await, Some(Item::Value(1)));
///     assert_eq!(sub.recv().await, Some(Item::Done));
/// }
/// ```
pub fn channel<T>(capacity: usize) -> (Outlet<T>, Subscription<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let token = CancellationToken::new();
    (Outlet::new(tx, token.clone()), Subscription::new(rx, token))
}

/// Producer handle for one subscription.
pub struct Outlet<T> {
    tx: mpsc::Sender<Item<T>>,
    token: CancellationToken,
}

impl<T> Outlet<T> {
    pub(crate) fn new(tx: mpsc::Sender<Item<T>>, token: CancellationToken) -> Self {
        Self { tx, token }
    }

    /// Sends the next value, waiting for queue space if necessary.
    ///
    /// Returns `false` when the consumer cancelled or dropped its
    /// subscription; the producer should stop producing.
    pub async fn send(&self, value: T) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        tokio::select! {
            res = self.tx.send(Item::Value(value)) => res.is_ok(),
            _ = self.token.cancelled() => false,
        }
    }

    /// Seals the subscription with successful completion.
    pub async fn complete(self) {
        self.finish(Item::Done).await;
    }

    /// Seals the subscription with a producer error.
    pub async fn fail(self, err: ProducerError) {
        self.finish(Item::Failed(err)).await;
    }

    async fn finish(self, terminal: Item<T>) {
        if self.token.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.tx.send(terminal) => {}
            _ = self.token.cancelled() => {}
        }
    }

    /// True once the consumer cancelled the subscription.
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token shared with the consumer's subscription.
    ///
    /// Producers select on `token().cancelled()` to abandon slow work as soon
    /// as the consumer goes away.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
