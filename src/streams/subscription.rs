//! # Consumer side of a stream or combinator output.
//!
//! A [`Subscription`] owns the relationship between one subscriber and one
//! producer. It is an independent cursor: receiving on it never affects other
//! subscribers of the same source.
//!
//! ## Cancellation
//! [`cancel`](Subscription::cancel), or simply dropping the subscription,
//! cancels the shared token. Producers observe the token at their next await
//! point and release upstream resources within one scheduling tick. After
//! cancellation, [`recv`](Subscription::recv) delivers nothing further.

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::FlowError;
use crate::streams::item::Item;

/// Receiving end of one producer/consumer relationship.
#[must_use = "a subscription delivers nothing unless received from"]
pub struct Subscription<T> {
    rx: mpsc::Receiver<Item<T>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl<T> Subscription<T> {
    pub(crate) fn new(rx: mpsc::Receiver<Item<T>>, token: CancellationToken) -> Self {
        let guard = token.clone().drop_guard();
        Self {
            rx,
            token,
            _guard: guard,
        }
    }

    /// Receives the next item.
    ///
    /// Returns `None` once the subscription is cancelled or the producer is
    /// gone. A producer that vanishes without sealing a terminal item is
    /// treated as completed.
    pub async fn recv(&mut self) -> Option<Item<T>> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            item = self.rx.recv() => item,
            _ = self.token.cancelled() => None,
        }
    }

    /// Receives the next plain value, skipping nothing.
    ///
    /// Returns `None` on completion, failure, or cancellation. Useful for
    /// consumers that only care about values.
    pub async fn next_value(&mut self) -> Option<T> {
        match self.recv().await {
            Some(Item::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Drains the subscription to its terminal state.
    ///
    /// Collects every value until `Done` (or producer disappearance), or
    /// returns the first `Failed` as [`FlowError::Producer`]. Returns
    /// [`FlowError::Canceled`] if the subscription was cancelled mid-drain.
    pub async fn collect(mut self) -> Result<Vec<T>, FlowError> {
        let mut values = Vec::new();
        loop {
            match self.recv().await {
                Some(Item::Value(v)) => values.push(v),
                Some(Item::Failed(err)) => return Err(FlowError::Producer(err)),
                Some(Item::Done) => return Ok(values),
                None => {
                    if self.token.is_cancelled() {
                        return Err(FlowError::Canceled);
                    }
                    return Ok(values);
                }
            }
        }
    }

    /// Cancels the subscription.
    ///
    /// Stops further delivery and propagates upstream: the producer's outlet
    /// starts refusing sends and any inner work it guards is cancelled.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once [`cancel`](Subscription::cancel) was called (or the guard fired).
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token shared with the producer, for callers that need to link further
    /// cancellation scopes to this subscription.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
