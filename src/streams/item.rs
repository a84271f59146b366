//! # Items delivered over a subscription.

use crate::error::ProducerError;

/// One delivery on a subscription: a value or a terminal state.
///
/// A well-formed subscription delivers zero or more `Value` items followed by
/// exactly one terminal item (`Done` or `Failed`). Nothing follows a
/// terminal item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item<T> {
    /// Next value in the sequence.
    Value(T),
    /// The producer completed; the sequence is over.
    Done,
    /// The producer failed; the sequence is over.
    Failed(ProducerError),
}

impl<T> Item<T> {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Item::Done | Item::Failed(_))
    }

    /// Returns the value, if this item carries one.
    pub fn into_value(self) -> Option<T> {
        match self {
            Item::Value(v) => Some(v),
            _ => None,
        }
    }
}
