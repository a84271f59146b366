//! # Debounce pipeline configuration.

use std::time::Duration;

/// Settings for a [`SearchPipeline`](crate::SearchPipeline).
///
/// ## Field semantics
/// - `window`: quiet period a query must survive before a fetch is launched;
///   every new input while pending restarts it.
/// - `input_capacity`: bound of the query input queue (min 1; clamped at
///   pipeline start).
#[derive(Clone, Copy, Debug)]
pub struct DebounceConfig {
    /// Debounce window applied to incoming queries.
    pub window: Duration,

    /// Capacity of the query input channel.
    pub input_capacity: usize,
}

impl Default for DebounceConfig {
    /// Defaults:
    /// - `window = 300ms` (typical type-ahead quiet period)
    /// - `input_capacity = 32`
    fn default() -> Self {
        Self {
            window: Duration::from_millis(300),
            input_capacity: 32,
        }
    }
}
