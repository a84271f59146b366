//! Debounced-search pipeline.
//!
//! A reusable operator chain over user input events: debounce, suppress
//! repeats, cancel the previous fetch when a new query lands, and recover
//! locally from fetch failures (fail-soft). The pipeline never surfaces a
//! raw producer error on its output; failures become the configured
//! fallback value.

mod config;
mod search;

pub use config::DebounceConfig;
pub use search::{Fetch, QueryHandle, SearchPipeline};
