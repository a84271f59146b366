//! # fanfold
//!
//! **Fanfold** is a lightweight fan-out/fan-in combinator library for Rust.
//!
//! It provides primitives to launch groups of async producers, combine their
//! outputs, bound their concurrency, and cancel them cooperatively. The crate
//! is designed as a building block for request orchestration layers and
//! reactive pipelines.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    TaskRef   │   │   SourceRef  │   │   SourceRef  │
//!     │ (one result) │   │ (many values)│   │ (many values)│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Combinators (one single-writer worker loop each)                 │
//! │  - AllOf            (join-all: input-ordered vector or 1st error) │
//! │  - LatestOf         (join-latest: snapshot on every update)       │
//! │  - FlattenConcurrent(bounded flatten, completion-order output)    │
//! │  - SearchPipeline   (debounce, dedupe, cancel-previous, fail-soft)│
//! │  - ReplayBuffer     (single shared run, last-N replay)            │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                    Outlet ──► bounded mpsc ──► Subscription
//!                      ▲                              │
//!                      └── CancellationToken ◄────────┘
//!                          (drop/cancel propagates upstream
//!                           within one scheduling tick)
//! ```
//!
//! ### Settlement
//! ```text
//! Subscription::recv() delivers, in order:
//!
//!   Item::Value(v) ... Item::Value(v)   zero or more values
//!   then exactly one of:
//!     ├─ Item::Done           producer completed
//!     └─ Item::Failed(err)    producer failed (first error wins)
//!
//! Cancellation is a consumer-side verdict, never an upstream item:
//!   sub.cancel() / drop(sub)
//!     ├─ producer's Outlet::send returns false at its next await point
//!     ├─ combinator workers cancel their inner tokens and join children
//!     └─ collect() reports FlowError::Canceled
//! ```
//!
//! ## Features
//! | Area             | Description                                                        | Key types / traits                         |
//! |------------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Tasks**        | Single-settlement async producers, cancellable via token.          | [`Task`], [`TaskFn`], [`TaskRef`]           |
//! | **Streams**      | Multi-value producers with sealed terminals.                       | [`Source`], [`Outlet`], [`Subscription`]    |
//! | **Join-all**     | Run a fixed set of tasks; all results or the first error.          | [`AllOf`]                                   |
//! | **Join-latest**  | Combine latest values of many streams into snapshots.              | [`LatestOf`]                                |
//! | **Flatten**      | Bounded-concurrency flatten with an explicit error policy.         | [`FlattenConcurrent`], [`ErrorMode`]        |
//! | **Pipelines**    | Debounced, deduplicated, cancel-previous query pipeline.           | [`SearchPipeline`], [`Fetch`]               |
//! | **Replay**       | Multicast one upstream run with last-N replay and grace teardown.  | [`ReplayBuffer`], [`ReplayConfig`]          |
//! | **Errors**       | Typed errors for producers, runs, and configuration.               | [`ProducerError`], [`FlowError`], [`ConfigError`] |
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use fanfold::{AllOf, TaskFn, TaskRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Three concurrent fetches; results come back in input order.
//!     let fetches: Vec<TaskRef<String>> = ["users", "orders", "prices"]
//!         .into_iter()
//!         .map(|endpoint| {
//!             TaskFn::arc(endpoint, move |_ctx: CancellationToken| async move {
//!                 Ok(format!("{endpoint}: ok"))
//!             }) as TaskRef<String>
//!         })
//!         .collect();
//!
//!     let results = AllOf::new(fetches).run(CancellationToken::new()).await?;
//!     assert_eq!(results[0], "users: ok");
//!     assert_eq!(results[2], "prices: ok");
//!     Ok(())
//! }
//! ```
mod combine;
mod error;
mod pipeline;
mod replay;
mod streams;
mod tasks;

// ---- Public re-exports ----

pub use combine::{AllOf, ErrorMode, FlattenConcurrent, FlattenConfig, LatestOf};
pub use error::{ConfigError, FlowError, ProducerError};
pub use pipeline::{DebounceConfig, Fetch, QueryHandle, SearchPipeline};
pub use replay::{ReplayBuffer, ReplayConfig};
pub use streams::{channel, from_values, once, Item, Outlet, Source, SourceFn, SourceRef, Subscription};
pub use tasks::{next_launch_seq, BoxTaskFuture, Task, TaskFn, TaskRef};
