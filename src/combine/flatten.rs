//! # FlattenConcurrent: bounded-concurrency flatten over a stream of tasks.
//!
//! Admits inner tasks in arrival order, runs up to `limit` of them
//! concurrently (default: unbounded), and emits each settled result as soon
//! as it is available: **completion order**, not input order. With a limit
//! of 1 no reordering is possible and output degenerates to input order.
//!
//! ## Error policy
//! The propagation mode is an explicit configuration choice, never inferred:
//!
//! - [`ErrorMode::FailFast`] (default): the first inner error seals the
//!   output and cancels all in-flight work.
//! - [`ErrorMode::Isolate`]: a failed item is delivered as an `Err` marker
//!   and the rest keep going.
//!
//! A failure of the **outer** stream is terminal in both modes: without its
//! producer the flatten cannot make progress.
//!
//! ## Admission
//! ```text
//! input ──► pending (FIFO) ──► launch while in_flight < limit ──► JoinSet
//!                                                                    │
//!                                                  settled in completion order
//!                                                                    ▼
//!                                              Ok(v) ──► emit    Err(e) ──► per ErrorMode
//! ```

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::combine::Seal;
use crate::error::{ConfigError, ProducerError};
use crate::streams::{Item, Outlet, Subscription, DEFAULT_CAPACITY};
use crate::tasks::{next_launch_seq, TaskRef};

/// How inner-task failures propagate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// First inner error seals the output and cancels all in-flight work.
    #[default]
    FailFast,

    /// A failed item becomes an `Err` marker; siblings keep running.
    Isolate,
}

/// Validated flatten configuration.
#[derive(Clone, Copy, Debug)]
pub struct FlattenConfig {
    limit: Option<usize>,
    mode: ErrorMode,
}

impl Default for FlattenConfig {
    /// Unbounded concurrency, fail-fast errors.
    fn default() -> Self {
        Self {
            limit: None,
            mode: ErrorMode::FailFast,
        }
    }
}

impl FlattenConfig {
    /// No concurrency cap.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Caps in-flight inner tasks at `limit`.
    ///
    /// A limit of zero would admit no work and is rejected.
    pub fn with_limit(limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self {
            limit: Some(limit),
            mode: ErrorMode::FailFast,
        })
    }

    /// Sets the error propagation mode.
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Configured cap (`None` = unbounded).
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Configured error mode.
    pub fn mode(&self) -> ErrorMode {
        self.mode
    }
}

/// Bounded-concurrency flatten combinator.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use fanfold::{from_values, ErrorMode, FlattenConcurrent, FlattenConfig, Source, TaskFn, TaskRef};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let tasks: Vec<TaskRef<u32>> = (0u32..3)
///         .map(|n| {
///             TaskFn::arc(format!("job-{n}"), move |_ctx: CancellationToken| async move {
///                 Ok(n)
///             }) as TaskRef<u32>
///         })
///         .collect();
///     let input = from_values("jobs", tasks);
///
///     let flatten = FlattenConcurrent::new(FlattenConfig::unbounded().error_mode(ErrorMode::Isolate));
///     let mut results = flatten.apply(input.subscribe()).collect().await.unwrap();
///     results.sort_by_key(|r| *r.as_ref().unwrap());
///     assert_eq!(results.len(), 3);
/// }
/// ```
pub struct FlattenConcurrent {
    cfg: FlattenConfig,
}

impl FlattenConcurrent {
    /// Creates the combinator with a validated configuration.
    pub fn new(cfg: FlattenConfig) -> Self {
        Self { cfg }
    }

    /// Configuration in effect.
    pub fn config(&self) -> FlattenConfig {
        self.cfg
    }

    /// Flattens a stream of tasks into a stream of settled results.
    ///
    /// Successes arrive as `Ok(value)`. Under [`ErrorMode::Isolate`],
    /// per-item failures arrive as `Err(err)` markers; under
    /// [`ErrorMode::FailFast`] the first failure is the stream's terminal
    /// error instead. Cancelling the returned subscription cancels the input
    /// and every in-flight inner task within one tick.
    pub fn apply<T>(
        &self,
        input: Subscription<TaskRef<T>>,
    ) -> Subscription<Result<T, ProducerError>>
    where
        T: Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        let token = CancellationToken::new();
        let outlet = Outlet::new(tx, token.clone());
        tokio::spawn(flatten_worker(input, outlet, self.cfg));
        Subscription::new(rx, token)
    }
}

/// Single-writer loop: admission, settlement, and sealing all happen here,
/// one callback at a time in arrival order.
async fn flatten_worker<T>(
    mut input: Subscription<TaskRef<T>>,
    outlet: Outlet<Result<T, ProducerError>>,
    cfg: FlattenConfig,
) where
    T: Send + Sync + 'static,
{
    let cancel = outlet.token().clone();
    let inner_token = CancellationToken::new();
    let mut pending: VecDeque<TaskRef<T>> = VecDeque::new();
    let mut set: JoinSet<Result<T, ProducerError>> = JoinSet::new();
    let mut in_flight = 0usize;
    let mut input_open = true;

    let seal = loop {
        // Admission gate: launch in arrival order while slots are free.
        while cfg.limit.is_none_or(|limit| in_flight < limit) {
            let Some(task) = pending.pop_front() else { break };
            let seq = next_launch_seq();
            tracing::debug!(task = task.name(), seq, in_flight, "admitting inner task");
            let child = inner_token.child_token();
            set.spawn(async move { task.spawn(child).await });
            in_flight += 1;
        }

        if !input_open && in_flight == 0 && pending.is_empty() {
            break Seal::Complete;
        }

        tokio::select! {
            item = input.recv(), if input_open => match item {
                Some(Item::Value(task)) => pending.push_back(task),
                Some(Item::Done) | None => input_open = false,
                Some(Item::Failed(err)) => break Seal::Fail(err),
            },
            joined = set.join_next(), if in_flight > 0 => {
                in_flight -= 1;
                let settled = match joined {
                    Some(Ok(settled)) => settled,
                    Some(Err(join_err)) => Err(ProducerError::panicked(join_err)),
                    None => continue,
                };
                match settled {
                    Ok(value) => {
                        if !outlet.send(Ok(value)).await {
                            break Seal::Abandon;
                        }
                    }
                    Err(err) => match cfg.mode {
                        ErrorMode::FailFast => break Seal::Fail(err),
                        ErrorMode::Isolate => {
                            tracing::debug!(error = %err, "inner task failed; isolated");
                            if !outlet.send(Err(err)).await {
                                break Seal::Abandon;
                            }
                        }
                    },
                }
            },
            _ = cancel.cancelled() => break Seal::Abandon,
        }
    };

    // Cancel in-flight work and join it before sealing, so cancellation is
    // fully observed by every inner task.
    inner_token.cancel();
    while set.join_next().await.is_some() {}

    match seal {
        Seal::Complete => outlet.complete().await,
        Seal::Fail(err) => outlet.fail(err).await,
        Seal::Abandon => {}
    }
}
