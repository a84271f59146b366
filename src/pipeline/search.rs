//! # SearchPipeline: debounce → dedupe → cancel-previous fetch chain.
//!
//! State machine over input events:
//! ```text
//! Idle ──input──► Pending(query, timer) ──timer──► Fetching(query) ──settled──► Idle
//!                     │        ▲                        │
//!                     │  new input resets timer         │ new input cancels the
//!                     └────────┘                        └─ in-flight fetch ──► Pending
//! ```
//!
//! ## Rules
//! - An input equal to the **last fired** query is suppressed before the
//!   timer starts; it neither resets a pending timer nor cancels a fetch.
//! - A query whose trimmed value is empty short-circuits to the fallback
//!   value without invoking the fetcher.
//! - Fetch failures are recovered locally (fail-soft): the output carries the
//!   fallback value, never a raw producer error.
//! - When the input closes, a pending query is flushed immediately and an
//!   in-flight fetch is awaited; then the output completes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ProducerError;
use crate::pipeline::config::DebounceConfig;
use crate::streams::{Outlet, Subscription, DEFAULT_CAPACITY};
use crate::tasks::next_launch_seq;

/// # Query resolver plugged into the pipeline.
///
/// The pipeline is agnostic to how results are produced: an HTTP client, a
/// database, an index. Implementations should observe `ctx` and return
/// promptly once cancelled; the pipeline cancels a fetch the moment a newer
/// query supersedes it.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    /// Result type delivered on the pipeline output.
    type Out: Clone + Send + Sync + 'static;

    /// Resolves one query.
    async fn fetch(&self, query: &str, ctx: CancellationToken) -> Result<Self::Out, ProducerError>;
}

/// Input side of a running pipeline.
///
/// Cheap to clone; dropping every handle closes the input, which flushes any
/// pending query and then completes the output.
#[derive(Clone)]
pub struct QueryHandle {
    tx: mpsc::Sender<String>,
}

impl QueryHandle {
    /// Submits a query, waiting for queue space if necessary.
    ///
    /// Returns `false` once the pipeline is gone.
    pub async fn submit(&self, query: impl Into<String>) -> bool {
        self.tx.send(query.into()).await.is_ok()
    }

    /// Non-blocking submit; drops the query when the queue is full.
    pub fn try_submit(&self, query: impl Into<String>) -> bool {
        self.tx.try_send(query.into()).is_ok()
    }
}

/// Debounced, deduplicated, cancel-previous search pipeline.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use fanfold::{DebounceConfig, Fetch, ProducerError, SearchPipeline};
///
/// struct Upcase;
///
/// #[async_trait]
/// impl Fetch for Upcase {
///     type Out = String;
///     async fn fetch(&self, query: &str, _ctx: CancellationToken) -> Result<String, ProducerError> {
///         Ok(query.to_uppercase())
///     }
/// }
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let pipeline = SearchPipeline::new(Arc::new(Upcase), String::new(), DebounceConfig::default());
///     let (input, mut results) = pipeline.start();
///
///     input.submit("rust").await;
///     assert_eq!(results.next_value().await.as_deref(), Some("RUST"));
/// }
/// ```
pub struct SearchPipeline<F: Fetch> {
    fetcher: Arc<F>,
    fallback: F::Out,
    cfg: DebounceConfig,
}

impl<F: Fetch> SearchPipeline<F> {
    /// Creates a pipeline definition.
    ///
    /// `fallback` is what the output carries for empty queries and failed
    /// fetches.
    pub fn new(fetcher: Arc<F>, fallback: F::Out, cfg: DebounceConfig) -> Self {
        Self {
            fetcher,
            fallback,
            cfg,
        }
    }

    /// Starts an independent pipeline run.
    ///
    /// Returns the query input handle and the result subscription. Cancelling
    /// the subscription stops the run and cancels any in-flight fetch.
    pub fn start(&self) -> (QueryHandle, Subscription<F::Out>) {
        let (query_tx, query_rx) = mpsc::channel(self.cfg.input_capacity.max(1));
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_CAPACITY);
        let token = CancellationToken::new();
        let outlet = Outlet::new(out_tx, token.clone());

        tokio::spawn(search_worker(
            Arc::clone(&self.fetcher),
            self.fallback.clone(),
            self.cfg,
            query_rx,
            outlet,
        ));

        (QueryHandle { tx: query_tx }, Subscription::new(out_rx, token))
    }
}

enum State<Out> {
    Idle,
    Pending {
        query: String,
        deadline: Instant,
    },
    Fetching {
        seq: u64,
        token: CancellationToken,
        handle: JoinHandle<Result<Out, ProducerError>>,
    },
}

enum Exit {
    Complete,
    Abandon,
}

/// Single-writer loop: input events, timer expiry, and fetch settlement are
/// processed one at a time in arrival order.
async fn search_worker<F: Fetch>(
    fetcher: Arc<F>,
    fallback: F::Out,
    cfg: DebounceConfig,
    mut queries: mpsc::Receiver<String>,
    outlet: Outlet<F::Out>,
) {
    let cancel = outlet.token().clone();
    let mut last_fired: Option<String> = None;
    let mut input_open = true;
    let mut state = State::Idle;

    let exit = loop {
        state = match state {
            State::Idle => {
                if !input_open {
                    break Exit::Complete;
                }
                tokio::select! {
                    msg = queries.recv() => match msg {
                        Some(query) if last_fired.as_deref() == Some(query.as_str()) => State::Idle,
                        Some(query) => State::Pending {
                            query,
                            deadline: Instant::now() + cfg.window,
                        },
                        None => {
                            input_open = false;
                            State::Idle
                        }
                    },
                    _ = cancel.cancelled() => break Exit::Abandon,
                }
            }

            State::Pending { query, deadline } => {
                tokio::select! {
                    _ = time::sleep_until(deadline) => {
                        match fire(query, &fetcher, &fallback, &outlet, &cancel, &mut last_fired).await {
                            Some(next) => next,
                            None => break Exit::Abandon,
                        }
                    }
                    msg = queries.recv(), if input_open => match msg {
                        // Suppressed repeats do not reset the pending timer.
                        Some(next) if last_fired.as_deref() == Some(next.as_str()) => {
                            State::Pending { query, deadline }
                        }
                        Some(next) => State::Pending {
                            query: next,
                            deadline: Instant::now() + cfg.window,
                        },
                        None => {
                            // Input closed: flush the pending query right away.
                            input_open = false;
                            match fire(query, &fetcher, &fallback, &outlet, &cancel, &mut last_fired).await {
                                Some(next) => next,
                                None => break Exit::Abandon,
                            }
                        }
                    },
                    _ = cancel.cancelled() => break Exit::Abandon,
                }
            }

            State::Fetching {
                seq,
                token,
                mut handle,
            } => {
                tokio::select! {
                    settled = &mut handle => {
                        let value = match settled {
                            Ok(Ok(out)) => out,
                            Ok(Err(err)) => {
                                tracing::warn!(seq, error = %err, "fetch failed; emitting fallback");
                                fallback.clone()
                            }
                            Err(join_err) => {
                                tracing::warn!(seq, error = %join_err, "fetch panicked; emitting fallback");
                                fallback.clone()
                            }
                        };
                        if !outlet.send(value).await {
                            break Exit::Abandon;
                        }
                        State::Idle
                    }
                    msg = queries.recv(), if input_open => match msg {
                        Some(next) if last_fired.as_deref() == Some(next.as_str()) => {
                            State::Fetching { seq, token, handle }
                        }
                        Some(next) => {
                            token.cancel();
                            tracing::debug!(seq, "fetch superseded by new query");
                            State::Pending {
                                query: next,
                                deadline: Instant::now() + cfg.window,
                            }
                        }
                        None => {
                            // Input closed: let the in-flight fetch settle.
                            input_open = false;
                            State::Fetching { seq, token, handle }
                        }
                    },
                    _ = cancel.cancelled() => {
                        token.cancel();
                        break Exit::Abandon;
                    }
                }
            }
        };
    };

    match exit {
        Exit::Complete => outlet.complete().await,
        Exit::Abandon => {}
    }
}

/// Fires the debounced query: emits the fallback for empty input, otherwise
/// launches the fetch. Returns `None` when the consumer is gone.
async fn fire<F: Fetch>(
    query: String,
    fetcher: &Arc<F>,
    fallback: &F::Out,
    outlet: &Outlet<F::Out>,
    cancel: &CancellationToken,
    last_fired: &mut Option<String>,
) -> Option<State<F::Out>> {
    *last_fired = Some(query.clone());

    if query.trim().is_empty() {
        if !outlet.send(fallback.clone()).await {
            return None;
        }
        return Some(State::Idle);
    }

    let token = cancel.child_token();
    let seq = next_launch_seq();
    tracing::debug!(seq, query = %query, "launching fetch");

    let fetcher = Arc::clone(fetcher);
    let fetch_token = token.clone();
    let handle = tokio::spawn(async move { fetcher.fetch(&query, fetch_token).await });

    Some(State::Fetching { seq, token, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetcher {
        calls: AtomicUsize,
        canceled: AtomicUsize,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                canceled: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn canceled(&self) -> usize {
            self.canceled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for CountingFetcher {
        type Out = Vec<String>;

        async fn fetch(
            &self,
            query: &str,
            ctx: CancellationToken,
        ) -> Result<Vec<String>, ProducerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "err" {
                return Err("backend down".into());
            }
            tokio::select! {
                _ = time::sleep(self.delay) => Ok(vec![format!("{query}-hit")]),
                _ = ctx.cancelled() => {
                    self.canceled.fetch_add(1, Ordering::SeqCst);
                    Err("canceled".into())
                }
            }
        }
    }

    fn pipeline(
        fetcher: &Arc<CountingFetcher>,
    ) -> (QueryHandle, Subscription<Vec<String>>) {
        SearchPipeline::new(Arc::clone(fetcher), Vec::new(), DebounceConfig::default()).start()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_inputs_trigger_exactly_one_fetch() {
        let fetcher = CountingFetcher::new(Duration::from_millis(50));
        let (input, mut out) = pipeline(&fetcher);

        for query in ["a", "ab", "abc"] {
            input.submit(query).await;
            time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(out.next_value().await, Some(vec!["abc-hit".to_string()]));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_of_last_fired_query_is_suppressed() {
        let fetcher = CountingFetcher::new(Duration::from_millis(50));
        let (input, mut out) = pipeline(&fetcher);

        input.submit("abc").await;
        assert_eq!(out.next_value().await, Some(vec!["abc-hit".to_string()]));

        input.submit("abc").await;
        let again = time::timeout(Duration::from_secs(1), out.next_value()).await;
        assert!(again.is_err(), "suppressed repeat must not emit");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_recovers_with_fallback() {
        let fetcher = CountingFetcher::new(Duration::from_millis(50));
        let (input, mut out) = pipeline(&fetcher);

        input.submit("err").await;
        assert_eq!(out.next_value().await, Some(Vec::new()));

        // The pipeline keeps going after a failure.
        input.submit("ok").await;
        assert_eq!(out.next_value().await, Some(vec!["ok-hit".to_string()]));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_query_cancels_in_flight_fetch() {
        let fetcher = CountingFetcher::new(Duration::from_millis(500));
        let (input, mut out) = pipeline(&fetcher);

        input.submit("slow").await;
        // Let the debounce fire and the slow fetch start.
        time::sleep(Duration::from_millis(350)).await;
        input.submit("fast").await;

        assert_eq!(out.next_value().await, Some(vec!["fast-hit".to_string()]));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.canceled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_query_short_circuits_to_fallback() {
        let fetcher = CountingFetcher::new(Duration::from_millis(50));
        let (input, mut out) = pipeline(&fetcher);

        input.submit("   ").await;
        assert_eq!(out.next_value().await, Some(Vec::new()));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_close_flushes_pending_query_then_completes() {
        let fetcher = CountingFetcher::new(Duration::from_millis(50));
        let (input, out) = pipeline(&fetcher);

        input.submit("q").await;
        drop(input);

        let values = out.collect().await.unwrap();
        assert_eq!(values, vec![vec!["q-hit".to_string()]]);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelling_output_cancels_in_flight_fetch() {
        let fetcher = CountingFetcher::new(Duration::from_millis(500));
        let (input, out) = pipeline(&fetcher);

        input.submit("slow").await;
        time::sleep(Duration::from_millis(350)).await;
        out.cancel();
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fetcher.canceled(), 1);
    }
}
