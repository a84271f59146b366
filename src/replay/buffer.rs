//! # ReplayBuffer: bounded replay over a single shared upstream run.
//!
//! ## Flow
//! ```text
//! first subscribe ──► start upstream worker ──► buffer last N values
//!                                               │
//! subscribe ────────► replay buffer ──► tap ◄───┘ fan out live values
//!                                               │
//! last tap drops ───► grace timer ──► still no taps ──► cancel upstream,
//!                                                        clear buffer
//! ```
//!
//! ## Rules
//! - The upstream producer runs **at most once** at a time, no matter how
//!   many taps exist.
//! - A subscriber arriving after the upstream terminated gets the buffered
//!   values and the terminal immediately, without restarting the producer.
//! - A subscriber arriving after a grace-window teardown starts a fresh
//!   upstream run with an empty buffer.
//! - A tap that cannot keep up loses values (logged), never blocks the
//!   worker or its sibling taps.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;
use crate::streams::{Item, Source, SourceRef, Subscription, DEFAULT_CAPACITY};

/// Settings for a [`ReplayBuffer`].
#[derive(Clone, Copy, Debug)]
pub struct ReplayConfig {
    capacity: usize,
    grace: Duration,
}

impl ReplayConfig {
    /// Creates a config replaying the last `capacity` values.
    ///
    /// Zero capacity is rejected: a replay buffer that replays nothing is a
    /// misconfiguration, not a degenerate mode.
    ///
    /// The teardown grace window defaults to 30 seconds.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            grace: Duration::from_secs(30),
        })
    }

    /// Sets how long the upstream run survives after the last tap detaches.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Replay depth.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Teardown grace window.
    pub fn grace(&self) -> Duration {
        self.grace
    }
}

/// Multicasting wrapper that replays the last N upstream values.
///
/// ## Example
/// ```rust
/// use fanfold::{from_values, ReplayBuffer, ReplayConfig, Source};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let cfg = ReplayConfig::new(2).unwrap();
///     let shared = ReplayBuffer::new(from_values("digits", vec![1u32, 2, 3]), cfg);
///
///     assert_eq!(shared.subscribe().collect().await.unwrap(), vec![1, 2, 3]);
///     // Late subscriber: only the last two survive the buffer.
///     assert_eq!(shared.subscribe().collect().await.unwrap(), vec![2, 3]);
/// }
/// ```
pub struct ReplayBuffer<T> {
    name: String,
    upstream: SourceRef<T>,
    cfg: ReplayConfig,
    shared: Arc<Mutex<Shared<T>>>,
}

struct Shared<T> {
    buffer: VecDeque<T>,
    terminal: Option<Item<T>>,
    taps: Vec<Tap<T>>,
    next_id: u64,
    worker: Option<Run>,
    /// When the run last went tapless. The grace window is measured from
    /// here, so taps that churn mid-window keep pushing teardown out.
    last_detach: Option<Instant>,
}

/// Live upstream run. The id fences stale workers out of shared state after
/// a grace-window teardown raced with a fresh subscription.
struct Run {
    id: u64,
    stop: CancellationToken,
}

struct Tap<T> {
    id: u64,
    tx: mpsc::Sender<Item<T>>,
}

/// Mutex poisoning only matters if a holder panicked mid-update; every
/// critical section here is short and non-panicking, so recover the guard.
fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + Sync + 'static> ReplayBuffer<T> {
    /// Wraps `upstream` in a shared replay layer.
    pub fn new(upstream: SourceRef<T>, cfg: ReplayConfig) -> Self {
        Self {
            name: format!("replay({})", upstream.name()),
            upstream,
            cfg,
            shared: Arc::new(Mutex::new(Shared {
                buffer: VecDeque::new(),
                terminal: None,
                taps: Vec::new(),
                next_id: 0,
                worker: None,
                last_detach: None,
            })),
        }
    }

    /// Attaches a tap: replays buffered values, then delivers live ones.
    ///
    /// Starts the upstream run if none is live. Dropping or cancelling the
    /// returned subscription detaches the tap; when the last tap detaches,
    /// teardown is deferred by the configured grace window.
    pub fn subscribe(&self) -> Subscription<T> {
        // Tap queue holds a full replay burst plus live headroom.
        let (tx, rx) = mpsc::channel(self.cfg.capacity + DEFAULT_CAPACITY);
        let token = CancellationToken::new();

        let start: Option<(u64, CancellationToken)>;
        let tap_id: u64;
        {
            let mut shared = lock(&self.shared);

            for value in &shared.buffer {
                let _ = tx.try_send(Item::Value(value.clone()));
            }

            // Terminated upstream: seal the tap immediately, nothing live
            // will ever arrive.
            if let Some(terminal) = &shared.terminal {
                let _ = tx.try_send(terminal.clone());
                return Subscription::new(rx, token);
            }

            tap_id = shared.next_id;
            shared.next_id += 1;
            shared.taps.push(Tap { id: tap_id, tx });

            start = if shared.worker.is_none() {
                let run_id = shared.next_id;
                shared.next_id += 1;
                let stop = CancellationToken::new();
                shared.worker = Some(Run {
                    id: run_id,
                    stop: stop.clone(),
                });
                Some((run_id, stop))
            } else {
                None
            };
        }

        if let Some((run_id, stop)) = start {
            tracing::debug!(source = %self.name, run_id, "starting shared upstream run");
            tokio::spawn(replay_worker(
                Arc::clone(&self.upstream),
                Arc::clone(&self.shared),
                self.cfg.capacity,
                run_id,
                stop,
            ));
        }

        tokio::spawn(tap_watcher(
            token.clone(),
            Arc::clone(&self.shared),
            tap_id,
            self.cfg.grace,
        ));

        Subscription::new(rx, token)
    }
}

impl<T: Clone + Send + Sync + 'static> Source<T> for ReplayBuffer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) -> Subscription<T> {
        ReplayBuffer::subscribe(self)
    }
}

/// Single-writer loop owning the upstream subscription. Buffers values,
/// fans them out to taps, and parks the terminal for late subscribers.
async fn replay_worker<T: Clone + Send + Sync + 'static>(
    upstream: SourceRef<T>,
    shared: Arc<Mutex<Shared<T>>>,
    capacity: usize,
    run_id: u64,
    stop: CancellationToken,
) {
    let mut sub = upstream.subscribe();

    loop {
        tokio::select! {
            item = sub.recv() => {
                match item.unwrap_or(Item::Done) {
                    Item::Value(value) => {
                        let mut s = lock(&shared);
                        if !s.owned_by(run_id) {
                            return;
                        }
                        s.buffer.push_back(value.clone());
                        while s.buffer.len() > capacity {
                            s.buffer.pop_front();
                        }
                        s.taps.retain(|tap| match tap.tx.try_send(Item::Value(value.clone())) {
                            Ok(()) => true,
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::warn!(tap = tap.id, "slow tap; dropping value");
                                true
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => false,
                        });
                    }
                    terminal => {
                        let taps = {
                            let mut s = lock(&shared);
                            if !s.owned_by(run_id) {
                                return;
                            }
                            s.terminal = Some(terminal.clone());
                            s.worker = None;
                            std::mem::take(&mut s.taps)
                        };
                        for tap in taps {
                            let _ = tap.tx.try_send(terminal.clone());
                        }
                        return;
                    }
                }
            }
            // Grace-window teardown: the watcher already forgot this run,
            // dropping `sub` cancels the upstream producer.
            _ = stop.cancelled() => return,
        }
    }
}

impl<T> Shared<T> {
    fn owned_by(&self, run_id: u64) -> bool {
        self.worker.as_ref().is_some_and(|run| run.id == run_id)
    }
}

/// Detaches the tap when its subscription ends; when it was the last one,
/// waits out the grace window and stops the upstream run if nobody returned.
async fn tap_watcher<T>(
    token: CancellationToken,
    shared: Arc<Mutex<Shared<T>>>,
    tap_id: u64,
    grace: Duration,
) {
    token.cancelled().await;

    let last_tap = {
        let mut s = lock(&shared);
        s.taps.retain(|tap| tap.id != tap_id);
        let last = s.taps.is_empty() && s.worker.is_some();
        if last {
            s.last_detach = Some(Instant::now());
        }
        last
    };
    if !last_tap {
        return;
    }

    let mut wait = grace;
    let stop = loop {
        time::sleep(wait).await;

        let mut s = lock(&shared);
        if !s.taps.is_empty() || s.worker.is_none() {
            return;
        }
        // A tap may have attached and detached while we slept; measure the
        // window from the most recent detach and keep waiting if it has not
        // elapsed yet.
        let since = s.last_detach.map_or(grace, |at| at.elapsed());
        if since >= grace {
            // Forget the run and its buffer so the next subscriber starts
            // a fresh upstream producer.
            let run = s.worker.take();
            if run.is_some() {
                s.buffer.clear();
            }
            break run;
        }
        wait = grace - since;
    };
    if let Some(run) = stop {
        tracing::debug!(run_id = run.id, "no taps after grace window; stopping upstream run");
        run.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::streams::{Outlet, SourceFn};

    /// Upstream that counts its runs, emits `values`, then stays open until
    /// cancelled (never completes on its own).
    fn open_ended_upstream(
        runs: Arc<AtomicUsize>,
        values: Vec<u32>,
    ) -> SourceRef<u32> {
        SourceFn::arc("feed", move |outlet: Outlet<u32>| {
            runs.fetch_add(1, Ordering::SeqCst);
            let values = values.clone();
            async move {
                for value in values {
                    if !outlet.send(value).await {
                        return;
                    }
                }
                outlet.token().cancelled().await;
            }
        })
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_last_n_then_goes_live() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cfg = ReplayConfig::new(2).unwrap();
        let shared = ReplayBuffer::new(open_ended_upstream(Arc::clone(&runs), vec![1, 2, 3]), cfg);

        let mut first = shared.subscribe();
        for expected in [1, 2, 3] {
            assert_eq!(first.next_value().await, Some(expected));
        }

        // Capacity 2: the late tap sees only the last two values.
        let mut late = shared.subscribe();
        assert_eq!(late.next_value().await, Some(2));
        assert_eq!(late.next_value().await, Some(3));
    }

    #[tokio::test]
    async fn test_upstream_runs_once_for_many_subscribers() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cfg = ReplayConfig::new(4).unwrap();
        let shared = ReplayBuffer::new(open_ended_upstream(Arc::clone(&runs), vec![7]), cfg);

        let mut a = shared.subscribe();
        let mut b = shared.subscribe();
        assert_eq!(a.next_value().await, Some(7));
        assert_eq!(b.next_value().await, Some(7));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_is_replayed_to_late_subscribers() {
        let cfg = ReplayConfig::new(2).unwrap();
        let shared = ReplayBuffer::new(crate::streams::from_values("digits", vec![1u32, 2, 3]), cfg);

        assert_eq!(shared.subscribe().collect().await.unwrap(), vec![1, 2, 3]);
        // Upstream already done: buffered tail plus immediate completion.
        assert_eq!(shared.subscribe().collect().await.unwrap(), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_after_grace_restarts_upstream_on_resubscribe() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cfg = ReplayConfig::new(2)
            .unwrap()
            .with_grace(Duration::from_millis(100));
        let shared = ReplayBuffer::new(open_ended_upstream(Arc::clone(&runs), vec![1]), cfg);

        let mut first = shared.subscribe();
        assert_eq!(first.next_value().await, Some(1));
        drop(first);

        // Past the grace window: the run is torn down and the buffer cleared.
        time::sleep(Duration::from_millis(200)).await;

        let mut second = shared.subscribe();
        assert_eq!(second.next_value().await, Some(1));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tap_churn_does_not_shorten_grace_window() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cfg = ReplayConfig::new(2)
            .unwrap()
            .with_grace(Duration::from_millis(100));
        let shared = ReplayBuffer::new(open_ended_upstream(Arc::clone(&runs), vec![1]), cfg);

        // First tap detaches at t=0, arming a grace timer.
        let mut first = shared.subscribe();
        assert_eq!(first.next_value().await, Some(1));
        drop(first);

        // A second tap attaches and detaches mid-window; the grace window
        // now runs from t=80, not t=0.
        time::sleep(Duration::from_millis(30)).await;
        let mut second = shared.subscribe();
        assert_eq!(second.next_value().await, Some(1));
        time::sleep(Duration::from_millis(50)).await;
        drop(second);

        // t=150: inside the second window. The first tap's timer has fired
        // by now; it must not tear the run down.
        time::sleep(Duration::from_millis(70)).await;
        let mut third = shared.subscribe();
        assert_eq!(third.next_value().await, Some(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_within_grace_keeps_upstream_alive() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cfg = ReplayConfig::new(2)
            .unwrap()
            .with_grace(Duration::from_millis(100));
        let shared = ReplayBuffer::new(open_ended_upstream(Arc::clone(&runs), vec![1]), cfg);

        let mut first = shared.subscribe();
        assert_eq!(first.next_value().await, Some(1));
        drop(first);

        time::sleep(Duration::from_millis(50)).await;

        let mut second = shared.subscribe();
        assert_eq!(second.next_value().await, Some(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = ReplayConfig::new(0).unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
    }
}
