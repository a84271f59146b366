//! # LatestOf: join-latest over a collection of streams.
//!
//! Emits an index-aligned vector of the latest values every time any input
//! emits, starting once **every** input has emitted at least once. Completes
//! when all inputs complete; fails fast on the first input error, cancelling
//! the rest.
//!
//! ## Flow
//! ```text
//! LatestOf::new([s0, s1]).subscribe()
//!
//!   s0 ──► forwarder 0 ──┐
//!                        ├──► worker: latest[index] = value
//!   s1 ──► forwarder 1 ──┘        │
//!                                 ├─ all slots filled ──► emit snapshot on every update
//!                                 ├─ input completes before emitting ─► complete (never ready)
//!                                 ├─ all inputs complete ─► complete
//!                                 └─ first input error ──► fail, cancel the rest
//! ```
//!
//! ## Dynamic membership
//! [`LatestOf::gather`] consumes an outer stream of sources and combines once
//! the outer stream completes, since the final member count must be known
//! before anything can be emitted. An outer stream that never completes
//! therefore never combines; callers detect the boundary case by racing
//! `gather`
//! against a timeout.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::combine::Seal;
use crate::error::FlowError;
use crate::streams::{Item, Outlet, SourceRef, Subscription, DEFAULT_CAPACITY};

/// Join-latest combinator over a fixed collection of sources.
///
/// Equivalent to [`AllOf`](crate::AllOf) when every input emits exactly one
/// value and completes (see [`once`](crate::once)).
pub struct LatestOf<T> {
    sources: Vec<SourceRef<T>>,
}

impl<T> LatestOf<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates the combinator over an ordered collection of sources.
    pub fn new(sources: Vec<SourceRef<T>>) -> Self {
        Self { sources }
    }

    /// Collects a dynamically-sized membership from an outer stream, then
    /// returns the combinator once the outer stream completes.
    ///
    /// Fails fast if the outer stream errors. Never returns while the outer
    /// stream keeps producing; unbounded growth is unsupported by contract.
    pub async fn gather(mut outer: Subscription<SourceRef<T>>) -> Result<Self, FlowError> {
        let mut sources = Vec::new();
        loop {
            match outer.recv().await {
                Some(Item::Value(source)) => sources.push(source),
                Some(Item::Failed(err)) => return Err(FlowError::Producer(err)),
                Some(Item::Done) => break,
                None => {
                    if outer.is_canceled() {
                        return Err(FlowError::Canceled);
                    }
                    break;
                }
            }
        }
        Ok(Self::new(sources))
    }

    /// Number of member sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when there are no member sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Subscribes to the combined output.
    ///
    /// Every call re-subscribes every member source (independent run).
    /// An empty membership completes immediately without emitting.
    pub fn subscribe(&self) -> Subscription<Vec<T>> {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        let token = CancellationToken::new();
        let outlet = Outlet::new(tx, token.clone());
        let subs: Vec<Subscription<T>> = self.sources.iter().map(|s| s.subscribe()).collect();
        tokio::spawn(combine_worker(subs, outlet));
        Subscription::new(rx, token)
    }
}

/// Single-writer loop: inner deliveries are multiplexed onto one queue and
/// processed strictly in arrival order.
async fn combine_worker<T>(subs: Vec<Subscription<T>>, outlet: Outlet<Vec<T>>)
where
    T: Clone + Send + 'static,
{
    let n = subs.len();
    if n == 0 {
        outlet.complete().await;
        return;
    }

    let cancel = outlet.token().clone();
    let (agg_tx, mut agg_rx) = mpsc::channel::<(usize, Item<T>)>(DEFAULT_CAPACITY);

    // One forwarder per member; dropping a forwarder drops its subscription,
    // which cancels the member's producer within a tick.
    let mut forwarders = JoinSet::new();
    for (index, mut sub) in subs.into_iter().enumerate() {
        let agg = agg_tx.clone();
        let stop = cancel.child_token();
        forwarders.spawn(async move {
            loop {
                tokio::select! {
                    item = sub.recv() => {
                        let item = item.unwrap_or(Item::Done);
                        let terminal = item.is_terminal();
                        if agg.send((index, item)).await.is_err() || terminal {
                            break;
                        }
                    }
                    _ = stop.cancelled() => break,
                }
            }
        });
    }
    drop(agg_tx);

    let mut latest: Vec<Option<T>> = std::iter::repeat_with(|| None).take(n).collect();
    let mut ready = 0usize;
    let mut open = n;

    let seal = loop {
        let delivered = tokio::select! {
            delivered = agg_rx.recv() => delivered,
            _ = cancel.cancelled() => break Seal::Abandon,
        };
        let Some((index, item)) = delivered else {
            break Seal::Complete;
        };
        match item {
            Item::Value(value) => {
                if latest[index].is_none() {
                    ready += 1;
                }
                latest[index] = Some(value);
                if ready == n {
                    let snapshot: Vec<T> = latest.iter().filter_map(|slot| slot.clone()).collect();
                    if !outlet.send(snapshot).await {
                        break Seal::Abandon;
                    }
                }
            }
            Item::Done => {
                if latest[index].is_none() {
                    // This member can never contribute; the combination can
                    // never become ready.
                    break Seal::Complete;
                }
                open -= 1;
                if open == 0 {
                    break Seal::Complete;
                }
            }
            Item::Failed(err) => break Seal::Fail(err),
        }
    };

    // Dropping the forwarder set aborts forwarders; their subscriptions drop
    // and cancel every still-live member producer.
    drop(forwarders);

    match seal {
        Seal::Complete => outlet.complete().await,
        Seal::Fail(err) => outlet.fail(err).await,
        Seal::Abandon => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time;

    use crate::streams::{from_values, once, SourceFn};
    use crate::tasks::{TaskFn, TaskRef};

    /// Source emitting each `(delay_ms, value)` pair at its absolute virtual
    /// time, then completing.
    fn timed(name: &'static str, points: Vec<(u64, &'static str)>) -> SourceRef<&'static str> {
        SourceFn::arc(name, move |outlet: Outlet<&'static str>| {
            let points = points.clone();
            async move {
                let start = time::Instant::now();
                for (at_ms, value) in points {
                    time::sleep_until(start + Duration::from_millis(at_ms)).await;
                    if !outlet.send(value).await {
                        return;
                    }
                }
                outlet.complete().await;
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_once_all_have_emitted_then_on_every_update() {
        let a = timed("a", vec![(10, "a1")]);
        let b = timed("b", vec![(20, "b1"), (30, "b2")]);

        let combined = LatestOf::new(vec![a, b]).subscribe().collect().await.unwrap();
        assert_eq!(combined, vec![vec!["a1", "b1"], vec!["a1", "b2"]]);
    }

    #[tokio::test]
    async fn test_empty_membership_completes_without_emitting() {
        let combined = LatestOf::<u32>::new(Vec::new())
            .subscribe()
            .collect()
            .await
            .unwrap();
        assert!(combined.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_completing_before_emitting_completes_output() {
        let silent: SourceRef<&'static str> =
            SourceFn::arc("silent", |outlet: Outlet<&'static str>| async move {
                outlet.complete().await;
            });
        let chatty = timed("chatty", vec![(10, "x")]);

        let combined = LatestOf::new(vec![silent, chatty])
            .subscribe()
            .collect()
            .await
            .unwrap();
        assert!(combined.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_cancels_remaining_members() {
        let canceled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&canceled);
        let endless: SourceRef<u32> = SourceFn::arc("endless", move |outlet: Outlet<u32>| {
            let counter = Arc::clone(&counter);
            async move {
                let mut n = 0;
                loop {
                    time::sleep(Duration::from_millis(5)).await;
                    if !outlet.send(n).await {
                        counter.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    n += 1;
                }
            }
        });
        let broken: SourceRef<u32> = SourceFn::arc("broken", |outlet: Outlet<u32>| async move {
            time::sleep(Duration::from_millis(12)).await;
            outlet.fail("boom".into()).await;
        });

        let err = LatestOf::new(vec![endless, broken])
            .subscribe()
            .collect()
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "producer_failed");

        // The surviving member observes cancellation on its next send.
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(canceled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_emission_members_match_all_of() {
        let tasks: Vec<TaskRef<u32>> = (0..3u32)
            .map(|n| {
                TaskFn::arc(format!("one-{n}"), move |_ctx: CancellationToken| async move {
                    time::sleep(Duration::from_millis(u64::from(10 - n))).await;
                    Ok(n)
                }) as TaskRef<u32>
            })
            .collect();
        let members: Vec<SourceRef<u32>> = tasks.into_iter().map(once).collect();

        let combined = LatestOf::new(members).subscribe().collect().await.unwrap();
        assert_eq!(combined, vec![vec![0, 1, 2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_outer_stream_never_combines() {
        let outer: SourceRef<SourceRef<u32>> =
            SourceFn::arc("unbounded", |outlet: Outlet<SourceRef<u32>>| async move {
                loop {
                    time::sleep(Duration::from_millis(10)).await;
                    if !outlet.send(from_values("member", vec![1u32])).await {
                        return;
                    }
                }
            });

        let gathered = time::timeout(
            Duration::from_millis(500),
            LatestOf::gather(outer.subscribe()),
        )
        .await;
        assert!(gathered.is_err(), "gather must not settle on unbounded outer input");
    }

    #[tokio::test(start_paused = true)]
    async fn test_gather_combines_after_outer_completes() {
        let members: Vec<SourceRef<u32>> =
            vec![from_values("m0", vec![1u32]), from_values("m1", vec![2u32])];
        let outer = from_values("outer", members);

        let latest = LatestOf::gather(outer.subscribe()).await.unwrap();
        assert_eq!(latest.len(), 2);
        let combined = latest.subscribe().collect().await.unwrap();
        assert_eq!(combined.last(), Some(&vec![1, 2]));
    }
}
