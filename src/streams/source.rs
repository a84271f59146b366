//! # Source trait and closure-backed implementation.
//!
//! A [`Source`] is subscribed to, not run: every [`Source::subscribe`] call
//! launches a **fresh** producer with its own channel and cancellation token.
//! This is the re-run semantics the fan-in combinators build on: two
//! subscribers of the same source each trigger the computation independently
//! (contrast with [`ReplayBuffer`](crate::ReplayBuffer), which multicasts one
//! upstream run).

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::streams::outlet::Outlet;
use crate::streams::subscription::Subscription;
use crate::streams::DEFAULT_CAPACITY;
use crate::tasks::TaskRef;

/// Shared source handle.
pub type SourceRef<T> = Arc<dyn Source<T>>;

/// # Multi-value asynchronous producer.
///
/// Implementors spawn a producer per subscription and hand it an
/// [`Outlet`]; the returned [`Subscription`] is an independent cursor with
/// its own lifecycle.
pub trait Source<T>: Send + Sync + 'static {
    /// Returns a stable, human-readable source name.
    fn name(&self) -> &str;

    /// Launches a fresh producer and returns its consumer end.
    fn subscribe(&self) -> Subscription<T>;
}

/// Function-backed source implementation.
///
/// Wraps a closure that *creates* a new producer future per subscription.
///
/// ## Example
/// ```rust
/// use fanfold::{Item, Outlet, Source, SourceFn};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let ticker = SourceFn::arc("ticker", |outlet: Outlet<u32>| async move {
///         for n in 0..3 {
///             if !outlet.send(n).await {
///                 return;
///             }
///         }
///         outlet.complete().await;
///     });
///
///     let mut sub = ticker.subscribe();
///     assert_eq!(sub.recv().await, Some(Item::Value(0)));
/// }
/// ```
#[derive(Debug)]
pub struct SourceFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> SourceFn<F> {
    /// Creates a new function-backed source.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the source and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut, T> Source<T> for SourceFn<F>
where
    F: Fn(Outlet<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        let token = CancellationToken::new();
        tokio::spawn((self.f)(Outlet::new(tx, token.clone())));
        Subscription::new(rx, token)
    }
}

/// Source that replays a fixed value sequence and completes.
///
/// Every subscriber gets the full sequence.
pub fn from_values<T>(name: impl Into<Cow<'static, str>>, values: Vec<T>) -> SourceRef<T>
where
    T: Clone + Send + Sync + 'static,
{
    SourceFn::arc(name, move |outlet: Outlet<T>| {
        let values = values.clone();
        async move {
            for value in values {
                if !outlet.send(value).await {
                    return;
                }
            }
            outlet.complete().await;
        }
    })
}

/// Adapts a single-settlement task into a one-value source.
///
/// Each subscription launches the task once; success becomes one value
/// followed by completion, failure becomes a failed terminal. This is the
/// bridge that makes [`LatestOf`](crate::LatestOf) over once-emitting sources
/// equivalent to [`AllOf`](crate::AllOf).
pub fn once<T>(task: TaskRef<T>) -> SourceRef<T>
where
    T: Send + Sync + 'static,
{
    Arc::new(TaskSource { task })
}

struct TaskSource<T> {
    task: TaskRef<T>,
}

impl<T> Source<T> for TaskSource<T>
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.task.name()
    }

    fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        let token = CancellationToken::new();
        let outlet = Outlet::new(tx, token.clone());
        let task = Arc::clone(&self.task);
        let child = token.child_token();
        tokio::spawn(async move {
            match task.spawn(child).await {
                Ok(value) => {
                    if outlet.send(value).await {
                        outlet.complete().await;
                    }
                }
                Err(err) => outlet.fail(err).await,
            }
        });
        Subscription::new(rx, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProducerError;
    use crate::streams::item::Item;
    use crate::tasks::TaskFn;

    #[tokio::test]
    async fn test_each_subscription_reruns_the_producer() {
        let src = from_values("digits", vec![1u32, 2]);
        let first = src.subscribe().collect().await.unwrap();
        let second = src.subscribe().collect().await.unwrap();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_once_emits_single_value_then_done() {
        let task: TaskRef<&'static str> =
            TaskFn::arc("hello", |_ctx: CancellationToken| async {
                Ok::<_, ProducerError>("hi")
            });
        let mut sub = once(task).subscribe();
        assert_eq!(sub.recv().await, Some(Item::Value("hi")));
        assert_eq!(sub.recv().await, Some(Item::Done));
    }

    #[tokio::test]
    async fn test_once_propagates_failure() {
        let task: TaskRef<u32> =
            TaskFn::arc("broken", |_ctx: CancellationToken| async {
                Err::<u32, _>(ProducerError::new("boom"))
            });
        let err = once(task).subscribe().collect().await.unwrap_err();
        assert_eq!(err.as_label(), "producer_failed");
    }
}
