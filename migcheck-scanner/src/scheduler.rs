use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// Called after every settled task with `(completed, total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Run `task` over `items` with at most `limit` futures in flight.
///
/// A task is only started once a slot frees up, and the returned vector is
/// in input order regardless of completion order. There is no way to stop a
/// run early: every item is settled before this returns. Tasks are expected
/// to fold their own failures into `R`.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    task: F,
    progress: Option<ProgressFn>,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();

    let mut in_flight = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = task(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(limit.max(1));

    let mut completed = 0;
    while let Some((index, result)) = in_flight.next().await {
        slots[index] = Some(result);
        completed += 1;
        if let Some(ref callback) = progress {
            callback(completed, total);
        }
    }

    slots.into_iter().flatten().collect()
}
