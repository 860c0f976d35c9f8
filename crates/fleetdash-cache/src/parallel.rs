//! Bounded parallel execution that keeps submission order.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Drive every task to completion with at most `limit` unresolved at once.
///
/// A new task is admitted as soon as any in-flight one resolves, so a slow
/// task only holds its own slot. Results come back in submission order.
/// Tasks report their own failures through `T`; one failing never cancels the
/// others.
pub async fn run_bounded<I, F, T>(tasks: I, limit: usize) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    let indexed_tasks: Vec<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(idx, task)| async move { (idx, task.await) })
        .collect();
    let mut indexed: Vec<(usize, T)> = stream::iter(indexed_tasks)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, out)| out).collect()
}
