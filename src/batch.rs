//! Concurrent dispatch of per-batch and per-item generative calls.
//!
//! The dispatcher owns concurrency and failure isolation, nothing else: it
//! performs no retries (the invocation layer does) and assigns no outputs
//! (stage handlers do). A failing batch keeps its members exactly as they
//! were and never disturbs sibling batches. Batches run with no ordering
//! guarantee between them; the returned vector is always in input order, and
//! the call does not resolve until every batch has finished or failed.

use anyhow::Result;
use futures::future::join_all;
use std::future::Future;

/// Split `items` into contiguous batches of `batch_size` (the last may be
/// short) and run `handler` on every batch concurrently.
///
/// The handler receives the batch index and an owned copy of the batch and
/// returns the transformed batch. On error — or a reply with the wrong
/// number of items — the original batch is carried through unchanged.
pub async fn run_batched<T, F, Fut>(items: Vec<T>, batch_size: usize, handler: F) -> Vec<T>
where
    T: Clone,
    F: Fn(usize, Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    if items.is_empty() {
        return items;
    }
    let batch_size = batch_size.max(1);
    let batches: Vec<Vec<T>> = items
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    let futures = batches.into_iter().enumerate().map(|(index, batch)| {
        let handler = &handler;
        async move {
            let fallback = batch.clone();
            match handler(index, batch).await {
                Ok(updated) if updated.len() == fallback.len() => updated,
                Ok(updated) => {
                    tracing::warn!(
                        batch = index,
                        expected = fallback.len(),
                        got = updated.len(),
                        "batch handler changed item count; keeping prior items"
                    );
                    fallback
                }
                Err(err) => {
                    tracing::warn!(batch = index, error = %err, "batch failed; keeping prior items");
                    fallback
                }
            }
        }
    });

    join_all(futures).await.into_iter().flatten().collect()
}

/// Run `handler` once per item, all items concurrently. A failing item
/// yields `None` in its slot rather than failing the stage.
pub async fn run_each<T, R, F, Fut>(items: Vec<T>, handler: F) -> Vec<Option<R>>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let futures = items.into_iter().enumerate().map(|(index, item)| {
        let handler = &handler;
        async move {
            match handler(index, item).await {
                Ok(result) => Some(result),
                Err(err) => {
                    tracing::warn!(item = index, error = %err, "item call failed; dropping item result");
                    None
                }
            }
        }
    });
    join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn failing_batch_leaves_siblings_applied() {
        let items: Vec<u32> = (0..10).collect();
        let result = run_batched(items, 3, |index, batch| async move {
            if index == 1 {
                return Err(anyhow!("injected failure"));
            }
            Ok(batch.into_iter().map(|n| n + 100).collect())
        })
        .await;
        // Batch 1 covers items 3..6; those keep their prior values.
        assert_eq!(result, vec![100, 101, 102, 3, 4, 5, 106, 107, 108, 109]);
    }

    #[tokio::test]
    async fn wrong_length_reply_is_discarded() {
        let items: Vec<u32> = vec![1, 2, 3];
        let result = run_batched(items, 10, |_, _| async move { Ok(vec![9]) }).await;
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn last_batch_may_be_short() {
        let items: Vec<u32> = (0..7).collect();
        let mut sizes = Vec::new();
        let result = run_batched(items, 3, |_, batch| async move { Ok(batch) }).await;
        assert_eq!(result.len(), 7);
        for chunk in result.chunks(3) {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn per_item_failures_become_none() {
        let items = vec!["a", "b", "c"];
        let results = run_each(items, |index, item| async move {
            if index == 1 {
                Err(anyhow!("bad item"))
            } else {
                Ok(item.to_uppercase())
            }
        })
        .await;
        assert_eq!(
            results,
            vec![Some("A".to_string()), None, Some("C".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_input_dispatches_nothing() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = AtomicUsize::new(0);
        let result = run_batched(Vec::<u32>::new(), 5, |_, batch| {
            calls.fetch_add(1, Ordering::Relaxed);
            async move { Ok(batch) }
        })
        .await;
        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
