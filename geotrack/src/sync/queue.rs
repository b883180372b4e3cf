//! Enqueue-side bookkeeping for the sync pipeline: idempotency dedup and
//! FIFO-eligible batch selection over a `QueueStore`.
//!
//! Grounded on `executor::queue::PriorityQueue`'s separation between the
//! queue's own ordering invariants and the daemon loop that drains it —
//! here the ordering is plain FIFO-by-`created_at` since payloads carry no
//! priority, only an optional idempotency key.

use std::sync::Arc;

use chrono::Utc;

use crate::model::QueueItem;
use crate::store::{QueueStore, StoreError};

/// Thin wrapper around `Arc<dyn QueueStore>` enforcing idempotency-key
/// dedup on enqueue (spec §4.4 "Idempotency").
pub struct SyncQueue {
    store: Arc<dyn QueueStore>,
}

impl SyncQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Insert `item` unless an item with the same idempotency key is
    /// already queued, in which case the existing item is returned instead.
    pub async fn enqueue(&self, item: QueueItem) -> Result<QueueItem, StoreError> {
        if let Some(key) = &item.idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                return Ok(existing);
            }
        }
        self.store.insert(item.clone()).await?;
        Ok(item)
    }

    pub async fn next_batch(&self, limit: usize) -> Result<Vec<QueueItem>, StoreError> {
        self.store.list_eligible(Utc::now(), limit).await
    }

    pub async fn mark_retry(&self, mut item: QueueItem, next_retry_at: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        item.retry_count += 1;
        item.next_retry_at = Some(next_retry_at);
        self.store.update(item).await
    }

    pub async fn remove(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.store.delete(item.id).await.map(|_| ())
    }

    pub async fn depth(&self) -> Result<u64, StoreError> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;

    fn item() -> QueueItem {
        QueueItem::new(serde_json::json!({"lat": 1.0}), "location")
    }

    #[tokio::test]
    async fn enqueue_dedups_on_idempotency_key() {
        let queue = SyncQueue::new(Arc::new(MemoryQueueStore::new()));
        let first = item().with_idempotency_key("abc");
        let second = item().with_idempotency_key("abc");

        let inserted_first = queue.enqueue(first.clone()).await.unwrap();
        let inserted_second = queue.enqueue(second).await.unwrap();

        assert_eq!(inserted_first.id, inserted_second.id);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn next_batch_respects_limit_and_eligibility() {
        let queue = SyncQueue::new(Arc::new(MemoryQueueStore::new()));
        for _ in 0..5 {
            queue.enqueue(item()).await.unwrap();
        }
        let batch = queue.next_batch(3).await.unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test]
    async fn mark_retry_delays_reappearance_in_batch() {
        let queue = SyncQueue::new(Arc::new(MemoryQueueStore::new()));
        let inserted = queue.enqueue(item()).await.unwrap();
        let future = Utc::now() + chrono::Duration::seconds(60);
        queue.mark_retry(inserted, future).await.unwrap();

        let batch = queue.next_batch(10).await.unwrap();
        assert!(batch.is_empty());
    }
}
