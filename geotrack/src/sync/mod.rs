//! Sync pipeline: durable queueing and HTTP dispatch of location/trip/
//! geofence payloads, per spec §4.4.
//!
//! Grounded on `manager::download`'s split between transport
//! (`http::HttpDownloader`), ordering/state bookkeeping
//! (`download::state::DownloadState`), and pick of policy
//! (`download::strategy::DownloadStrategy`); and on `executor::daemon`'s
//! single dispatch-loop-over-a-queue shape, adapted from blocking
//! downloads driven by a thread pool to async uploads driven by
//! `tokio::select!`.

pub mod queue;
pub mod retry;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::events::{Event, EventBus};
use crate::model::QueueItem;
use crate::store::StoreError;

pub use queue::SyncQueue;
pub use transport::{DispatchOutcome, ReqwestTransport, Transport};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    #[error("no sync url configured")]
    NoUrl,
    #[error("sync paused after an unauthorized response")]
    Paused,
    #[error("queue storage error: {0}")]
    Store(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err.to_string())
    }
}

/// When to dispatch a freshly-enqueued item, per spec §4.4 "Sync policy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Dispatch immediately, one item per request.
    Immediate,
    /// Accumulate until `auto_sync_threshold` items are queued, then
    /// dispatch as a single batch.
    Batch,
    /// Never dispatch automatically; only `SyncPipeline::flush` drains it.
    Manual,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub idempotency_header: Option<String>,
    pub policy: SyncPolicy,
    pub max_batch_size: usize,
    pub auto_sync_threshold: usize,
    pub max_retry: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
    pub max_retry_delay: Duration,
    pub request_timeout: Duration,
}

/// Drives enqueued `QueueItem`s to the configured endpoint, honoring
/// backoff and the pause-on-401 posture from spec §4.4.
pub struct SyncPipeline {
    config: SyncConfig,
    queue: SyncQueue,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    paused: AtomicBool,
}

impl SyncPipeline {
    pub fn new(
        config: SyncConfig,
        queue: SyncQueue,
        transport: Arc<dyn Transport>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            queue,
            transport,
            events,
            paused: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Resume after a 401 pause, e.g. once the caller has refreshed
    /// credentials.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub async fn enqueue(&self, item: QueueItem) -> Result<QueueItem, SyncError> {
        Ok(self.queue.enqueue(item).await?)
    }

    /// Drain one dispatch-eligible batch, honoring pause state and the
    /// configured policy's batch size. Returns the number of items
    /// successfully accepted by the endpoint.
    pub async fn dispatch_once(&self) -> Result<u64, SyncError> {
        if self.paused.load(Ordering::Relaxed) {
            return Err(SyncError::Paused);
        }

        let batch_size = match self.config.policy {
            SyncPolicy::Immediate => 1,
            SyncPolicy::Batch | SyncPolicy::Manual => self.config.max_batch_size,
        };

        let batch = self.queue.next_batch(batch_size).await?;
        let mut accepted = 0;

        for item in batch {
            match self.dispatch_item(&item).await {
                DispatchResult::Accepted { status } => {
                    self.queue.remove(&item).await?;
                    accepted += 1;
                    self.events.publish(Event::Http { status: Some(status), ok: true });
                }
                DispatchResult::Rejected => {
                    // Malformed payload; drop it, it will never succeed.
                    self.queue.remove(&item).await?;
                    self.events.publish(Event::Http { status: None, ok: false });
                }
                DispatchResult::Unauthorized => {
                    self.paused.store(true, Ordering::Relaxed);
                    self.events.publish(Event::Http { status: Some(401), ok: false });
                    break;
                }
                DispatchResult::Retry { status } => {
                    if item.retry_count >= self.config.max_retry {
                        self.queue.remove(&item).await?;
                    } else {
                        let next = retry::next_retry_at(
                            chrono::Utc::now(),
                            item.retry_count,
                            self.config.retry_delay,
                            self.config.retry_backoff,
                            self.config.max_retry_delay,
                        );
                        self.queue.mark_retry(item, next).await?;
                    }
                    self.events.publish(Event::Http { status, ok: false });
                }
            }
        }

        Ok(accepted)
    }

    /// Drain the entire queue regardless of policy, used by the public
    /// `sync()` operation (spec §4.4 "Manual flush").
    pub async fn flush(&self) -> Result<u64, SyncError> {
        let mut total = 0;
        loop {
            let dispatched = self.dispatch_once().await?;
            if dispatched == 0 {
                break;
            }
            total += dispatched;
        }
        Ok(total)
    }

    async fn dispatch_item(&self, item: &QueueItem) -> DispatchResult {
        let key = item
            .idempotency_key
            .clone()
            .unwrap_or_else(|| item.id.to_string());

        let outcome = self
            .transport
            .send(
                &self.config.url,
                &self.config.headers,
                self.config.idempotency_header.as_deref(),
                &key,
                &item.payload,
            )
            .await;

        match outcome {
            DispatchOutcome::Accepted { status } => DispatchResult::Accepted { status },
            DispatchOutcome::Unauthorized { .. } => DispatchResult::Unauthorized,
            DispatchOutcome::Rejected { .. } => DispatchResult::Rejected,
            DispatchOutcome::Failed { status, .. } => DispatchResult::Retry { status },
            DispatchOutcome::Timeout => DispatchResult::Retry { status: None },
        }
    }
}

enum DispatchResult {
    Accepted { status: u16 },
    Rejected,
    Unauthorized,
    Retry { status: Option<u16> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use transport::fake::ScriptedTransport;

    fn make_pipeline(policy: SyncPolicy, outcomes: Vec<DispatchOutcome>) -> SyncPipeline {
        let config = SyncConfig {
            url: "https://example.com/ingest".to_string(),
            headers: HashMap::new(),
            idempotency_header: Some("Idempotency-Key".to_string()),
            policy,
            max_batch_size: 10,
            auto_sync_threshold: 5,
            max_retry: 3,
            retry_delay: Duration::from_millis(1),
            retry_backoff: 2.0,
            max_retry_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
        };
        let queue = SyncQueue::new(Arc::new(MemoryQueueStore::new()));
        let transport = Arc::new(ScriptedTransport::new(outcomes));
        let events = Arc::new(EventBus::new(16));
        SyncPipeline::new(config, queue, transport, events)
    }

    #[tokio::test]
    async fn accepted_item_is_removed_from_queue() {
        let pipeline = make_pipeline(SyncPolicy::Immediate, vec![DispatchOutcome::Accepted { status: 200 }]);
        pipeline
            .enqueue(QueueItem::new(serde_json::json!({"a": 1}), "location"))
            .await
            .unwrap();
        let accepted = pipeline.dispatch_once().await.unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(pipeline.queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unauthorized_response_pauses_pipeline() {
        let pipeline = make_pipeline(SyncPolicy::Immediate, vec![DispatchOutcome::Unauthorized { status: 401 }]);
        pipeline
            .enqueue(QueueItem::new(serde_json::json!({}), "location"))
            .await
            .unwrap();
        pipeline.dispatch_once().await.unwrap();
        assert!(pipeline.is_paused());

        let result = pipeline.dispatch_once().await;
        assert_eq!(result, Err(SyncError::Paused));

        pipeline.resume();
        assert!(!pipeline.is_paused());
    }

    #[tokio::test]
    async fn rejected_item_is_dropped_without_retry() {
        let pipeline = make_pipeline(SyncPolicy::Immediate, vec![DispatchOutcome::Rejected { status: 400 }]);
        pipeline
            .enqueue(QueueItem::new(serde_json::json!({}), "location"))
            .await
            .unwrap();
        pipeline.dispatch_once().await.unwrap();
        assert_eq!(pipeline.queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_item_is_rescheduled_for_retry() {
        let pipeline = make_pipeline(
            SyncPolicy::Immediate,
            vec![DispatchOutcome::Failed { status: Some(500), reason: "boom".into() }],
        );
        pipeline
            .enqueue(QueueItem::new(serde_json::json!({}), "location"))
            .await
            .unwrap();
        pipeline.dispatch_once().await.unwrap();
        assert_eq!(pipeline.queue.depth().await.unwrap(), 1);

        let batch_immediately = pipeline.queue.next_batch(10).await.unwrap();
        assert!(batch_immediately.is_empty(), "item should not be eligible before its retry time");
    }

    #[tokio::test]
    async fn item_is_dropped_after_exhausting_retries() {
        let pipeline = make_pipeline(
            SyncPolicy::Immediate,
            vec![DispatchOutcome::Failed { status: Some(500), reason: "boom".into() }],
        );
        let mut item = QueueItem::new(serde_json::json!({}), "location");
        item.retry_count = 3; // already at max_retry = 3: this failure is the 4th, drop it
        pipeline.enqueue(item).await.unwrap();
        pipeline.dispatch_once().await.unwrap();
        assert_eq!(pipeline.queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn item_below_max_retry_is_rescheduled_not_dropped() {
        let pipeline = make_pipeline(
            SyncPolicy::Immediate,
            vec![DispatchOutcome::Failed { status: Some(500), reason: "boom".into() }],
        );
        let mut item = QueueItem::new(serde_json::json!({}), "location");
        item.retry_count = 2; // below max_retry = 3: this failure is the 3rd, still retries
        pipeline.enqueue(item).await.unwrap();
        pipeline.dispatch_once().await.unwrap();
        assert_eq!(pipeline.queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conflict_with_idempotency_key_counts_as_accepted() {
        let pipeline = make_pipeline(SyncPolicy::Immediate, vec![DispatchOutcome::Accepted { status: 409 }]);
        pipeline
            .enqueue(QueueItem::new(serde_json::json!({}), "location"))
            .await
            .unwrap();
        let accepted = pipeline.dispatch_once().await.unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(pipeline.queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_policy_dispatches_up_to_max_batch_size() {
        let pipeline = make_pipeline(SyncPolicy::Batch, vec![DispatchOutcome::Accepted { status: 200 }]);
        for i in 0..4 {
            pipeline
                .enqueue(QueueItem::new(serde_json::json!({"i": i}), "location"))
                .await
                .unwrap();
        }
        let accepted = pipeline.dispatch_once().await.unwrap();
        assert_eq!(accepted, 4);
    }
}
