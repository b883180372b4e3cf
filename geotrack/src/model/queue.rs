//! QueueItem data model, per spec §3.
//!
//! Grounded on the teacher's `executor::queue::PriorityQueue` FIFO
//! bookkeeping (sequence-number tie-breaking), here simplified to plain
//! FIFO-by-`created_at` ordering since the sync pipeline has no priority
//! concept, only ordering and retry eligibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable outbound payload awaiting dispatch by `SyncPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub type_tag: String,
}

impl QueueItem {
    pub fn new(payload: serde_json::Value, type_tag: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
            retry_count: 0,
            next_retry_at: None,
            idempotency_key: None,
            type_tag: type_tag.into(),
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Eligible for dispatch if there's no scheduled retry, or the retry
    /// time has passed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.next_retry_at {
            Some(at) => at <= now,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_item_is_eligible_immediately() {
        let item = QueueItem::new(serde_json::json!({}), "location");
        assert!(item.is_eligible(Utc::now()));
    }

    #[test]
    fn item_with_future_retry_is_not_eligible() {
        let mut item = QueueItem::new(serde_json::json!({}), "location");
        item.next_retry_at = Some(Utc::now() + chrono::Duration::seconds(60));
        assert!(!item.is_eligible(Utc::now()));
    }
}
