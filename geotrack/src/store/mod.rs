//! LocationStore / QueueStore / LogStore: durable append/prune tables keyed
//! by id with ordered iteration, per spec §2 and §6. GeofenceStore / TripStore
//! are single-blob stores for the persisted geofence set and in-progress trip
//! state the same section names.
//!
//! Grounded directly on `cache::traits::Cache`'s dyn-compatible trait design:
//! `BoxFuture` return types so stores can be held as `Arc<dyn Trait>` behind
//! the storage worker, String keys, and a self-contained `gc`/prune method
//! per store instead of a shared external pruning daemon.

mod memory;

pub use memory::{MemoryGeofenceStore, MemoryLocationStore, MemoryLogStore, MemoryQueueStore, MemoryTripStore};

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{GeofenceSet, Location, QueueItem, TripState};

/// Boxed future type for dyn-compatible async store methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store is shutting down")]
    ShuttingDown,
    #[error("record not found: {0}")]
    NotFound(String),
}

/// A single pruned log line, per the persisted Logs table schema (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub tag: Option<String>,
}

/// Durable, ordered append/prune table for `Location` fixes.
pub trait LocationStore: Send + Sync {
    fn insert(&self, location: Location) -> BoxFuture<'_, Result<(), StoreError>>;
    fn list(&self, limit: Option<usize>) -> BoxFuture<'_, Result<Vec<Location>, StoreError>>;
    fn delete(&self, id: uuid::Uuid) -> BoxFuture<'_, Result<bool, StoreError>>;
    fn truncate(&self) -> BoxFuture<'_, Result<(), StoreError>>;
    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>>;
    fn prune(&self, max_age_days: Option<u32>, max_records: Option<u64>) -> BoxFuture<'_, Result<u64, StoreError>>;
}

/// Durable, ordered append/prune table for `QueueItem` sync payloads.
pub trait QueueStore: Send + Sync {
    fn insert(&self, item: QueueItem) -> BoxFuture<'_, Result<(), StoreError>>;
    fn list_eligible(&self, now: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<QueueItem>, StoreError>>;
    fn update(&self, item: QueueItem) -> BoxFuture<'_, Result<(), StoreError>>;
    fn delete(&self, id: uuid::Uuid) -> BoxFuture<'_, Result<bool, StoreError>>;
    fn find_by_idempotency_key(&self, key: &str) -> BoxFuture<'_, Result<Option<QueueItem>, StoreError>>;
    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>>;
    fn prune(&self, max_age_days: Option<u32>, max_records: Option<u64>) -> BoxFuture<'_, Result<u64, StoreError>>;
}

/// Durable, ordered append/prune table for structured log lines.
pub trait LogStore: Send + Sync {
    fn append(&self, level: &str, message: &str, tag: Option<&str>) -> BoxFuture<'_, Result<(), StoreError>>;
    fn list(&self, limit: Option<usize>) -> BoxFuture<'_, Result<Vec<LogRecord>, StoreError>>;
    fn prune(&self, max_age_days: Option<u32>, max_records: Option<u64>) -> BoxFuture<'_, Result<u64, StoreError>>;
}

/// Durable single-blob store for the persisted geofence set, per spec §6
/// "Persisted state".
pub trait GeofenceStore: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Option<GeofenceSet>, StoreError>>;
    fn save(&self, set: GeofenceSet) -> BoxFuture<'_, Result<(), StoreError>>;
    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Durable single-blob store for in-progress trip state, per spec §6
/// "Persisted state".
pub trait TripStore: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Option<TripState>, StoreError>>;
    fn save(&self, state: TripState) -> BoxFuture<'_, Result<(), StoreError>>;
    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}
