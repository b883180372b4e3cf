//! In-memory store implementations. Used by the CLI for quick starts and by
//! every engine's test suite; a disk-backed implementation can satisfy the
//! same trait without touching callers, matching the teacher's
//! memory/disk-provider split in `cache::providers`.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::model::{GeofenceSet, Location, QueueItem, TripState};

use super::{
    BoxFuture, GeofenceStore, LocationStore, LogRecord, LogStore, QueueStore, StoreError, TripStore,
};

/// Simple in-memory `LocationStore`, newest-appended-last, oldest-pruned-first.
#[derive(Default)]
pub struct MemoryLocationStore {
    records: Mutex<VecDeque<Location>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationStore for MemoryLocationStore {
    fn insert(&self, location: Location) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.records.lock().unwrap().push_back(location);
            Ok(())
        })
    }

    fn list(&self, limit: Option<usize>) -> BoxFuture<'_, Result<Vec<Location>, StoreError>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap();
            let iter = records.iter().cloned();
            Ok(match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            })
        })
    }

    fn delete(&self, id: uuid::Uuid) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|l| l.id != id);
            Ok(records.len() != before)
        })
    }

    fn truncate(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.records.lock().unwrap().clear();
            Ok(())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move { Ok(self.records.lock().unwrap().len() as u64) })
    }

    fn prune(&self, max_age_days: Option<u32>, max_records: Option<u64>) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            if let Some(days) = max_age_days {
                let cutoff = Utc::now() - chrono::Duration::days(days as i64);
                records.retain(|l| l.timestamp >= cutoff);
            }
            if let Some(max) = max_records {
                while records.len() as u64 > max {
                    records.pop_front();
                }
            }
            Ok((before - records.len()) as u64)
        })
    }
}

/// Simple in-memory `QueueStore`, FIFO by `created_at`.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<QueueItem>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueueStore {
    fn insert(&self, item: QueueItem) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.items.lock().unwrap().push(item);
            Ok(())
        })
    }

    fn list_eligible(&self, now: DateTime<Utc>, limit: usize) -> BoxFuture<'_, Result<Vec<QueueItem>, StoreError>> {
        Box::pin(async move {
            let mut items = self.items.lock().unwrap().clone();
            items.sort_by_key(|i| i.created_at);
            Ok(items
                .into_iter()
                .filter(|i| i.is_eligible(now))
                .take(limit)
                .collect())
        })
    }

    fn update(&self, item: QueueItem) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut items = self.items.lock().unwrap();
            match items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => {
                    *existing = item;
                    Ok(())
                }
                None => Err(StoreError::NotFound(item.id.to_string())),
            }
        })
    }

    fn delete(&self, id: uuid::Uuid) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut items = self.items.lock().unwrap();
            let before = items.len();
            items.retain(|i| i.id != id);
            Ok(items.len() != before)
        })
    }

    fn find_by_idempotency_key(&self, key: &str) -> BoxFuture<'_, Result<Option<QueueItem>, StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.idempotency_key.as_deref() == Some(key.as_str()))
                .cloned())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move { Ok(self.items.lock().unwrap().len() as u64) })
    }

    fn prune(&self, max_age_days: Option<u32>, max_records: Option<u64>) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut items = self.items.lock().unwrap();
            let before = items.len();
            if let Some(days) = max_age_days {
                let cutoff = Utc::now() - chrono::Duration::days(days as i64);
                items.retain(|i| i.created_at >= cutoff);
            }
            if let Some(max) = max_records {
                items.sort_by_key(|i| i.created_at);
                while items.len() as u64 > max {
                    items.remove(0);
                }
            }
            Ok((before - items.len()) as u64)
        })
    }
}

/// Simple in-memory `LogStore` with a monotonic id counter.
#[derive(Default)]
pub struct MemoryLogStore {
    records: Mutex<VecDeque<LogRecord>>,
    next_id: Mutex<u64>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, level: &str, message: &str, tag: Option<&str>) -> BoxFuture<'_, Result<(), StoreError>> {
        let level = level.to_string();
        let message = message.to_string();
        let tag = tag.map(|t| t.to_string());
        Box::pin(async move {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            self.records.lock().unwrap().push_back(LogRecord {
                id,
                timestamp: Utc::now(),
                level,
                message,
                tag,
            });
            Ok(())
        })
    }

    fn list(&self, limit: Option<usize>) -> BoxFuture<'_, Result<Vec<LogRecord>, StoreError>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap();
            let iter = records.iter().cloned();
            Ok(match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            })
        })
    }

    fn prune(&self, max_age_days: Option<u32>, max_records: Option<u64>) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            if let Some(days) = max_age_days {
                let cutoff = Utc::now() - chrono::Duration::days(days as i64);
                records.retain(|l| l.timestamp >= cutoff);
            }
            if let Some(max) = max_records {
                while records.len() as u64 > max {
                    records.pop_front();
                }
            }
            Ok((before - records.len()) as u64)
        })
    }
}

/// Single-blob in-memory `GeofenceStore`.
#[derive(Default)]
pub struct MemoryGeofenceStore {
    blob: Mutex<Option<GeofenceSet>>,
}

impl MemoryGeofenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeofenceStore for MemoryGeofenceStore {
    fn load(&self) -> BoxFuture<'_, Result<Option<GeofenceSet>, StoreError>> {
        Box::pin(async move { Ok(self.blob.lock().unwrap().clone()) })
    }

    fn save(&self, set: GeofenceSet) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            *self.blob.lock().unwrap() = Some(set);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            *self.blob.lock().unwrap() = None;
            Ok(())
        })
    }
}

/// Single-blob in-memory `TripStore`.
#[derive(Default)]
pub struct MemoryTripStore {
    blob: Mutex<Option<TripState>>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripStore for MemoryTripStore {
    fn load(&self) -> BoxFuture<'_, Result<Option<TripState>, StoreError>> {
        Box::pin(async move { Ok(self.blob.lock().unwrap().clone()) })
    }

    fn save(&self, state: TripState) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            *self.blob.lock().unwrap() = Some(state);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            *self.blob.lock().unwrap() = None;
            Ok(())
        })
    }
}
