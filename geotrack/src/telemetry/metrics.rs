//! Lock-free counters for engine lifecycle events.
//!
//! Grounded directly on `telemetry::metrics::PipelineMetrics`'s atomic-
//! counter pattern: one `AtomicU64` per countable event, a `snapshot()`
//! taking a point-in-time copy for display.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    locations_received: AtomicU64,
    locations_filtered: AtomicU64,
    geofence_transitions: AtomicU64,
    trips_completed: AtomicU64,
    sync_dispatched: AtomicU64,
    sync_failed: AtomicU64,
    errors_emitted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub locations_received: u64,
    pub locations_filtered: u64,
    pub geofence_transitions: u64,
    pub trips_completed: u64,
    pub sync_dispatched: u64,
    pub sync_failed: u64,
    pub errors_emitted: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location_received(&self) {
        self.locations_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn location_filtered(&self) {
        self.locations_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn geofence_transition(&self) {
        self.geofence_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trip_completed(&self) {
        self.trips_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_dispatched(&self) {
        self.sync_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_failed(&self) {
        self.sync_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_emitted(&self) {
        self.errors_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            locations_received: self.locations_received.load(Ordering::Relaxed),
            locations_filtered: self.locations_filtered.load(Ordering::Relaxed),
            geofence_transitions: self.geofence_transitions.load(Ordering::Relaxed),
            trips_completed: self.trips_completed.load(Ordering::Relaxed),
            sync_dispatched: self.sync_dispatched.load(Ordering::Relaxed),
            sync_failed: self.sync_failed.load(Ordering::Relaxed),
            errors_emitted: self.errors_emitted.load(Ordering::Relaxed),
        }
    }
}
