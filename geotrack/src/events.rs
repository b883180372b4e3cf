//! Event bus: a single broadcast stream of typed events, per spec §2 and §6.
//!
//! Grounded on the teacher's channel-based dispatch in
//! `executor::daemon::ExecutorDaemon` (mpsc there); this bus uses
//! `tokio::sync::broadcast` instead because spec §5 requires independent,
//! backpressure-free fan-out to multiple subscribers, which a single mpsc
//! consumer cannot provide. Slow subscribers drop the oldest buffered event
//! rather than blocking the core, exactly as `broadcast::Sender` already
//! behaves; we surface the drop count through `EventBus::subscribe`'s
//! returned `Receiver` via `RecvError::Lagged`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::ErrorReport;
use crate::model::{Activity, Location, TripSummary};

/// Every event name in spec §6's "Event stream" table, with typed payloads.
#[derive(Debug, Clone)]
pub enum Event {
    Location(Location),
    MotionChange { is_moving: bool },
    ActivityChange(Activity),
    Heartbeat(Location),
    Geofence { identifier: String, action: GeofenceAction },
    GeofencesChange { evicted_ids: Vec<String> },
    ProviderChange { enabled: bool },
    ConnectivityChange { online: bool },
    PowerSaveChange { enabled: bool },
    Schedule { in_window: bool },
    TripStart { trip_id: String },
    TripUpdate { trip_id: String, distance_m: f64 },
    TripEnd { summary: TripSummary },
    Dwell { subject: String },
    RouteDeviation { trip_id: String, distance_m: f64 },
    Http { status: Option<u16>, ok: bool },
    Error(ErrorReport),
    WorkflowAdvanced { workflow_id: String, step: usize },
    WorkflowTimeout { workflow_id: String },
    WorkflowComplete { workflow_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceAction {
    Enter,
    Exit,
}

/// An event plus its wall-clock emission time, per spec §6.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: Event,
    pub at: DateTime<Utc>,
}

/// Write-only from the core, read-only from subscribers (spec §5).
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, event: Event) {
        let envelope = Envelope {
            event,
            at: DateTime::<Utc>::from(SystemTime::now()),
        };
        // `send` errors only when there are no receivers; that's fine, the
        // core never blocks on subscriber presence.
        if self.sender.send(envelope).is_err() {
            tracing::debug!("event published with no active subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Subscribers should call this after a `RecvError::Lagged(n)` to keep
    /// the crate's dropped-event counter in sync with spec §5's
    /// "oldest-drop policy with a `dropped` counter" requirement.
    pub fn record_lag(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_subscribe_round_trips_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(Event::MotionChange { is_moving: true });
        let envelope = rx.recv().await.unwrap();
        assert!(matches!(envelope.event, Event::MotionChange { is_moving: true }));
    }

    #[tokio::test]
    async fn independent_subscribers_each_see_every_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(Event::ConnectivityChange { online: true });
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(Event::ConnectivityChange { online: false });
    }

    #[test]
    fn record_lag_accumulates_dropped_counter() {
        let bus = EventBus::new(4);
        bus.record_lag(3);
        bus.record_lag(2);
        assert_eq!(bus.dropped_count(), 5);
    }
}
