//! Application bootstrap and the async driver loop, per spec §4.1 and §5.
//!
//! `TrackingCoordinator` is deliberately synchronous at its core (see
//! `coordinator` module docs); this module owns the two things a sync core
//! cannot: ordered service startup (grounded on `app::bootstrap::XEarthLayerApp`,
//! which starts cache services before anything that depends on them) and the
//! `tokio::select!`-driven polling loop that keeps timers moving (grounded on
//! `executor::daemon::ExecutorDaemon::run`'s cancellation-aware select loop).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::coordinator::TrackingCoordinator;
use crate::events::EventBus;
use crate::scheduler::in_scheduled_window;
use crate::store::{
    GeofenceStore, LocationStore, LogStore, MemoryGeofenceStore, MemoryLocationStore, MemoryLogStore,
    MemoryTripStore, TripStore,
};
use crate::sync::{ReqwestTransport, SyncConfig, SyncPipeline, SyncPolicy, SyncQueue, Transport};
use crate::telemetry::EngineMetrics;

/// How often the driver loop re-checks motion timers and geofence workflow
/// deadlines. Independent of `heartbeat_interval_s`, which is configurable.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How often the driver loop re-persists in-progress trip state, throttling
/// writes the way `TripEngine::should_persist` expects.
const TRIP_PERSIST_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("engine error: {0}")]
    Engine(#[from] crate::error::GeoError),
}

/// Everything the service runner needs after startup: the coordinator to
/// push fixes into, the event bus to observe, and the cancellation token to
/// signal shutdown.
pub struct Engine {
    pub coordinator: Arc<TrackingCoordinator>,
    pub events: Arc<EventBus>,
    pub metrics: Arc<EngineMetrics>,
    pub log_store: Arc<dyn LogStore>,
    config: Config,
    shutdown: CancellationToken,
}

impl Engine {
    /// Wires up storage, sync, and the coordinator in dependency order:
    /// stores first (nothing else can run without them), then the optional
    /// sync pipeline (depends on a queue store), then the coordinator itself
    /// (depends on both). Replays any persisted geofence set and trip state
    /// before returning, per spec §6 "Persisted state" bootstrap.
    pub async fn start(config: Config) -> Result<Self, BootstrapError> {
        config.validate()?;

        let events = Arc::new(EventBus::new(256));
        let metrics = Arc::new(EngineMetrics::new());
        let location_store: Arc<dyn LocationStore> = Arc::new(MemoryLocationStore::new());
        let geofence_store: Arc<dyn GeofenceStore> = Arc::new(MemoryGeofenceStore::new());
        let trip_store: Arc<dyn TripStore> = Arc::new(MemoryTripStore::new());
        let log_store: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());

        let sync = build_sync_pipeline(&config, Arc::clone(&events));

        let coordinator = Arc::new(TrackingCoordinator::new(
            config.clone(),
            Arc::clone(&events),
            location_store,
            geofence_store,
            trip_store,
            sync,
            Arc::clone(&metrics),
        ));
        coordinator.ready(config.clone())?;

        if let Err(err) = coordinator.restore_state().await {
            warn!(%err, "failed to restore persisted geofence/trip state");
        }
        let _ = log_store.append("info", "engine bootstrapped", None).await;

        info!(auto_sync = config.auto_sync, batch_sync = config.batch_sync, "engine bootstrapped");

        Ok(Self {
            coordinator,
            events,
            metrics,
            log_store,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Drives timers until cancelled: heartbeat fixes, motion-timer
    /// commitment, geofence workflow timeouts, and the `start_on_boot`
    /// schedule gate. `biased` ordering (per `ExecutorDaemon::run`) means
    /// shutdown always wins a simultaneous wakeup over another tick.
    pub async fn run(&self) {
        if self.config.start_on_boot {
            if let Err(err) = self.coordinator.start() {
                warn!(%err, "failed to auto-start tracking on boot");
            }
        }

        let mut tick = interval(TICK_INTERVAL);
        let mut heartbeat = interval(Duration::from_secs(self.config.heartbeat_interval_s.max(1)));

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("shutdown requested, stopping engine");
                    self.coordinator.stop();
                    let _ = self.log_store.append("info", "shutdown requested, engine stopped", None).await;
                    break;
                }

                _ = tick.tick() => {
                    self.on_tick().await;
                }

                _ = heartbeat.tick() => {
                    if self.coordinator.is_enabled() {
                        self.coordinator.heartbeat_fix();
                    }
                }
            }
        }
    }

    async fn on_tick(&self) {
        let now = Instant::now();
        self.coordinator.poll_motion_timer(now);
        self.coordinator.poll_geofence_workflows();

        if !self.config.schedule.is_empty() {
            let in_window = in_scheduled_window(&self.config.schedule, Local::now().time());
            if in_window && !self.coordinator.is_enabled() {
                if let Err(err) = self.coordinator.start() {
                    warn!(%err, "failed to start tracking inside scheduled window");
                }
            } else if !in_window && self.coordinator.is_enabled() {
                self.coordinator.stop();
            }
        }

        if let Err(err) = self.coordinator.persist_geofences().await {
            warn!(%err, "failed to persist geofence set");
        }
        if let Err(err) = self.coordinator.persist_trip_state(TRIP_PERSIST_INTERVAL).await {
            warn!(%err, "failed to persist trip state");
        }
    }
}

fn build_sync_pipeline(config: &Config, events: Arc<EventBus>) -> Option<Arc<SyncPipeline>> {
    let url = config.url.clone()?;
    if !config.auto_sync && !config.batch_sync {
        return None;
    }

    let sync_config = SyncConfig {
        url,
        headers: config.headers.clone(),
        idempotency_header: config.idempotency_header.clone(),
        policy: if config.batch_sync {
            SyncPolicy::Batch
        } else {
            SyncPolicy::Immediate
        },
        max_batch_size: config.max_batch_size,
        auto_sync_threshold: config.auto_sync_threshold,
        max_retry: config.max_retry,
        retry_delay: config.retry_delay(),
        retry_backoff: config.retry_backoff,
        max_retry_delay: config.max_retry_delay(),
        request_timeout: Duration::from_secs(30),
    };

    let queue_store = Arc::new(crate::store::MemoryQueueStore::new());
    let queue = SyncQueue::new(queue_store);
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(sync_config.request_timeout));

    Some(Arc::new(SyncPipeline::new(sync_config, queue, transport, events)))
}

/// Default on-disk location for the daemon's log directory, used by the CLI
/// entry point when none is given on the command line.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("geotrack")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_without_sync_url_leaves_pipeline_unconfigured() {
        let engine = Engine::start(Config::default()).await.unwrap();
        assert!(!engine.coordinator.is_enabled());
    }

    #[tokio::test]
    async fn start_with_auto_sync_builds_pipeline() {
        let config = Config {
            auto_sync: true,
            url: Some("https://example.com/ingest".to_string()),
            ..Config::default()
        };
        assert!(Engine::start(config).await.is_ok());
    }

    #[tokio::test]
    async fn on_tick_polls_workflows_and_persists_state() {
        let engine = Engine::start(Config::default()).await.unwrap();
        engine.coordinator.start().unwrap();
        engine.on_tick().await;
        assert!(engine.coordinator.persist_geofences().await.is_ok());
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let engine = Engine::start(Config::default()).await.unwrap();
        let shutdown = engine.shutdown_handle();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), engine.run())
            .await
            .expect("run should return promptly after cancellation");
    }
}
