//! TrackingCoordinator: the central orchestrator, per spec §4.1.
//!
//! The motion/stop state machine is grounded on
//! `prefetch::adaptive::phase_detector::PhaseDetector`'s hysteresis pattern
//! (a candidate state must hold for a configured delay before it is
//! committed), generalized from flight-phase detection to the
//! Moving/Stationary/PendingStart/PendingStop table in spec §4.1. The
//! filter chain and engine fan-out are new orchestration code specific to
//! this domain; the synchronous core / async driver split mirrors
//! `executor::daemon::ExecutorDaemon`, whose actual `tokio::select!` loop
//! lives in this crate's `app` module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::adaptive::{AdaptiveController, AdaptivePolicy, Telemetry};
use crate::config::Config;
use crate::error::{ErrorKind, ErrorReport, GeoError};
use crate::error_recovery::{ErrorRecovery, RecoveryAction, RecoveryPolicy};
use crate::events::{Event, EventBus, GeofenceAction as EventGeofenceAction};
use crate::geo::haversine_distance_m;
use crate::geofence_engine::{GeofenceEngine, GeofenceTransition, WorkflowEvent, WorkflowStep};
use crate::model::{Activity, ActivityType, GeofenceSet, Location};
use crate::privacy_filter::{PrivacyFilter, PrivacyOutcome};
use crate::store::{GeofenceStore, LocationStore, TripStore};
use crate::sync::SyncPipeline;
use crate::telemetry::EngineMetrics;
use crate::trip_engine::{TripEngine, TripEvent};

/// Motion/stop state machine states, per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stationary,
    PendingStart,
    Moving,
    PendingStop,
}

/// Point-in-time snapshot returned by `get_state()`.
#[derive(Debug, Clone)]
pub struct CoordinatorSnapshot {
    pub enabled: bool,
    pub motion: MotionState,
    pub odometer_m: f64,
    pub last_location: Option<Location>,
    pub extras: HashMap<String, serde_json::Value>,
}

/// Options for a single-shot `get_current_position` call.
#[derive(Debug, Clone)]
pub struct PositionRequest {
    pub timeout: Duration,
    pub samples: usize,
    pub persist: bool,
}

impl Default for PositionRequest {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            samples: 1,
            persist: false,
        }
    }
}

struct Inner {
    config: Config,
    enabled: bool,
    motion: MotionState,
    pending_deadline: Option<Instant>,
    odometer_m: f64,
    last_accepted: Option<Location>,
    stationary_anchor: Option<Location>,
    extras: HashMap<String, serde_json::Value>,
}

/// The engine's central orchestrator. Owns no I/O itself — fixes are pushed
/// in by whatever acquisition driver the host binary wires up, and timers
/// are polled by the same caller (see `app::run_daemon`).
pub struct TrackingCoordinator {
    inner: Mutex<Inner>,
    geofence: Mutex<GeofenceEngine>,
    trip: Mutex<TripEngine>,
    privacy: Mutex<PrivacyFilter>,
    recovery: Mutex<ErrorRecovery>,
    adaptive: Mutex<AdaptiveController>,
    events: Arc<EventBus>,
    location_store: Arc<dyn LocationStore>,
    geofence_store: Arc<dyn GeofenceStore>,
    trip_store: Arc<dyn TripStore>,
    sync: Option<Arc<SyncPipeline>>,
    metrics: Arc<EngineMetrics>,
}

impl TrackingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        events: Arc<EventBus>,
        location_store: Arc<dyn LocationStore>,
        geofence_store: Arc<dyn GeofenceStore>,
        trip_store: Arc<dyn TripStore>,
        sync: Option<Arc<SyncPipeline>>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let geofence_capacity = config.max_monitored_geofences;
        let trip_config = crate::trip_engine::TripConfig::default();

        Self {
            inner: Mutex::new(Inner {
                config,
                enabled: false,
                motion: MotionState::Stationary,
                pending_deadline: None,
                odometer_m: 0.0,
                last_accepted: None,
                stationary_anchor: None,
                extras: HashMap::new(),
            }),
            geofence: Mutex::new(GeofenceEngine::new(geofence_capacity)),
            trip: Mutex::new(TripEngine::new(trip_config)),
            privacy: Mutex::new(PrivacyFilter::new()),
            recovery: Mutex::new(ErrorRecovery::new(RecoveryPolicy::default())),
            adaptive: Mutex::new(AdaptiveController::new(AdaptivePolicy::default())),
            events,
            location_store,
            geofence_store,
            trip_store,
            sync,
            metrics,
        }
    }

    /// Validate and install configuration; does not start acquisition.
    /// Idempotent.
    pub fn ready(&self, config: Config) -> Result<(), GeoError> {
        config.validate()?;
        let mut inner = self.inner.lock();
        inner.config = config;
        Ok(())
    }

    /// Merge a config patch and revalidate, per spec §4.1 `set_config`.
    pub fn set_config(&self, patch: serde_json::Value) -> Result<(), GeoError> {
        let merged = {
            let inner = self.inner.lock();
            inner.config.merge_patch(patch)?
        };
        let mut inner = self.inner.lock();
        inner.config = merged;
        Ok(())
    }

    /// Begin acquisition. Idempotent; the actual platform permission
    /// preconditions are the caller's responsibility — this records the
    /// engine as enabled and resets transient timers.
    pub fn start(&self) -> Result<(), GeoError> {
        let mut inner = self.inner.lock();
        inner.enabled = true;
        inner.pending_deadline = None;
        Ok(())
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.enabled = false;
        inner.pending_deadline = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Force a motion-state transition, overriding the detector until the
    /// next real activity update (spec §4.1 `change_pace`).
    pub fn change_pace(&self, is_moving: bool) {
        let mut inner = self.inner.lock();
        inner.motion = if is_moving {
            MotionState::Moving
        } else {
            MotionState::Stationary
        };
        inner.pending_deadline = None;
        inner.stationary_anchor = inner.last_accepted.clone();
        drop(inner);
        self.events.publish(Event::MotionChange { is_moving });
    }

    pub fn get_state(&self) -> CoordinatorSnapshot {
        let inner = self.inner.lock();
        CoordinatorSnapshot {
            enabled: inner.enabled,
            motion: inner.motion,
            odometer_m: inner.odometer_m,
            last_location: inner.last_accepted.clone(),
            extras: inner.extras.clone(),
        }
    }

    /// Feed an activity classification through the motion/stop state
    /// machine (spec §4.1 transition table). Returns `true` if a
    /// motionchange event was emitted.
    pub fn on_activity(&self, activity: Activity, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        let config = inner.config.clone();

        let moving_trigger = activity.confidence >= config.min_activity_confidence
            && config.trigger_activities.contains(&activity.kind);
        let is_still = activity.kind == ActivityType::Still;

        let mut emitted = None;

        match inner.motion {
            MotionState::Stationary if moving_trigger => {
                if config.motion_trigger_delay_ms > 0 {
                    inner.motion = MotionState::PendingStart;
                    inner.pending_deadline =
                        Some(now + Duration::from_millis(config.motion_trigger_delay_ms));
                } else {
                    inner.motion = MotionState::Moving;
                    inner.pending_deadline = None;
                    emitted = Some(true);
                }
            }
            MotionState::PendingStart if is_still => {
                inner.motion = MotionState::Stationary;
                inner.pending_deadline = None;
            }
            MotionState::Moving if is_still && !config.disable_stop_detection => {
                inner.motion = MotionState::PendingStop;
                inner.pending_deadline =
                    Some(now + Duration::from_secs(config.stop_timeout_min as u64 * 60));
            }
            MotionState::PendingStop if moving_trigger => {
                inner.motion = MotionState::Moving;
                inner.pending_deadline = None;
            }
            _ => {}
        }

        drop(inner);
        if let Some(is_moving) = emitted {
            self.events.publish(Event::ActivityChange(activity));
            self.events.publish(Event::MotionChange { is_moving });
            return true;
        }
        self.events.publish(Event::ActivityChange(activity));
        false
    }

    /// Advance pending motion timers; called periodically by the driver
    /// loop. Returns `true` if a motionchange event was emitted.
    pub fn poll_motion_timer(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        let Some(deadline) = inner.pending_deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }

        let transitioned = match inner.motion {
            MotionState::PendingStart => {
                inner.motion = MotionState::Moving;
                inner.pending_deadline = None;
                Some(true)
            }
            MotionState::PendingStop => {
                inner.motion = MotionState::Stationary;
                inner.pending_deadline = None;
                inner.stationary_anchor = inner.last_accepted.clone();
                Some(false)
            }
            _ => None,
        };

        drop(inner);
        if let Some(is_moving) = transitioned {
            self.events.publish(Event::MotionChange { is_moving });
            true
        } else {
            false
        }
    }

    /// Run a raw fix through the full filter chain (spec §4.1), then fan
    /// out to every downstream engine. Returns `true` if the fix was
    /// accepted (passed the chain).
    pub async fn ingest_fix(&self, raw: Location) -> bool {
        self.metrics.location_received();

        let Some(filtered) = self.apply_filter_chain(raw) else {
            self.metrics.location_filtered();
            return false;
        };

        self.update_odometer(&filtered);

        {
            let mut inner = self.inner.lock();
            inner.last_accepted = Some(filtered.clone());
        }

        let (transitions, workflow_events) = self.geofence.lock().evaluate(filtered.lat, filtered.lng);
        for transition in transitions {
            self.metrics.geofence_transition();
            let event = match transition {
                GeofenceTransition::Enter(id) => Event::Geofence { identifier: id, action: EventGeofenceAction::Enter },
                GeofenceTransition::Exit(id) => Event::Geofence { identifier: id, action: EventGeofenceAction::Exit },
                GeofenceTransition::Dwell(id) => Event::Dwell { subject: id },
            };
            self.events.publish(event);
        }
        for event in workflow_events {
            self.events.publish(workflow_event_to_bus_event(event));
        }

        let trip_events = self.trip.lock().update(filtered.clone());
        for event in trip_events {
            if matches!(event, TripEvent::Ended { .. }) {
                self.metrics.trip_completed();
            }
            self.events.publish(trip_event_to_bus_event(event));
        }

        // Per spec §5 emission order: motionchange (already emitted by the
        // activity/timer callbacks) -> geofence events -> trip event ->
        // location event.
        self.events.publish(Event::Location(filtered.clone()));

        if self.should_persist(&filtered) {
            let _ = self.location_store.insert(filtered.clone()).await;
        }

        if let Some(sync) = &self.sync {
            let config = self.inner.lock().config.clone();
            if config.auto_sync {
                let payload = location_payload(&filtered, config.http_root_property.as_deref());
                let item = crate::model::QueueItem::new(payload, "location");
                let _ = sync.enqueue(item).await;
            }
        }

        true
    }

    fn should_persist(&self, _fix: &Location) -> bool {
        use crate::config::PersistMode;
        matches!(
            self.inner.lock().config.persist_mode,
            PersistMode::Location | PersistMode::All
        )
    }

    fn apply_filter_chain(&self, mut fix: Location) -> Option<Location> {
        let (config, motion, stationary_anchor) = {
            let inner = self.inner.lock();
            (inner.config.clone(), inner.motion, inner.stationary_anchor.clone())
        };

        // Step 1: mock/spoof flag. Tagged on construction; suppressed here
        // only when the operator has opted into dropping mock fixes.
        if fix.is_mock && config.disable_mock_locations {
            return None;
        }

        // Step 2: accuracy gate.
        if fix.accuracy_m > config.desired_accuracy.cap_meters() {
            return None;
        }

        // Step 3: speed-jump filter against the last accepted fix.
        if let Some(last) = &self.inner.lock().last_accepted {
            let delta_s = (fix.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
            if delta_s > 0.0 {
                let distance = haversine_distance_m(last.lat, last.lng, fix.lat, fix.lng);
                let implied_speed = distance / delta_s;
                if implied_speed > config.speed_jump_filter_mps {
                    return None;
                }
            }
        }

        // Step 4: privacy filter.
        let outcome = self.privacy.lock().apply(fix.clone());
        fix = match outcome {
            PrivacyOutcome::Passthrough(f) => f,
            PrivacyOutcome::Obfuscated(f) => f,
            PrivacyOutcome::Excluded => return None,
        };

        // Step 5: stationary-radius check.
        if motion == MotionState::Stationary && !fix.is_heartbeat {
            if let Some(anchor) = &stationary_anchor {
                if haversine_distance_m(anchor.lat, anchor.lng, fix.lat, fix.lng) <= config.stationary_radius_m {
                    return None;
                }
            }
        }

        Some(fix)
    }

    fn update_odometer(&self, fix: &Location) {
        let mut inner = self.inner.lock();
        let cap = inner.config.desired_odometer_accuracy;
        if fix.accuracy_m > cap {
            return;
        }
        if let Some(last) = inner.last_accepted.clone() {
            if last.accuracy_m <= cap {
                inner.odometer_m += haversine_distance_m(last.lat, last.lng, fix.lat, fix.lng);
            }
        }
    }

    /// Build a synthetic heartbeat fix at the last known position, per spec
    /// §4.1 "Heartbeat".
    pub fn heartbeat_fix(&self) -> Option<Location> {
        let inner = self.inner.lock();
        let last = inner.last_accepted.clone()?;
        let mut fix = last;
        fix.id = uuid::Uuid::new_v4();
        fix.timestamp = Utc::now();
        fix.is_heartbeat = true;
        Some(fix)
    }

    /// Record an error occurrence, classify it through `ErrorRecovery`, and
    /// publish it on the event bus (spec §4.7).
    pub fn report_error(&self, kind: ErrorKind, message: impl Into<String>) -> RecoveryAction {
        self.metrics.error_emitted();
        let action = self.recovery.lock().record(kind);
        let report = ErrorReport::new(kind, message);
        let report = match action {
            RecoveryAction::Retry => report.with_recovery("retry"),
            RecoveryAction::Restart => report.with_recovery("restart"),
            RecoveryAction::FallbackLowPower => report.with_recovery("fallback_low_power"),
            RecoveryAction::RequestUserAction => report.with_recovery("request_user_action"),
            _ => report,
        };
        self.events.publish(Event::Error(report));
        action
    }

    /// One-shot current-position read, per spec §4.1 `get_current_position`.
    /// Subscribes to the event bus and waits for up to `request.samples`
    /// accepted fixes within `request.timeout`, returning the most accurate
    /// one seen.
    pub async fn get_current_position(&self, request: PositionRequest) -> Result<Location, GeoError> {
        let mut rx = self.events.subscribe();
        let mut best: Option<Location> = None;
        let mut collected = 0usize;
        let wanted = request.samples.max(1);
        let deadline = tokio::time::Instant::now() + request.timeout;

        while collected < wanted {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(envelope)) => {
                    if let Event::Location(fix) = envelope.event {
                        collected += 1;
                        best = Some(match best {
                            Some(current) if current.accuracy_m <= fix.accuracy_m => current,
                            _ => fix,
                        });
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    self.events.record_lag(n);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
                Err(_) => break,
            }
        }

        let fix = best.ok_or(GeoError::LocationTimeout(request.timeout))?;

        if request.persist {
            self.location_store
                .insert(fix.clone())
                .await
                .map_err(|err| GeoError::Store(err.to_string()))?;
        }

        Ok(fix)
    }

    /// Register a geofence workflow, per spec §4.2 "Workflows".
    pub fn start_geofence_workflow(&self, workflow_id: impl Into<String>, steps: Vec<WorkflowStep>) {
        self.geofence.lock().start_workflow(workflow_id, steps);
    }

    /// Advance workflow timeout deadlines; called periodically by the
    /// driver loop alongside `poll_motion_timer`.
    pub fn poll_geofence_workflows(&self) {
        for event in self.geofence.lock().poll_workflow_timeouts() {
            self.events.publish(workflow_event_to_bus_event(event));
        }
    }

    /// Load the persisted geofence set and trip state into the runtime
    /// engines, per spec §6 "Persisted state" bootstrap.
    pub async fn restore_state(&self) -> Result<(), GeoError> {
        if let Some(set) = self
            .geofence_store
            .load()
            .await
            .map_err(|err| GeoError::Store(err.to_string()))?
        {
            self.geofence.lock().restore(set.regions);
        }
        if let Some(state) = self
            .trip_store
            .load()
            .await
            .map_err(|err| GeoError::Store(err.to_string()))?
        {
            self.trip.lock().resume(state);
        }
        Ok(())
    }

    /// Persist the current monitored geofence set.
    pub async fn persist_geofences(&self) -> Result<(), GeoError> {
        let regions = self.geofence.lock().list().into_iter().cloned().collect();
        let set = GeofenceSet::new(regions);
        self.geofence_store
            .save(set)
            .await
            .map_err(|err| GeoError::Store(err.to_string()))
    }

    /// Persist the in-progress trip state, throttled by `TripEngine::should_persist`.
    pub async fn persist_trip_state(&self, interval: Duration) -> Result<(), GeoError> {
        let due_state = {
            let mut trip = self.trip.lock();
            if trip.should_persist(Utc::now(), interval) {
                trip.state().cloned()
            } else {
                None
            }
        };
        if let Some(state) = due_state {
            self.trip_store
                .save(state)
                .await
                .map_err(|err| GeoError::Store(err.to_string()))?;
        }
        Ok(())
    }

    /// Feed platform telemetry through `AdaptiveController` and merge any
    /// resulting acquisition-config change into the live config (spec §4.1:
    /// the coordinator drives `AdaptiveController`). Returns `true` if the
    /// config changed.
    pub fn apply_telemetry(&self, telemetry: Telemetry) -> bool {
        let Some(decided) = self.adaptive.lock().evaluate(telemetry) else {
            return false;
        };
        let mut inner = self.inner.lock();
        inner.config.desired_accuracy = decided.desired_accuracy;
        inner.config.distance_filter_m = decided.distance_filter_m;
        inner.config.location_update_interval_ms = decided.update_interval.as_millis() as u64;
        inner.config.heartbeat_interval_s = decided.heartbeat_interval.as_secs();
        true
    }
}

fn workflow_event_to_bus_event(event: WorkflowEvent) -> Event {
    match event {
        WorkflowEvent::Advanced { workflow_id, step } => Event::WorkflowAdvanced { workflow_id, step },
        WorkflowEvent::Timeout { workflow_id } => Event::WorkflowTimeout { workflow_id },
        WorkflowEvent::Complete { workflow_id } => Event::WorkflowComplete { workflow_id },
    }
}

fn trip_event_to_bus_event(event: TripEvent) -> Event {
    match event {
        TripEvent::Started { trip_id } => Event::TripStart { trip_id },
        TripEvent::Updated { trip_id, distance_m } => Event::TripUpdate { trip_id, distance_m },
        TripEvent::Dwell { trip_id } => Event::Dwell { subject: trip_id },
        TripEvent::RouteDeviation { trip_id, distance_m } => Event::RouteDeviation { trip_id, distance_m },
        TripEvent::Ended { summary } => Event::TripEnd { summary },
        TripEvent::Diagnostic(_) => Event::Error(ErrorReport::new(
            ErrorKind::TripError,
            "trip update skipped: clock anomaly",
        )),
    }
}

/// Build the default sync body shape described in spec §4.4 "Wire protocol".
fn location_payload(fix: &Location, http_root_property: Option<&str>) -> serde_json::Value {
    let location = serde_json::to_value(fix).expect("Location always serializes");
    match http_root_property {
        Some(root) => serde_json::json!({ root: location }),
        None => serde_json::json!({ "location": location }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryGeofenceStore, MemoryLocationStore, MemoryTripStore};

    fn coordinator() -> TrackingCoordinator {
        TrackingCoordinator::new(
            Config::default(),
            Arc::new(EventBus::new(64)),
            Arc::new(MemoryLocationStore::new()),
            Arc::new(MemoryGeofenceStore::new()),
            Arc::new(MemoryTripStore::new()),
            None,
            Arc::new(EngineMetrics::new()),
        )
    }

    fn fix(lat: f64, lng: f64) -> Location {
        Location::new(Utc::now(), lat, lng, 5.0).unwrap()
    }

    #[test]
    fn initial_state_is_stationary_and_disabled() {
        let coordinator = coordinator();
        let state = coordinator.get_state();
        assert_eq!(state.motion, MotionState::Stationary);
        assert!(!state.enabled);
    }

    #[test]
    fn start_enables_and_ready_validates_config() {
        let coordinator = coordinator();
        assert!(coordinator.start().is_ok());
        assert!(coordinator.is_enabled());

        let bad_config = Config {
            stationary_radius_m: -1.0,
            ..Config::default()
        };
        assert!(coordinator.ready(bad_config).is_err());
    }

    #[tokio::test]
    async fn accuracy_gate_drops_low_quality_fixes() {
        let coordinator = coordinator();
        let mut low_quality = fix(1.0, 1.0);
        low_quality.accuracy_m = 1_000_000.0;
        assert!(!coordinator.ingest_fix(low_quality).await);
    }

    #[tokio::test]
    async fn accepted_fix_updates_odometer_and_last_location() {
        let coordinator = coordinator();
        assert!(coordinator.ingest_fix(fix(0.0, 0.0)).await);
        assert!(coordinator.ingest_fix(fix(0.0, 0.01)).await);
        let state = coordinator.get_state();
        assert!(state.odometer_m > 0.0);
        assert!(state.last_location.is_some());
    }

    #[test]
    fn change_pace_overrides_detector_state() {
        let coordinator = coordinator();
        coordinator.change_pace(true);
        assert_eq!(coordinator.get_state().motion, MotionState::Moving);
        coordinator.change_pace(false);
        assert_eq!(coordinator.get_state().motion, MotionState::Stationary);
    }

    #[test]
    fn activity_trigger_with_zero_delay_transitions_immediately() {
        let coordinator = coordinator();
        let walking = Activity::new(ActivityType::Walking, 90);
        let emitted = coordinator.on_activity(walking, Instant::now());
        assert!(emitted);
        assert_eq!(coordinator.get_state().motion, MotionState::Moving);
    }

    #[test]
    fn activity_trigger_with_delay_enters_pending_start_then_commits() {
        let mut config = Config::default();
        config.motion_trigger_delay_ms = 50;
        let coordinator = coordinator();
        coordinator.ready(config).unwrap();

        let walking = Activity::new(ActivityType::Walking, 90);
        let t0 = Instant::now();
        let emitted = coordinator.on_activity(walking, t0);
        assert!(!emitted);
        assert_eq!(coordinator.get_state().motion, MotionState::PendingStart);

        assert!(!coordinator.poll_motion_timer(t0));
        assert!(coordinator.poll_motion_timer(t0 + Duration::from_millis(60)));
        assert_eq!(coordinator.get_state().motion, MotionState::Moving);
    }

    #[test]
    fn error_report_routes_through_recovery_policy() {
        let coordinator = coordinator();
        let action = coordinator.report_error(ErrorKind::PermissionDenied, "denied");
        assert_eq!(action, RecoveryAction::RequestUserAction);
    }

    #[tokio::test]
    async fn mock_fix_suppressed_only_when_configured() {
        let coordinator = coordinator();
        let mut mock_fix = fix(1.0, 1.0);
        mock_fix.is_mock = true;
        assert!(coordinator.ingest_fix(mock_fix.clone()).await, "mock fixes pass by default");

        let mut config = Config::default();
        config.disable_mock_locations = true;
        let coordinator2 = self::coordinator();
        coordinator2.ready(config).unwrap();
        assert!(!coordinator2.ingest_fix(mock_fix).await);
    }

    #[tokio::test]
    async fn ingest_fix_emits_geofence_before_location() {
        let coordinator = coordinator();
        coordinator
            .geofence
            .lock()
            .add(crate::model::Geofence::new("home", crate::geo::Point::new(0.0, 0.0), 100.0).unwrap())
            .unwrap();

        assert!(coordinator.ingest_fix(fix(90.0, 0.0)).await); // resolve outside, no emission

        let mut rx = coordinator.events.subscribe();
        assert!(coordinator.ingest_fix(fix(0.0, 0.0)).await); // enter -> geofence event then location

        let mut saw_geofence = false;
        loop {
            let envelope = rx.recv().await.unwrap();
            match envelope.event {
                Event::Geofence { .. } => saw_geofence = true,
                Event::Location(_) => {
                    assert!(saw_geofence, "geofence event must precede the location event");
                    break;
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn get_current_position_returns_most_accurate_sample() {
        let coordinator = coordinator();
        let request = PositionRequest {
            timeout: Duration::from_millis(200),
            samples: 2,
            persist: false,
        };

        let ingest = async {
            let mut noisy = fix(1.0, 1.0);
            noisy.accuracy_m = 50.0;
            coordinator.ingest_fix(noisy).await;
            let mut precise = fix(1.0, 1.0);
            precise.accuracy_m = 5.0;
            coordinator.ingest_fix(precise).await;
        };
        let position = async { coordinator.get_current_position(request).await };

        let (_, result) = tokio::join!(ingest, position);
        assert_eq!(result.unwrap().accuracy_m, 5.0);
    }

    #[tokio::test]
    async fn get_current_position_times_out_with_no_fixes() {
        let coordinator = coordinator();
        let request = PositionRequest {
            timeout: Duration::from_millis(20),
            samples: 1,
            persist: false,
        };
        assert!(matches!(
            coordinator.get_current_position(request).await,
            Err(GeoError::LocationTimeout(_))
        ));
    }

    #[tokio::test]
    async fn workflow_completion_is_published_on_event_bus() {
        let coordinator = coordinator();
        let mut rx = coordinator.events.subscribe();
        coordinator
            .geofence
            .lock()
            .add(crate::model::Geofence::new("home", crate::geo::Point::new(0.0, 0.0), 100.0).unwrap())
            .unwrap();
        coordinator.start_geofence_workflow(
            "wf1",
            vec![crate::geofence_engine::WorkflowStep {
                geofence_id: "home".into(),
                expected: crate::geofence_engine::GeofenceAction::Enter,
                timeout: Duration::from_secs(60),
            }],
        );

        coordinator.ingest_fix(fix(90.0, 0.0)).await; // resolve outside
        coordinator.ingest_fix(fix(0.0, 0.0)).await; // enter -> completes workflow

        let mut saw_complete = false;
        while let Ok(envelope) = rx.try_recv() {
            if matches!(envelope.event, Event::WorkflowComplete { ref workflow_id } if workflow_id == "wf1") {
                saw_complete = true;
            }
        }
        assert!(saw_complete, "workflow completion must reach the event bus");
    }

    #[tokio::test]
    async fn restore_state_replays_persisted_geofences_and_trip() {
        let geofence_store = Arc::new(MemoryGeofenceStore::new());
        let g = crate::model::Geofence::new("home", crate::geo::Point::new(0.0, 0.0), 100.0).unwrap();
        geofence_store
            .save(crate::model::GeofenceSet::new(vec![crate::model::MonitoredRegion::Circular(g)]))
            .await
            .unwrap();

        let coordinator = TrackingCoordinator::new(
            Config::default(),
            Arc::new(EventBus::new(64)),
            Arc::new(MemoryLocationStore::new()),
            geofence_store,
            Arc::new(MemoryTripStore::new()),
            None,
            Arc::new(EngineMetrics::new()),
        );

        coordinator.restore_state().await.unwrap();
        assert!(coordinator.geofence.lock().exists("home"));
    }

    #[test]
    fn apply_telemetry_merges_adaptive_config_into_live_config() {
        let coordinator = coordinator();
        let telemetry = Telemetry {
            speed_mps: 30.0,
            battery_pct: 80,
            charging: false,
            is_moving: true,
            activity: None,
            in_geofence: false,
            time_since_stationary: None,
        };
        assert!(coordinator.apply_telemetry(telemetry));
        assert_eq!(coordinator.inner.lock().config.desired_accuracy, crate::config::DesiredAccuracy::Navigation);
    }
}
