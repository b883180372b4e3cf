//! Config & validation: a single configuration record, with validation and
//! preset builder methods. Mutation is serialized by the coordinator's
//! configuration lock (spec §5 "Locking discipline").
//!
//! Grounded on `app::config::AppConfig`'s builder-method style
//! (`with_max_size`, `with_gc_interval_secs`, ...), adapted to the tracking
//! domain's configuration surface from spec §6.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ActivityType;

/// GPS accuracy bucket, from most to least precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredAccuracy {
    Navigation,
    High,
    Medium,
    Low,
    VeryLow,
    Lowest,
}

impl DesiredAccuracy {
    /// Approximate accuracy cap in meters used by the coordinator's
    /// accuracy-gate filter step.
    pub fn cap_meters(self) -> f64 {
        match self {
            DesiredAccuracy::Navigation => 5.0,
            DesiredAccuracy::High => 10.0,
            DesiredAccuracy::Medium => 30.0,
            DesiredAccuracy::Low => 100.0,
            DesiredAccuracy::VeryLow => 500.0,
            DesiredAccuracy::Lowest => 3000.0,
        }
    }
}

/// Store pruning caps shared by LocationStore / QueueStore / LogStore.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PruningCaps {
    pub max_days: Option<u32>,
    pub max_records: Option<u64>,
}

impl Default for PruningCaps {
    fn default() -> Self {
        Self {
            max_days: Some(7),
            max_records: Some(10_000),
        }
    }
}

/// What gets written to LocationStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistMode {
    None,
    Location,
    Geofence,
    All,
}

/// A single `HH:MM-HH:MM` tracking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: (u8, u8),
    pub end: (u8, u8),
}

/// The full engine configuration. Constructed via `Config::default()` and
/// mutated only through validated builder methods or `merge_patch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub desired_accuracy: DesiredAccuracy,
    pub distance_filter_m: f64,
    pub location_update_interval_ms: u64,
    pub stop_timeout_min: u32,
    pub stationary_radius_m: f64,
    pub speed_jump_filter_mps: f64,
    pub disable_stop_detection: bool,
    pub disable_motion_activity_updates: bool,
    pub trigger_activities: Vec<ActivityType>,
    pub min_activity_confidence: u8,
    pub motion_trigger_delay_ms: u64,
    pub stop_detection_delay_ms: u64,
    pub heartbeat_interval_s: u64,
    pub persist_mode: PersistMode,
    pub location_pruning: PruningCaps,
    pub queue_pruning: PruningCaps,
    pub url: Option<String>,
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub http_root_property: Option<String>,
    pub extras: HashMap<String, serde_json::Value>,
    pub auto_sync: bool,
    pub batch_sync: bool,
    pub max_batch_size: usize,
    pub auto_sync_threshold: usize,
    pub max_retry: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff: f64,
    pub max_retry_delay_ms: u64,
    pub idempotency_header: Option<String>,
    pub disable_auto_sync_on_cellular: bool,
    pub enable_headless: bool,
    pub stop_on_terminate: bool,
    pub start_on_boot: bool,
    pub schedule: Vec<ScheduleWindow>,
    pub log_level: String,
    pub log_max_days: u32,
    pub desired_odometer_accuracy: f64,
    pub max_monitored_geofences: usize,
    pub initial_trigger: bool,
    pub disable_mock_locations: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            desired_accuracy: DesiredAccuracy::High,
            distance_filter_m: 10.0,
            location_update_interval_ms: 1000,
            stop_timeout_min: 5,
            stationary_radius_m: 25.0,
            speed_jump_filter_mps: 300.0,
            disable_stop_detection: false,
            disable_motion_activity_updates: false,
            trigger_activities: vec![
                ActivityType::Walking,
                ActivityType::Running,
                ActivityType::OnFoot,
                ActivityType::InVehicle,
                ActivityType::OnBicycle,
            ],
            min_activity_confidence: 50,
            motion_trigger_delay_ms: 0,
            stop_detection_delay_ms: 0,
            heartbeat_interval_s: 60,
            persist_mode: PersistMode::Location,
            location_pruning: PruningCaps::default(),
            queue_pruning: PruningCaps::default(),
            url: None,
            headers: HashMap::new(),
            params: HashMap::new(),
            http_root_property: None,
            extras: HashMap::new(),
            auto_sync: false,
            batch_sync: false,
            max_batch_size: 50,
            auto_sync_threshold: 5,
            max_retry: 3,
            retry_delay_ms: 10_000,
            retry_backoff: 2.0,
            max_retry_delay_ms: 60_000,
            idempotency_header: None,
            disable_auto_sync_on_cellular: false,
            enable_headless: false,
            stop_on_terminate: false,
            start_on_boot: false,
            schedule: Vec::new(),
            log_level: "info".to_string(),
            log_max_days: 3,
            desired_odometer_accuracy: 50.0,
            max_monitored_geofences: 20,
            initial_trigger: false,
            disable_mock_locations: false,
        }
    }
}

/// Structural validation failure; propagated synchronously from
/// `ready`/`set_config` (spec §7 "Structural" posture class).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("distance_filter_m must be >= 0, got {0}")]
    NegativeDistanceFilter(f64),
    #[error("stationary_radius_m must be > 0, got {0}")]
    NonPositiveStationaryRadius(f64),
    #[error("min_activity_confidence must be in [0, 100], got {0}")]
    InvalidConfidence(u8),
    #[error("max_batch_size must be > 0")]
    ZeroBatchSize,
    #[error("max_retry_delay_ms must be >= retry_delay_ms")]
    InvalidRetryDelayBounds,
    #[error("url is required when auto_sync or batch_sync is enabled")]
    MissingSyncUrl,
    #[error("max_monitored_geofences must be > 0")]
    ZeroGeofenceCapacity,
    #[error("invalid schedule window: {0:?}")]
    InvalidScheduleWindow(ScheduleWindow),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.distance_filter_m < 0.0 {
            return Err(ConfigError::NegativeDistanceFilter(self.distance_filter_m));
        }
        if self.stationary_radius_m <= 0.0 {
            return Err(ConfigError::NonPositiveStationaryRadius(
                self.stationary_radius_m,
            ));
        }
        if self.min_activity_confidence > 100 {
            return Err(ConfigError::InvalidConfidence(self.min_activity_confidence));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(ConfigError::InvalidRetryDelayBounds);
        }
        if (self.auto_sync || self.batch_sync) && self.url.is_none() {
            return Err(ConfigError::MissingSyncUrl);
        }
        if self.max_monitored_geofences == 0 {
            return Err(ConfigError::ZeroGeofenceCapacity);
        }
        for window in &self.schedule {
            let (sh, sm) = window.start;
            let (eh, em) = window.end;
            if sh > 23 || eh > 23 || sm > 59 || em > 59 {
                return Err(ConfigError::InvalidScheduleWindow(*window));
            }
        }
        Ok(())
    }

    pub fn with_desired_accuracy(mut self, accuracy: DesiredAccuracy) -> Self {
        self.desired_accuracy = accuracy;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_schedule(mut self, schedule: Vec<ScheduleWindow>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Merge a partial patch (expressed as JSON) into this config and
    /// re-validate, per `TrackingCoordinator::set_config`'s "merge-and-
    /// revalidate" contract.
    pub fn merge_patch(&self, patch: serde_json::Value) -> Result<Config, ConfigError> {
        let mut base = serde_json::to_value(self).expect("Config always serializes");
        merge_json(&mut base, patch);
        let merged: Config = serde_json::from_value(base)
            .map_err(|_| ConfigError::InvalidScheduleWindow(ScheduleWindow { start: (0, 0), end: (0, 0) }))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Load from an INI file, matching the on-disk config format the
    /// teacher's `rust-ini` dependency is used for elsewhere in the pack.
    pub fn from_ini_file(path: &std::path::Path) -> Result<Config, ConfigError> {
        let ini = ini::Ini::load_from_file(path)
            .map_err(|_| ConfigError::InvalidScheduleWindow(ScheduleWindow { start: (0, 0), end: (0, 0) }))?;
        let mut config = Config::default();
        if let Some(section) = ini.section(Some("sync")) {
            if let Some(url) = section.get("url") {
                config.url = Some(url.to_string());
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    if let (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) =
        (base, patch)
    {
        for (k, v) in patch_map {
            base_map.insert(k, v);
        }
    }
}
