//! Core data model: `Location`, `Activity`, and friends, per spec §3.
//!
//! Grounded on `meap`'s `rig-mobile` location module for the
//! `LocationData`/`GeofenceRegion` shape, adapted to the richer field set
//! (odometer, event tag, extras map) this spec requires.

mod geofence;
mod privacy;
mod queue;
mod trip;

pub use geofence::{Geofence, GeofenceSet, MonitoredRegion, PolygonGeofence};
pub use privacy::{PrivacyAction, PrivacyZone};
pub use queue::QueueItem;
pub use trip::{TripState, TripSummary};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{validate_coords, CoordError};

/// Motion/activity classification reported by the acquisition layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Still,
    Walking,
    Running,
    OnFoot,
    InVehicle,
    OnBicycle,
    Tilting,
    Unknown,
}

/// A single activity classification with a confidence score in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub confidence: u8,
}

impl Activity {
    pub fn new(kind: ActivityType, confidence: u8) -> Self {
        Self {
            kind,
            confidence: confidence.min(100),
        }
    }

    pub fn is_moving(&self) -> bool {
        !matches!(self.kind, ActivityType::Still | ActivityType::Unknown)
    }
}

/// An immutable position fix, per spec §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub altitude_m: Option<f64>,
    pub is_moving: Option<bool>,
    pub is_heartbeat: bool,
    pub is_mock: bool,
    pub event_tag: Option<String>,
    pub activity: Option<Activity>,
    pub battery_pct: Option<u8>,
    pub geofence_ref: Option<String>,
    pub odometer_m: Option<f64>,
    pub extras: HashMap<String, serde_json::Value>,
}

impl Location {
    /// Build a new fix, validating lat/lng/accuracy per spec §3 invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        lat: f64,
        lng: f64,
        accuracy_m: f64,
    ) -> Result<Self, CoordError> {
        validate_coords(lat, lng)?;
        if accuracy_m < 0.0 {
            return Err(CoordError::InvalidRadius(accuracy_m));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            timestamp,
            lat,
            lng,
            accuracy_m,
            speed_mps: None,
            heading_deg: None,
            altitude_m: None,
            is_moving: None,
            is_heartbeat: false,
            is_mock: false,
            event_tag: None,
            activity: None,
            battery_pct: None,
            geofence_ref: None,
            odometer_m: None,
            extras: HashMap::new(),
        })
    }

    pub fn heartbeat(timestamp: DateTime<Utc>, lat: f64, lng: f64, accuracy_m: f64) -> Result<Self, CoordError> {
        let mut loc = Self::new(timestamp, lat, lng, accuracy_m)?;
        loc.is_heartbeat = true;
        Ok(loc)
    }
}
