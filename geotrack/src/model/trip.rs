//! TripState data model, per spec §3.
//!
//! Grounded on `aircraft_position::flight_path::FlightPathHistory`'s
//! rate-limited sample accumulation (distance/speed totals updated per
//! accepted sample) and the teacher's crash-safe persisted-blob pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Location;

/// Running state of an in-progress (or just-ended) trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    pub schema_version: u32,
    pub trip_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub start_location: Option<Location>,
    pub last_location: Option<Location>,
    pub distance_m: f64,
    pub idle_s: f64,
    pub max_speed_kph: f64,
    pub started: bool,
    pub ended: bool,
}

impl TripState {
    pub const CURRENT_SCHEMA_VERSION: u32 = 1;

    pub fn new(trip_id: impl Into<String>) -> Self {
        Self {
            schema_version: Self::CURRENT_SCHEMA_VERSION,
            trip_id: trip_id.into(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            start_location: None,
            last_location: None,
            distance_m: 0.0,
            idle_s: 0.0,
            max_speed_kph: 0.0,
            started: false,
            ended: false,
        }
    }
}

/// Produced on clean `stop()` only, per spec §4.3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: String,
    pub duration_s: f64,
    pub idle_s: f64,
    pub avg_speed_kph: f64,
    pub max_speed_kph: f64,
    pub distance_m: f64,
}

impl TripSummary {
    pub fn from_state(state: &TripState) -> Option<Self> {
        let started_at = state.started_at?;
        let ended_at = state.ended_at?;
        let duration_s = (ended_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let avg_speed_kph = if duration_s > 0.0 {
            (state.distance_m / 1000.0) / (duration_s / 3600.0)
        } else {
            0.0
        };
        Some(Self {
            trip_id: state.trip_id.clone(),
            duration_s,
            idle_s: state.idle_s,
            avg_speed_kph,
            max_speed_kph: state.max_speed_kph,
            distance_m: state.distance_m,
        })
    }
}
