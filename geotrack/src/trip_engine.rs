//! TripEngine, per spec §4.3.
//!
//! Grounded on `aircraft_position::flight_path::FlightPathHistory`'s
//! rate-limited sample accumulation and bearing/distance computation, and on
//! the teacher's crash-safe, throttled-persistence pattern from
//! `app::bootstrap`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::geo::{distance_to_segment_m, haversine_distance_m, Point};
use crate::model::{Location, TripState, TripSummary};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TripError {
    #[error("trip already started")]
    AlreadyStarted,
    #[error("trip not started")]
    NotStarted,
}

/// Diagnostic raised for soft failures (spec §7 "Soft" posture class); the
/// affected update is skipped but the engine continues.
#[derive(Debug, Clone, PartialEq)]
pub enum TripDiagnostic {
    NonPositiveDelta { fix_timestamp: DateTime<Utc> },
    ClockJumpBackward { reset_to: DateTime<Utc> },
}

/// Lifecycle and per-fix events emitted by the engine; dispatched onto the
/// event bus by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    Started { trip_id: String },
    Updated { trip_id: String, distance_m: f64 },
    Dwell { trip_id: String },
    RouteDeviation { trip_id: String, distance_m: f64 },
    Ended { summary: TripSummary },
    Diagnostic(TripDiagnostic),
}

#[derive(Debug, Clone)]
pub struct TripConfig {
    pub start_on_moving: bool,
    pub start_distance_m: f64,
    pub start_speed_kph: f64,
    pub stationary_speed_kph: f64,
    pub update_interval: Duration,
    pub dwell: Duration,
    pub stop_on_stationary: bool,
    pub stop_timeout: Duration,
    pub route: Option<Vec<Point>>,
    pub route_deviation_threshold_m: f64,
    pub route_deviation_cooldown: Duration,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            start_on_moving: false,
            start_distance_m: 50.0,
            start_speed_kph: 5.0,
            stationary_speed_kph: 1.0,
            update_interval: Duration::from_secs(30),
            dwell: Duration::from_secs(300),
            stop_on_stationary: false,
            stop_timeout: Duration::from_secs(600),
            route: None,
            route_deviation_threshold_m: 100.0,
            route_deviation_cooldown: Duration::from_secs(60),
        }
    }
}

/// Consumes filtered fixes, runs the trip state machine, emits lifecycle
/// events, and throttles persistence.
pub struct TripEngine {
    config: TripConfig,
    state: Option<TripState>,
    stationary_since: Option<DateTime<Utc>>,
    continuous_stationary: Duration,
    dwell_fired: bool,
    last_persisted_at: Option<DateTime<Utc>>,
    last_update_emitted_at: Option<DateTime<Utc>>,
    last_route_deviation_at: Option<DateTime<Utc>>,
    pending_candidate: Option<Location>,
}

impl TripEngine {
    pub fn new(config: TripConfig) -> Self {
        Self {
            config,
            state: None,
            stationary_since: None,
            continuous_stationary: Duration::ZERO,
            dwell_fired: false,
            last_persisted_at: None,
            last_update_emitted_at: None,
            last_route_deviation_at: None,
            pending_candidate: None,
        }
    }

    /// Resume from a persisted (non-ended) trip state, per spec §4.3.
    pub fn resume(&mut self, state: TripState) {
        self.state = Some(state);
    }

    pub fn state(&self) -> Option<&TripState> {
        self.state.as_ref()
    }

    pub fn start(&mut self, trip_id: impl Into<String>) -> Result<TripEvent, TripError> {
        if self.state.as_ref().is_some_and(|s| s.started && !s.ended) {
            return Err(TripError::AlreadyStarted);
        }
        let trip_id = trip_id.into();
        let mut state = TripState::new(trip_id.clone());
        state.started = true;
        state.started_at = Some(Utc::now());
        self.state = Some(state);
        Ok(TripEvent::Started { trip_id })
    }

    /// Feed a fix into the trip state machine, per spec §4.3 "Update flow".
    pub fn update(&mut self, fix: Location) -> Vec<TripEvent> {
        if self.state.is_none() && self.config.start_on_moving {
            return self.consider_start_on_moving(fix);
        }
        if self.state.is_none() {
            let _ = self.start(uuid::Uuid::new_v4().to_string());
        }

        let mut events = Vec::new();
        let state = self.state.as_mut().expect("state initialized above");

        let last = match state.last_location.clone() {
            Some(l) => l,
            None => {
                state.last_location = Some(fix);
                return events;
            }
        };

        let delta = fix.timestamp - last.timestamp;
        let delta_s = delta.num_milliseconds() as f64 / 1000.0;

        if delta_s <= 0.0 {
            events.push(TripEvent::Diagnostic(TripDiagnostic::NonPositiveDelta {
                fix_timestamp: fix.timestamp,
            }));
            if delta < chrono::Duration::hours(-1) {
                state.last_location = Some(fix.clone());
                events.push(TripEvent::Diagnostic(TripDiagnostic::ClockJumpBackward {
                    reset_to: fix.timestamp,
                }));
            }
            return events;
        }

        let distance_delta = haversine_distance_m(last.lat, last.lng, fix.lat, fix.lng);
        let implied_speed_kph = (distance_delta / delta_s) * 3.6;
        let is_moving = implied_speed_kph > self.config.stationary_speed_kph;

        state.distance_m += distance_delta;
        state.max_speed_kph = state.max_speed_kph.max(implied_speed_kph);

        if is_moving {
            self.continuous_stationary = Duration::ZERO;
            self.stationary_since = None;
            self.dwell_fired = false;
        } else {
            state.idle_s += delta_s;
            self.continuous_stationary += Duration::from_secs_f64(delta_s.max(0.0));
            if self.stationary_since.is_none() {
                self.stationary_since = Some(fix.timestamp);
            }
        }

        state.last_location = Some(fix.clone());

        let trip_id = state.trip_id.clone();
        let now = fix.timestamp;

        let should_emit_update = self
            .last_update_emitted_at
            .map(|t| now - t >= chrono::Duration::from_std(self.config.update_interval).unwrap())
            .unwrap_or(true);
        if should_emit_update {
            self.last_update_emitted_at = Some(now);
            events.push(TripEvent::Updated {
                trip_id: trip_id.clone(),
                distance_m: self.state.as_ref().unwrap().distance_m,
            });
        }

        if !self.dwell_fired
            && self.continuous_stationary >= self.config.dwell
        {
            self.dwell_fired = true;
            events.push(TripEvent::Dwell {
                trip_id: trip_id.clone(),
            });
        }

        if let Some(route) = &self.config.route {
            if let Some(min_dist) = nearest_segment_distance(route, Point::new(fix.lat, fix.lng)) {
                let cooldown_ok = self
                    .last_route_deviation_at
                    .map(|t| now - t >= chrono::Duration::from_std(self.config.route_deviation_cooldown).unwrap())
                    .unwrap_or(true);
                if min_dist >= self.config.route_deviation_threshold_m && cooldown_ok {
                    self.last_route_deviation_at = Some(now);
                    events.push(TripEvent::RouteDeviation {
                        trip_id: trip_id.clone(),
                        distance_m: min_dist,
                    });
                }
            }
        }

        if self.config.stop_on_stationary
            && self.continuous_stationary >= self.config.stop_timeout
        {
            if let Some(summary_event) = self.stop() {
                events.push(summary_event);
            }
        }

        events
    }

    fn consider_start_on_moving(&mut self, fix: Location) -> Vec<TripEvent> {
        if let Some(candidate) = self.pending_candidate.take() {
            let distance = haversine_distance_m(candidate.lat, candidate.lng, fix.lat, fix.lng);
            let delta_s = (fix.timestamp - candidate.timestamp).num_milliseconds() as f64 / 1000.0;
            let implied_speed_kph = if delta_s > 0.0 { (distance / delta_s) * 3.6 } else { 0.0 };

            if distance >= self.config.start_distance_m || implied_speed_kph >= self.config.start_speed_kph {
                let mut events = self.start(uuid::Uuid::new_v4().to_string()).into_iter().collect::<Vec<_>>();
                events.extend(self.update(candidate));
                events.extend(self.update(fix));
                return events;
            }
            self.pending_candidate = Some(fix);
            Vec::new()
        } else {
            self.pending_candidate = Some(fix);
            Vec::new()
        }
    }

    /// End the current trip, producing a summary event if one was started.
    pub fn stop(&mut self) -> Option<TripEvent> {
        let state = self.state.as_mut()?;
        if state.ended {
            return None;
        }
        state.ended = true;
        state.ended_at = Some(Utc::now());
        let summary = TripSummary::from_state(state)?;
        Some(TripEvent::Ended { summary })
    }

    pub fn should_persist(&mut self, now: DateTime<Utc>, interval: Duration) -> bool {
        let due = self
            .last_persisted_at
            .map(|t| now - t >= chrono::Duration::from_std(interval).unwrap())
            .unwrap_or(true);
        if due {
            self.last_persisted_at = Some(now);
        }
        due
    }
}

fn nearest_segment_distance(route: &[Point], p: Point) -> Option<f64> {
    if route.len() < 2 {
        return None;
    }
    route
        .windows(2)
        .map(|w| distance_to_segment_m(p, w[0], w[1]))
        .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.min(d))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fix_at(ts: DateTime<Utc>, lat: f64, lng: f64) -> Location {
        Location::new(ts, lat, lng, 5.0).unwrap()
    }

    #[test]
    fn distance_is_monotonically_non_decreasing() {
        let mut engine = TripEngine::new(TripConfig::default());
        engine.start("trip-1").unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        engine.update(fix_at(t0, 0.0, 0.0));
        let mut last_distance = 0.0;
        for i in 1..5 {
            engine.update(fix_at(t0 + chrono::Duration::seconds(i * 10), 0.0, 0.001 * i as f64));
            let d = engine.state().unwrap().distance_m;
            assert!(d >= last_distance);
            last_distance = d;
        }
    }

    #[test]
    fn clock_anomaly_resets_last_location_preserves_totals() {
        let mut engine = TripEngine::new(TripConfig::default());
        engine.start("trip-1").unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        engine.update(fix_at(t0, 0.0, 0.0));
        engine.update(fix_at(t0 + chrono::Duration::seconds(10), 0.0, 0.001));
        let distance_before = engine.state().unwrap().distance_m;

        // Clock jumps backward by more than an hour (spec §8 scenario 6).
        let jumped = t0 - chrono::Duration::hours(2);
        let events = engine.update(fix_at(jumped, 0.0, 0.002));
        assert!(events
            .iter()
            .any(|e| matches!(e, TripEvent::Diagnostic(TripDiagnostic::ClockJumpBackward { .. }))));
        assert_eq!(engine.state().unwrap().distance_m, distance_before);
        assert_eq!(engine.state().unwrap().last_location.as_ref().unwrap().timestamp, jumped);

        // Subsequent fix updates normally from the reset baseline.
        let events = engine.update(fix_at(jumped + chrono::Duration::seconds(10), 0.0, 0.003));
        assert!(events.iter().any(|e| matches!(e, TripEvent::Updated { .. })));
        assert!(engine.state().unwrap().distance_m > distance_before);
    }

    #[test]
    fn summary_only_on_clean_stop() {
        let mut engine = TripEngine::new(TripConfig::default());
        engine.start("trip-1").unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        engine.update(fix_at(t0, 0.0, 0.0));
        engine.update(fix_at(t0 + chrono::Duration::seconds(30), 0.0, 0.01));
        let stop_event = engine.stop();
        assert!(matches!(stop_event, Some(TripEvent::Ended { .. })));
        assert!(engine.stop().is_none(), "second stop is a no-op");
    }

    #[test]
    fn dwell_fires_once_when_stationary_exceeds_threshold() {
        let config = TripConfig {
            dwell: Duration::from_secs(60),
            update_interval: Duration::from_secs(1_000_000),
            ..TripConfig::default()
        };
        let mut engine = TripEngine::new(config);
        engine.start("trip-1").unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        engine.update(fix_at(t0, 0.0, 0.0));
        let e1 = engine.update(fix_at(t0 + chrono::Duration::seconds(70), 0.0, 0.0));
        assert!(e1.iter().any(|e| matches!(e, TripEvent::Dwell { .. })));
        let e2 = engine.update(fix_at(t0 + chrono::Duration::seconds(80), 0.0, 0.0));
        assert!(!e2.iter().any(|e| matches!(e, TripEvent::Dwell { .. })));
    }
}
