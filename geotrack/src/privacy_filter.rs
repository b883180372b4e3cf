//! PrivacyFilter: zone-based exclusion and obfuscation, per spec §4.5.
//!
//! Grounded on `cyrinux-network-dmenu`'s exclude/obfuscate split and on the
//! Haversine implementation from `meap`'s `location.rs`, used here for the
//! zone membership test.

use rand::Rng;

use crate::geo::{destination_point, haversine_distance_m, normalize_longitude, TWO_PI};
use crate::model::{Location, PrivacyAction, PrivacyZone};

/// Outcome of running a fix through the privacy filter.
#[derive(Debug, Clone, PartialEq)]
pub enum PrivacyOutcome {
    /// No enabled zone matched; the fix passes through unchanged.
    Passthrough(Location),
    /// One or more zones matched with `action = obfuscate`; the fix's
    /// coordinates and accuracy have been mutated.
    Obfuscated(Location),
    /// A matched zone had `action = exclude`; the fix is dropped. The
    /// original fix is never returned to the caller.
    Excluded,
}

/// Stateless over a mutable set of zones owned by the coordinator.
pub struct PrivacyFilter {
    zones: Vec<PrivacyZone>,
}

impl PrivacyFilter {
    pub fn new() -> Self {
        Self { zones: Vec::new() }
    }

    pub fn set_zones(&mut self, zones: Vec<PrivacyZone>) {
        self.zones = zones;
    }

    pub fn add_zone(&mut self, zone: PrivacyZone) {
        self.zones.retain(|z| z.identifier != zone.identifier);
        self.zones.push(zone);
    }

    pub fn remove_zone(&mut self, identifier: &str) {
        self.zones.retain(|z| z.identifier != identifier);
    }

    pub fn zones(&self) -> &[PrivacyZone] {
        &self.zones
    }

    fn matched_zones(&self, location: &Location) -> Vec<&PrivacyZone> {
        self.zones
            .iter()
            .filter(|z| z.enabled)
            .filter(|z| {
                haversine_distance_m(z.center.lat, z.center.lng, location.lat, location.lng)
                    <= z.radius_m
            })
            .collect()
    }

    /// Apply the filter to `location`. At most one of
    /// `{Passthrough, Obfuscated, Excluded}` is returned, per spec §8
    /// invariant 2.
    pub fn apply(&self, location: Location) -> PrivacyOutcome {
        let matched = self.matched_zones(&location);
        if matched.is_empty() {
            return PrivacyOutcome::Passthrough(location);
        }

        if matched.iter().any(|z| z.action == PrivacyAction::Exclude) {
            return PrivacyOutcome::Excluded;
        }

        let radius_m = matched
            .iter()
            .map(|z| z.obfuscation_radius_m)
            .fold(0.0_f64, f64::max);

        PrivacyOutcome::Obfuscated(self.obfuscate(location, radius_m))
    }

    fn obfuscate(&self, mut location: Location, radius_m: f64) -> Location {
        let mut rng = rand::rng();
        let bearing = rng.random_range(0.0..TWO_PI).to_degrees();
        let distance = rng.random_range(0.0..=radius_m);

        let (lat, lng) = destination_point(location.lat, location.lng, bearing, distance);
        location.lat = lat.clamp(-90.0, 90.0);
        location.lng = normalize_longitude(lng);
        location.accuracy_m += radius_m;
        location
    }
}

impl Default for PrivacyFilter {
    fn default() -> Self {
        Self::new()
    }
}
