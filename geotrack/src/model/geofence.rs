//! Geofence data model: circular and polygon regions, plus the persisted
//! set wrapper used by `GeofenceEngine`'s store.
//!
//! Grounded on the `cyrinux-network-dmenu` geofencing module's
//! `GeofenceZone` shape (id, center, radius, notification flags).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geo::{CoordError, Point};

/// A circular geofence, per spec §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub identifier: String,
    pub center: Point,
    pub radius_m: f64,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
    pub notify_on_dwell: bool,
    pub loitering_delay: Option<Duration>,
    pub initial_trigger: bool,
    pub extras: serde_json::Value,
}

impl Geofence {
    pub fn new(identifier: impl Into<String>, center: Point, radius_m: f64) -> Result<Self, CoordError> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(CoordError::InvalidPolygon(0));
        }
        if radius_m <= 0.0 {
            return Err(CoordError::InvalidRadius(radius_m));
        }
        Ok(Self {
            identifier,
            center,
            radius_m,
            notify_on_entry: true,
            notify_on_exit: true,
            notify_on_dwell: false,
            loitering_delay: None,
            initial_trigger: false,
            extras: serde_json::Value::Null,
        })
    }
}

/// A polygon geofence, per spec §3. Vertices are assumed simple and
/// non-self-intersecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeofence {
    pub identifier: String,
    pub vertices: Vec<Point>,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
    pub notify_on_dwell: bool,
    pub loitering_delay: Option<Duration>,
    pub initial_trigger: bool,
}

impl PolygonGeofence {
    pub fn new(identifier: impl Into<String>, vertices: Vec<Point>) -> Result<Self, CoordError> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(CoordError::InvalidPolygon(0));
        }
        if vertices.len() < 3 {
            return Err(CoordError::InvalidPolygon(vertices.len()));
        }
        Ok(Self {
            identifier,
            vertices,
            notify_on_entry: true,
            notify_on_exit: true,
            notify_on_dwell: false,
            loitering_delay: None,
            initial_trigger: false,
        })
    }
}

/// A monitored region, either circular or polygonal. `GeofenceEngine` stores
/// these uniformly and dispatches membership tests by variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MonitoredRegion {
    Circular(Geofence),
    Polygon(PolygonGeofence),
}

impl MonitoredRegion {
    pub fn identifier(&self) -> &str {
        match self {
            MonitoredRegion::Circular(g) => &g.identifier,
            MonitoredRegion::Polygon(p) => &p.identifier,
        }
    }
}

/// The full persisted geofence set, versioned so future schema changes can
/// be detected on load (see SPEC_FULL.md §2 "Persisted-state versioning").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceSet {
    pub schema_version: u32,
    pub regions: Vec<MonitoredRegion>,
}

impl GeofenceSet {
    pub const CURRENT_SCHEMA_VERSION: u32 = 1;

    pub fn new(regions: Vec<MonitoredRegion>) -> Self {
        Self {
            schema_version: Self::CURRENT_SCHEMA_VERSION,
            regions,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.schema_version <= Self::CURRENT_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geofence_rejects_non_positive_radius() {
        assert!(Geofence::new("home", Point::new(0.0, 0.0), 0.0).is_err());
    }

    #[test]
    fn polygon_rejects_fewer_than_three_vertices() {
        let verts = vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        assert!(PolygonGeofence::new("zone", verts).is_err());
    }

    #[test]
    fn geofence_set_round_trips() {
        let g = Geofence::new("home", Point::new(1.0, 2.0), 100.0).unwrap();
        let set = GeofenceSet::new(vec![MonitoredRegion::Circular(g)]);
        let json = serde_json::to_string(&set).unwrap();
        let back: GeofenceSet = serde_json::from_str(&json).unwrap();
        assert!(back.is_compatible());
        assert_eq!(back.regions.len(), 1);
    }
}
