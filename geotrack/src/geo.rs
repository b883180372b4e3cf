//! Great-circle distance, bearing, and polygon membership primitives.
//!
//! These are pure functions shared by every engine that needs to reason about
//! geography: the odometer in the tracking coordinator, geofence membership
//! tests, trip distance accumulation, and privacy-zone matching.
//!
//! `validate_coords`'s range checks and typed `CoordError` follow the shape of
//! the teacher's `coord::mod::to_tile_coords`, which validates lat/lon/zoom
//! the same way before doing any tile math.

use std::f64::consts::PI;

/// Mean Earth radius in meters, matching the value used throughout the
/// geofencing literature (and this crate's reference implementations).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Errors raised when validating raw coordinate input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordError {
    #[error("latitude {0} out of range [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} out of range [-180, 180]")]
    InvalidLongitude(f64),
    #[error("radius must be positive, got {0}")]
    InvalidRadius(f64),
    #[error("polygon must have at least 3 vertices, got {0}")]
    InvalidPolygon(usize),
}

/// Validate a (lat, lng) pair per spec invariants.
pub fn validate_coords(lat: f64, lng: f64) -> Result<(), CoordError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(CoordError::InvalidLongitude(lng));
    }
    Ok(())
}

/// Great-circle distance between two points, in meters (haversine formula).
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lng2 - lng1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from point 1 to point 2, in degrees [0, 360).
pub fn bearing_deg(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lng2 - lng1).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
    let theta = y.atan2(x);
    (theta.to_degrees() + 360.0) % 360.0
}

/// Destination point given a start, bearing (degrees), and distance (meters).
///
/// Used by `PrivacyFilter` to compute an obfuscated fix at a random bearing
/// and distance within the configured obfuscation radius.
pub fn destination_point(lat: f64, lng: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let angular_distance = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lng.to_radians();

    let phi2 = (phi1.sin() * angular_distance.cos()
        + phi1.cos() * angular_distance.sin() * theta.cos())
    .asin();
    let lambda2 = lambda1
        + (theta.sin() * angular_distance.sin() * phi1.cos())
            .atan2(angular_distance.cos() - phi1.sin() * phi2.sin());

    let lat2 = phi2.to_degrees().clamp(-90.0, 90.0);
    let lng2 = normalize_longitude(lambda2.to_degrees());
    (lat2, lng2)
}

/// Normalize a longitude value into [-180, 180].
pub fn normalize_longitude(lng: f64) -> f64 {
    let mut l = lng;
    while l > 180.0 {
        l -= 360.0;
    }
    while l < -180.0 {
        l += 360.0;
    }
    l
}

/// A simple (lat, lng) vertex, used for polygon geofences and route polylines.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Ray-casting point-in-polygon test. The vertex list is treated as a closed
/// ring (the edge from the last vertex back to the first is included).
///
/// On-edge points count as inside, per spec §4.2.
pub fn point_in_polygon(point: Point, vertices: &[Point]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let n = vertices.len();
    let mut inside = false;

    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];

        if point_on_segment(point, a, b) {
            return true;
        }

        let crosses = (a.lat > point.lat) != (b.lat > point.lat);
        if crosses {
            let x_intersect =
                (b.lng - a.lng) * (point.lat - a.lat) / (b.lat - a.lat) + a.lng;
            if point.lng < x_intersect {
                inside = !inside;
            }
        }
    }

    inside
}

fn point_on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.lat - a.lat) * (p.lng - a.lng) - (b.lng - a.lng) * (p.lat - a.lat);
    if cross.abs() > 1e-12 {
        return false;
    }
    let within_lat = p.lat >= a.lat.min(b.lat) && p.lat <= a.lat.max(b.lat);
    let within_lng = p.lng >= a.lng.min(b.lng) && p.lng <= a.lng.max(b.lng);
    within_lat && within_lng
}

/// Axis-aligned bounding box, used to cheaply reject polygon membership
/// checks for large monitored sets (spec §9 "Polygon performance").
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn of(vertices: &[Point]) -> Self {
        let mut bbox = Self {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lng: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        for v in vertices {
            bbox.min_lat = bbox.min_lat.min(v.lat);
            bbox.max_lat = bbox.max_lat.max(v.lat);
            bbox.min_lng = bbox.min_lng.min(v.lng);
            bbox.max_lng = bbox.max_lng.max(v.lng);
        }
        bbox
    }

    pub fn contains(&self, p: Point) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lng >= self.min_lng && p.lng <= self.max_lng
    }
}

/// Shortest distance from a point to a great-circle segment, approximated by
/// projecting onto the flat chord between the segment endpoints (adequate at
/// the sub-city scales route deviation detection operates at) and clamping
/// the projection to the segment.
pub fn distance_to_segment_m(p: Point, a: Point, b: Point) -> f64 {
    // Work in a local equirectangular projection centered on `a` so we can
    // do plain 2D projection math, then convert the closest point back to
    // haversine distance for the final answer.
    let lat0 = a.lat.to_radians();
    let to_xy = |pt: Point| -> (f64, f64) {
        let x = (pt.lng - a.lng).to_radians() * lat0.cos() * EARTH_RADIUS_M;
        let y = (pt.lat - a.lat).to_radians() * EARTH_RADIUS_M;
        (x, y)
    };

    let (ax, ay) = to_xy(a);
    let (bx, by) = to_xy(b);
    let (px, py) = to_xy(p);

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let (closest_lat, closest_lng) = if len_sq < 1e-9 {
        (a.lat, a.lng)
    } else {
        let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
        let cx = ax + t * dx;
        let cy = ay + t * dy;
        // Convert back from local projection to lat/lng.
        let lat = a.lat + (cy / EARTH_RADIUS_M).to_degrees();
        let lng = a.lng + (cx / (EARTH_RADIUS_M * lat0.cos())).to_degrees();
        (lat, lng)
    };

    haversine_distance_m(p.lat, p.lng, closest_lat, closest_lng)
}

/// PI re-exported for callers doing their own angular math (e.g. random
/// bearing sampling in the privacy filter).
pub const TWO_PI: f64 = 2.0 * PI;
