//! Geographic helpers shared across the crate.
//!
//! Coordinates are `(lat, lon)` in degrees everywhere in the public API.
//! Spatial index arrays use `[lon, lat]` order to match the R-tree layout.

use geo::{HaversineDistance, Point};
use rstar::AABB;

/// Approximate meters per degree of latitude.
pub(crate) const M_PER_DEG_LAT: f64 = 111_320.0;

/// Great-circle distance in meters between two WGS84 coordinates.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2)
}

/// Arithmetic midpoint of two coordinates. Good enough at city scale.
pub fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// Radius of the disc that covers both endpoints plus a safety buffer.
pub fn coverage_radius(a: (f64, f64), b: (f64, f64), buffer_m: f64) -> f64 {
    haversine_distance(a.0, a.1, b.0, b.1) / 2.0 + buffer_m
}

/// Human-readable distance label: meters below 1 km, kilometers above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{meters:.0} m")
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Douglas-Peucker simplification of a lat/lon polyline.
///
/// Tolerance is in degrees. Polylines with fewer than three points are
/// returned unchanged.
pub fn simplify_polyline(points: &[(f64, f64)], tolerance_deg: f64) -> Vec<(f64, f64)> {
    use geo::{LineString, Simplify};

    if points.len() < 3 {
        return points.to_vec();
    }
    let line: LineString<f64> = points.iter().map(|&(lat, lon)| (lon, lat)).collect();
    line.simplify(&tolerance_deg)
        .coords()
        .map(|c| (c.y, c.x))
        .collect()
}

/// Axis-aligned viewport window in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRect {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl ViewRect {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self { south, west, north, east }
    }

    /// Build from the corner pair most map widgets report.
    pub fn from_corners(north_east: (f64, f64), south_west: (f64, f64)) -> Self {
        Self {
            south: south_west.0,
            west: south_west.1,
            north: north_east.0,
            east: north_east.1,
        }
    }

    /// Degenerate or non-finite windows are treated as "bounds unavailable".
    pub fn is_valid(&self) -> bool {
        self.south.is_finite()
            && self.west.is_finite()
            && self.north.is_finite()
            && self.east.is_finite()
            && self.north >= self.south
            && self.east >= self.west
    }

    pub(crate) fn aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.west, self.south], [self.east, self.north])
    }
}
