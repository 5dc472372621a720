//! Geodesy helpers: great-circle distance/bearing on WGS84 locations and a
//! local flat (equirectangular) projection in meters.
//!
//! Angles returned from this module are in radians; bearings follow the
//! navigation convention (0 = north, clockwise positive, `atan2(east, north)`).

use airprox_env::GeoPoint;
use geo::{HaversineBearing, HaversineDestination, HaversineDistance, Point};
use nalgebra::Vector2;
use std::f64::consts::PI;

/// Mean earth radius used by the haversine functions (meters).
pub const EARTH_RADIUS: f64 = 6_371_008.8;

fn to_point(p: &GeoPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

fn from_point(p: Point<f64>) -> GeoPoint {
    GeoPoint::new(p.y(), p.x())
}

/// Great-circle distance in meters.
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    to_point(a).haversine_distance(&to_point(b))
}

/// Initial great-circle bearing from `a` to `b`, radians in (-π, π].
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    wrap_angle(to_point(a).haversine_bearing(to_point(b)).to_radians())
}

/// Location reached from `origin` travelling `distance` meters along `bearing` (radians).
pub fn destination(origin: &GeoPoint, bearing: f64, distance: f64) -> GeoPoint {
    from_point(to_point(origin).haversine_destination(bearing.to_degrees(), distance))
}

/// Midpoint of two nearby locations.
pub fn midpoint(a: &GeoPoint, b: &GeoPoint) -> GeoPoint {
    a.interpolate(b, 0.5)
}

/// Wraps an angle into (-π, π].
pub fn wrap_angle(a: f64) -> f64 {
    let mut r = a % (2.0 * PI);
    if r > PI {
        r -= 2.0 * PI;
    } else if r <= -PI {
        r += 2.0 * PI;
    }
    r
}

/// Bearing of an (east, north) vector, radians. Zero for the zero vector.
pub fn vector_bearing(v: &Vector2<f64>) -> f64 {
    if v.x == 0.0 && v.y == 0.0 {
        return 0.0;
    }
    v.x.atan2(v.y)
}

/// (east, north) vector of magnitude `norm` pointing along `bearing`.
pub fn polar_vector(bearing: f64, norm: f64) -> Vector2<f64> {
    Vector2::new(norm * bearing.sin(), norm * bearing.cos())
}

// ============================================================================
// FLAT PROJECTION
// ============================================================================

/// Equirectangular projection around an origin, output in meters
/// (x = east, y = north).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatProjection {
    origin: GeoPoint,
    cos_lat: f64,
}

impl FlatProjection {
    pub fn new(origin: GeoPoint) -> Self {
        let cos_lat = origin.latitude.to_radians().cos().max(1e-6);
        Self { origin, cos_lat }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn project(&self, p: &GeoPoint) -> Vector2<f64> {
        let x = (p.longitude - self.origin.longitude).to_radians() * self.cos_lat * EARTH_RADIUS;
        let y = (p.latitude - self.origin.latitude).to_radians() * EARTH_RADIUS;
        Vector2::new(x, y)
    }

    pub fn unproject(&self, v: &Vector2<f64>) -> GeoPoint {
        GeoPoint::new(
            self.origin.latitude + (v.y / EARTH_RADIUS).to_degrees(),
            self.origin.longitude + (v.x / (EARTH_RADIUS * self.cos_lat)).to_degrees(),
        )
    }
}

impl Default for FlatProjection {
    fn default() -> Self {
        Self::new(GeoPoint::default())
    }
}

// ============================================================================
// BOUNDS
// ============================================================================

/// Latitude/longitude half-extent of a square of `range` meters around a
/// reference location, used for cheap rejection tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoDelta {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoDelta {
    pub fn around(reference: &GeoPoint, range: f64) -> Self {
        let corner = destination(reference, -PI / 4.0, range * std::f64::consts::SQRT_2);
        Self {
            latitude: (corner.latitude - reference.latitude).abs(),
            longitude: (corner.longitude - reference.longitude).abs(),
        }
    }
}

/// Axis-aligned lat/lon box.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl GeoBounds {
    /// Degenerate box holding a single location.
    pub fn from_point(p: &GeoPoint) -> Self {
        Self {
            west: p.longitude,
            east: p.longitude,
            north: p.latitude,
            south: p.latitude,
        }
    }

    pub fn around(center: &GeoPoint, delta: &GeoDelta) -> Self {
        Self {
            west: center.longitude - delta.longitude,
            east: center.longitude + delta.longitude,
            north: center.latitude + delta.latitude,
            south: center.latitude - delta.latitude,
        }
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.longitude >= self.west
            && p.longitude <= self.east
            && p.latitude >= self.south
            && p.latitude <= self.north
    }

    pub fn extend(&mut self, p: &GeoPoint) {
        self.west = self.west.min(p.longitude);
        self.east = self.east.max(p.longitude);
        self.south = self.south.min(p.latitude);
        self.north = self.north.max(p.latitude);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        assert_relative_eq!(distance(&a, &b), EARTH_RADIUS * PI / 180.0, max_relative = 1e-9);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let a = GeoPoint::new(47.0, 8.0);
        assert_relative_eq!(bearing(&a, &GeoPoint::new(47.01, 8.0)), 0.0, epsilon = 1e-6);
        assert_relative_eq!(bearing(&a, &GeoPoint::new(47.0, 8.01)), PI / 2.0, epsilon = 1e-3);
        assert_relative_eq!(bearing(&a, &GeoPoint::new(47.0, 7.99)), -PI / 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_destination_round_trip_distance() {
        let a = GeoPoint::new(46.0, 7.0);
        let b = destination(&a, 1.0, 1500.0);
        assert_relative_eq!(distance(&a, &b), 1500.0, epsilon = 1e-3);
        assert_relative_eq!(bearing(&a, &b), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_matches_haversine_locally() {
        let proj = FlatProjection::new(GeoPoint::new(47.0, 8.0));
        let p = GeoPoint::new(47.003, 8.004);
        let v = proj.project(&p);
        assert_relative_eq!(v.norm(), distance(&proj.origin(), &p), max_relative = 1e-3);

        let back = proj.unproject(&v);
        assert_relative_eq!(back.latitude, p.latitude, epsilon = 1e-12);
        assert_relative_eq!(back.longitude, p.longitude, epsilon = 1e-12);
    }

    #[test]
    fn test_bounds_contains() {
        let c = GeoPoint::new(47.0, 8.0);
        let bounds = GeoBounds::around(&c, &GeoDelta::around(&c, 100.0));
        assert!(bounds.contains(&destination(&c, 0.3, 90.0)));
        assert!(!bounds.contains(&destination(&c, 0.0, 150.0)));
        assert!(!bounds.contains(&destination(&c, PI / 2.0, 150.0)));
    }
}
