//! Common types for the AirProx environment abstraction.

use serde::{Deserialize, Serialize};

/// A WGS84 location in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a location from latitude/longitude degrees.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Linear blend between two nearby locations (`f` = 0 → self, 1 → other).
    pub fn interpolate(&self, other: &GeoPoint, f: f64) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude + (other.latitude - self.latitude) * f,
            longitude: self.longitude + (other.longitude - self.longitude) * f,
        }
    }
}

/// Air-mass velocity in m/s: the direction the air moves *towards*.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wind {
    pub east: f64,
    pub north: f64,
}

impl Wind {
    pub fn new(east: f64, north: f64) -> Self {
        Self { east, north }
    }

    /// Wind speed in m/s.
    pub fn speed(&self) -> f64 {
        self.east.hypot(self.north)
    }
}

/// Turn classification produced by the external circling estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CirclingMode {
    #[default]
    Cruise,
    Entry,
    Circling,
    Exit,
}

impl CirclingMode {
    pub fn name(&self) -> &'static str {
        match self {
            CirclingMode::Cruise => "cruise",
            CirclingMode::Entry => "entry",
            CirclingMode::Circling => "circling",
            CirclingMode::Exit => "exit",
        }
    }
}

impl std::fmt::Display for CirclingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A raw position fix as consumed by the interpolator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub location: GeoPoint,
    pub gps_altitude: f64,
    pub baro_altitude: f64,
    /// Seconds (any epoch, strictly increasing per track)
    pub time: f64,
}

/// Basic navigation state of the current fix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavState {
    pub time: f64,
    pub location: GeoPoint,
    pub gps_altitude: f64,
    pub baro_altitude: f64,
    /// Ground speed in m/s
    pub ground_speed: f64,
    pub location_available: bool,
    pub gps_altitude_available: bool,
    /// Horizontal fix accuracy (1σ, meters) if the logger reports one
    pub h_accuracy: Option<f64>,
}

/// Derived state slot owned by the external wind/circling estimators.
///
/// The analysis core only writes `estimated_wind` when the estimator
/// could not provide one (fleet-average substitution).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedState {
    pub estimated_wind: Wind,
    pub estimated_wind_available: bool,
    pub flying: bool,
    pub turn_mode: CirclingMode,
}
