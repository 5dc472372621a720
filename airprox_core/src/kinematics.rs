//! Kinematic reconstruction on the 1-second trail.
//!
//! Recovers air-relative velocity, indicated airspeed and a best-effort
//! attitude (bank/pitch/yaw) from consecutive interpolated ground vectors.
//! None of this is flight-dynamics grade; the numbers feed the visibility
//! heuristic and the per-encounter traces, and implausible jumps are flagged
//! rather than corrected.

use std::collections::BTreeMap;

use airprox_env::{CirclingMode, Wind};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::airprox_interp::{GroundVector, InterpolatedState};
use crate::geodesy::{vector_bearing, wrap_angle};
use crate::visibility::Aspect;

/// ISA sea-level air density (kg/m³).
pub const SEA_LEVEL_DENSITY: f64 = 1.225;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Gravitational acceleration (default: 9.81 m/s²)
    pub gravity: f64,

    /// Wing loading used for the sideslip/yaw estimate (default: 50 kg/m²)
    pub wing_loading: f64,

    /// Lift-curve slope (default: 2π per radian)
    pub lift_curve_slope: f64,

    /// Forward acceleration above which a sample is implausible (default: 1.2 g)
    pub accel_max_plausible_g: f64,

    /// Turn load above which a sample is implausible (default: 10 g)
    pub turn_max_plausible_g: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            wing_loading: 50.0,
            lift_curve_slope: 2.0 * std::f64::consts::PI,
            accel_max_plausible_g: 1.2,
            turn_max_plausible_g: 10.0,
        }
    }
}

/// ISA troposphere density at `altitude` meters.
pub fn air_density(altitude: f64) -> f64 {
    let h = altitude.clamp(-1000.0, 40_000.0);
    SEA_LEVEL_DENSITY * (1.0 - 2.25577e-5 * h).powf(4.2559)
}

/// sqrt(ρ0/ρ(h)): true airspeed divided by indicated airspeed.
pub fn air_density_ratio(altitude: f64) -> f64 {
    (SEA_LEVEL_DENSITY / air_density(altitude)).sqrt()
}

// ============================================================================
// TRAIL POINT
// ============================================================================

/// One aircraft state per analysis second.
#[derive(Debug, Clone)]
pub struct TrailPoint {
    pub state: InterpolatedState,
    pub ground: GroundVector,
    pub turn_mode: CirclingMode,
    /// Horizontal fix accuracy reported with the underlying fix (0 = unknown)
    pub fix_accuracy: f64,
    /// True when this second coincides with a real fix
    pub actual: bool,

    /// Air-relative velocity (east, north), m/s
    pub air: Vector2<f64>,
    /// Indicated airspeed, m/s
    pub airspeed: f64,
    /// Turn rate of the air vector, rad/s
    pub turn_rate: f64,
    pub bank: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Forward acceleration in g
    pub nv: f64,
    /// Turn load in g
    pub nturn: f64,
    pub plausible: bool,

    /// Targets within visibility distance at this second, by track index
    pub aspects: BTreeMap<usize, Aspect>,
}

impl TrailPoint {
    pub fn new(
        state: InterpolatedState,
        ground: GroundVector,
        turn_mode: CirclingMode,
        fix_accuracy: f64,
        actual: bool,
    ) -> Self {
        Self {
            state,
            ground,
            turn_mode,
            fix_accuracy,
            actual,
            air: Vector2::zeros(),
            airspeed: 0.0,
            turn_rate: 0.0,
            bank: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            nv: 0.0,
            nturn: 0.0,
            plausible: true,
            aspects: BTreeMap::new(),
        }
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn within_time(&self, t0: f64, t1: f64) -> bool {
        self.state.time >= t0 && self.state.time <= t1
    }

    pub fn air_speed_true(&self) -> f64 {
        self.air.norm()
    }

    pub fn air_bearing(&self) -> f64 {
        vector_bearing(&self.air)
    }

    /// Air vector only; used for the first point of a trail.
    pub fn seed(&mut self, wind: &Wind) {
        self.air = self.ground.to_vector() - Vector2::new(wind.east, wind.north);
        self.airspeed = self.air.norm() / air_density_ratio(self.state.gps_altitude);
        self.yaw = self.air_bearing();
    }

    /// Full reconstruction against the previous second.
    pub fn reconstruct(&mut self, prev: &TrailPoint, wind: &Wind, config: &KinematicsConfig) {
        self.seed(wind);
        let g = config.gravity;
        let v = self.air.norm();
        let v_prev = prev.air.norm();

        let delta = if v == 0.0 || v_prev == 0.0 {
            0.0
        } else {
            wrap_angle(self.air_bearing() - prev.air_bearing())
        };
        self.turn_rate = 0.5 * delta + 0.5 * prev.turn_rate;
        self.bank = (self.turn_rate * v / g).atan();

        self.yaw = if self.airspeed > 1e-3 {
            let dynamic =
                0.5 * SEA_LEVEL_DENSITY * self.airspeed * self.airspeed * config.lift_curve_slope;
            wrap_angle(self.air_bearing() + config.wing_loading * g * self.bank.tan() / dynamic)
        } else {
            self.air_bearing()
        };

        self.nv = (v - v_prev) / g;
        self.plausible = self.nv.abs() <= config.accel_max_plausible_g;
        self.pitch = if self.nv.abs() < 1.0 {
            0.5 * (prev.pitch + (-self.nv).asin())
        } else {
            prev.pitch
        };

        self.nturn = (v * self.turn_rate / g).abs();
        if self.nturn > config.turn_max_plausible_g {
            self.plausible = false;
        }
    }

    pub fn aspect(&self, target: usize) -> Option<&Aspect> {
        self.aspects.get(&target)
    }

    pub fn sees(&self, target: usize) -> bool {
        self.aspects.contains_key(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn point(t: f64, speed: f64, bearing: f64) -> TrailPoint {
        let state = InterpolatedState {
            time: t,
            gps_altitude: 0.0,
            ..Default::default()
        };
        TrailPoint::new(state, GroundVector { speed, bearing }, CirclingMode::Cruise, 5.0, false)
    }

    #[test]
    fn test_air_density_ratio() {
        assert_relative_eq!(air_density_ratio(0.0), 1.0, epsilon = 1e-12);
        let r = air_density_ratio(3000.0);
        assert!(r > 1.15 && r < 1.18, "ratio at 3000 m was {r}");
    }

    #[test]
    fn test_air_vector_removes_wind() {
        let mut p = point(0.0, 30.0, 0.0);
        p.seed(&Wind::new(5.0, 0.0));
        assert_relative_eq!(p.air.x, -5.0, epsilon = 1e-9);
        assert_relative_eq!(p.air.y, 30.0, epsilon = 1e-9);
        assert_relative_eq!(p.airspeed, (30.0_f64 * 30.0 + 25.0).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_steady_turn_converges_to_turn_rate() {
        let config = KinematicsConfig::default();
        let omega = 2.0 * PI / 30.0;
        let v = 25.0;
        let mut prev = point(0.0, v, 0.0);
        prev.seed(&Wind::default());
        for i in 1..40 {
            let mut now = point(i as f64, v, wrap_angle(omega * i as f64));
            now.reconstruct(&prev, &Wind::default(), &config);
            prev = now;
        }
        assert_relative_eq!(prev.turn_rate, omega, epsilon = 1e-6);
        assert_relative_eq!(prev.bank, (omega * v / config.gravity).atan(), epsilon = 1e-6);
        assert_relative_eq!(prev.nv, 0.0, epsilon = 1e-9);
        assert!(prev.plausible);
        assert!(prev.yaw.abs() <= PI);
    }

    #[test]
    fn test_sudden_acceleration_is_implausible() {
        let config = KinematicsConfig::default();
        let mut prev = point(0.0, 10.0, 0.0);
        prev.seed(&Wind::default());
        let mut now = point(1.0, 40.0, 0.0);
        now.reconstruct(&prev, &Wind::default(), &config);
        assert!(!now.plausible);
        assert_relative_eq!(now.pitch, prev.pitch, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_air_vector_has_no_turn() {
        let config = KinematicsConfig::default();
        let mut prev = point(0.0, 0.0, 0.0);
        prev.seed(&Wind::default());
        let mut now = point(1.0, 5.0, 1.0);
        now.reconstruct(&prev, &Wind::default(), &config);
        assert_eq!(now.turn_rate, 0.0);
        assert_eq!(now.bank, 0.0);
        assert!(now.yaw.is_finite());
    }
}
