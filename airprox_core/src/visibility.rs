//! Relative aspect and see-and-avoid conspicuity heuristic.
//!
//! Frames: inertial x north, y east, z down. The body frame is reached
//! through the usual yaw-pitch-roll (ψ, θ, φ) rotation sequence.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Nominal target span (default: 10 m)
    pub target_size: f64,

    /// Targets further aft than this azimuth are hidden (default: 140°)
    pub occlusion_azimuth_deg: f64,

    /// Targets further below than this elevation are hidden (default: 20°)
    pub occlusion_depression_deg: f64,

    /// Inclination band around the horizon scanned with full attention (default: 20°)
    pub focus_inclination_deg: f64,

    /// Cone around the nose scanned with full attention (default: 30°)
    pub focus_boresight_deg: f64,

    /// Attention factor outside the focus regions (default: 0.5)
    pub peripheral_focus: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            target_size: 10.0,
            occlusion_azimuth_deg: 140.0,
            occlusion_depression_deg: 20.0,
            focus_inclination_deg: 20.0,
            focus_boresight_deg: 30.0,
            peripheral_focus: 0.5,
        }
    }
}

// ============================================================================
// ASPECT
// ============================================================================

/// Where a target appears from the observer's cockpit. Angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aspect {
    pub range: f64,
    pub elevation: f64,
    pub azimuth: f64,
    pub inclination: f64,
}

/// Inertial offset (north, east, down) of a target at `distance` meters along
/// `bearing`, `dz` = own altitude minus target altitude.
pub fn inertial_offset(distance: f64, bearing: f64, dz: f64) -> Vector3<f64> {
    Vector3::new(distance * bearing.cos(), distance * bearing.sin(), dz)
}

/// Observer attitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    pub bank: f64,
    pub pitch: f64,
    pub yaw: f64,
    rotation: Matrix3<f64>,
}

impl Default for EulerAngles {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl EulerAngles {
    pub fn new(bank: f64, pitch: f64, yaw: f64) -> Self {
        let (sf, cf) = bank.sin_cos();
        let (st, ct) = pitch.sin_cos();
        let (sp, cp) = yaw.sin_cos();
        let rotation = Matrix3::new(
            cp * ct,
            ct * sp,
            -st,
            cp * sf * st - cf * sp,
            cf * cp + sf * sp * st,
            ct * sf,
            sf * sp + cf * cp * st,
            cf * sp * st - cp * sf,
            cf * ct,
        );
        Self {
            bank,
            pitch,
            yaw,
            rotation,
        }
    }

    /// Body-from-inertial rotation.
    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn aspect(&self, x_inertial: &Vector3<f64>) -> Aspect {
        let range = x_inertial.norm();
        if range <= f64::EPSILON {
            return Aspect::default();
        }
        let body = self.rotation * x_inertial;
        Aspect {
            range,
            elevation: (-body.z / range).clamp(-1.0, 1.0).asin(),
            azimuth: body.y.atan2(body.x),
            inclination: (-x_inertial.z / range).clamp(-1.0, 1.0).asin(),
        }
    }
}

// ============================================================================
// VISIBILITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Visibility {
    /// Angle subtended by the target, radians
    pub angular_size: f64,
    /// 1 when the target is hidden by the airframe
    pub occlusion: f64,
    pub focus_factor: f64,
}

impl Visibility {
    pub fn from_aspect(aspect: &Aspect, config: &VisibilityConfig) -> Self {
        let angular_size = 2.0 * (config.target_size / 2.0).atan2(aspect.range);
        let half = angular_size / 2.0;

        let occlusion = if aspect.azimuth.abs() > config.occlusion_azimuth_deg.to_radians() + half
            || aspect.elevation < -config.occlusion_depression_deg.to_radians() - half
        {
            1.0
        } else {
            0.0
        };

        let boresight = (aspect.elevation.cos() * aspect.azimuth.abs().cos())
            .clamp(-1.0, 1.0)
            .acos();
        let focused = aspect.inclination.abs() < config.focus_inclination_deg.to_radians() + half
            || boresight < config.focus_boresight_deg.to_radians() + half;
        let focus_factor = if focused {
            1.0
        } else {
            config.peripheral_focus
        };

        Self {
            angular_size,
            occlusion,
            focus_factor,
        }
    }

    /// Combined conspicuity in [0, 1].
    pub fn score(&self) -> f64 {
        self.focus_factor * (1.0 - self.occlusion)
    }
}
