//! The "INTERPOLATION" Engine - continuous-time reconstruction of a track
//!
//! Raw fixes arrive at irregular rates (1-4 s typical). The analysis runs on
//! a fixed 1-second clock, so every track keeps a sliding window of the four
//! most recent fixes and evaluates a Catmull-Rom spline between the two
//! central ones.
//!
//! Latitude/longitude are blended component-wise; over a few seconds of
//! flight the curvature of the earth is irrelevant.

use airprox_env::{GeoPoint, TrajectorySample};
use nalgebra::Vector2;

use crate::geodesy;

/// Default spline tension (centripetal Catmull-Rom).
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Tolerance for treating an evaluation time as a real fix (seconds).
const ACTUAL_TOLERANCE: f64 = 0.01;

/// Half-width of the finite difference used for the track bearing (seconds).
const BEARING_HALF_STEP: f64 = 0.25;

/// Interpolated state at an arbitrary time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterpolatedState {
    pub location: GeoPoint,
    pub gps_altitude: f64,
    pub baro_altitude: f64,
    pub time: f64,
}

/// Ground track: speed (m/s) along a bearing (radians).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroundVector {
    pub speed: f64,
    pub bearing: f64,
}

impl GroundVector {
    /// (east, north) velocity.
    pub fn to_vector(&self) -> Vector2<f64> {
        geodesy::polar_vector(self.bearing, self.speed)
    }
}

/// Four-sample Catmull-Rom interpolator.
#[derive(Debug, Clone)]
pub struct CatmullRomInterpolator {
    alpha: f64,
    samples: [TrajectorySample; 4],
    count: usize,
}

impl Default for CatmullRomInterpolator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl CatmullRomInterpolator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            samples: [TrajectorySample::default(); 4],
            count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Appends a fix, evicting the oldest. Returns `false` (and keeps the
    /// window untouched) when the fix is not newer than the latest one held.
    pub fn push(&mut self, sample: TrajectorySample) -> bool {
        if self.count > 0 && sample.time <= self.samples[3].time {
            return false;
        }
        if self.count < 4 {
            self.count += 1;
        }
        self.samples.rotate_left(1);
        self.samples[3] = sample;
        true
    }

    pub fn ready(&self) -> bool {
        self.count == 4
    }

    /// True when the window must be refilled before `t` can be evaluated.
    pub fn need_data(&self, t: f64) -> bool {
        !self.ready() || self.samples[2].time <= t
    }

    /// True when `t` coincides with one of the two central fixes.
    pub fn is_actual(&self, t: f64) -> bool {
        self.ready()
            && ((t - self.samples[1].time).abs() < ACTUAL_TOLERANCE
                || (t - self.samples[2].time).abs() < ACTUAL_TOLERANCE)
    }

    pub fn min_time(&self) -> Option<f64> {
        self.ready().then(|| self.samples[0].time)
    }

    pub fn max_time(&self) -> Option<f64> {
        self.ready()
            .then(|| self.samples.iter().fold(0.0_f64, |m, s| m.max(s.time)))
    }

    fn time_fraction(&self, t: f64) -> f64 {
        let (t1, t2) = (self.samples[1].time, self.samples[2].time);
        ((t - t1) / (t2 - t1)).clamp(0.0, 1.0)
    }

    fn coefficients(&self, u: f64) -> [f64; 4] {
        let a = self.alpha;
        let u2 = u * u;
        let u3 = u2 * u;
        [
            -a * u3 + 2.0 * a * u2 - a * u,
            (2.0 - a) * u3 + (a - 3.0) * u2 + 1.0,
            (a - 2.0) * u3 + (3.0 - 2.0 * a) * u2 + a * u,
            a * u3 - a * u2,
        ]
    }

    /// Spline evaluation at `t` (clamped to the central segment).
    pub fn interpolate(&self, t: f64) -> Option<InterpolatedState> {
        if !self.ready() {
            return None;
        }
        let c = self.coefficients(self.time_fraction(t));
        let blend = |f: fn(&TrajectorySample) -> f64| -> f64 {
            self.samples.iter().zip(c.iter()).map(|(s, k)| f(s) * k).sum()
        };
        Some(InterpolatedState {
            location: GeoPoint::new(
                blend(|s| s.location.latitude),
                blend(|s| s.location.longitude),
            ),
            gps_altitude: blend(|s| s.gps_altitude),
            baro_altitude: blend(|s| s.baro_altitude),
            time: t,
        })
    }

    /// Ground track at `t`. Zero when the central segment has no duration
    /// or the aircraft did not move.
    pub fn ground_vector(&self, t: f64) -> Option<GroundVector> {
        if !self.ready() {
            return None;
        }
        let [p0, p1, p2, _] = &self.samples;
        if p2.time - p1.time <= 0.0 || p1.time - p0.time <= 0.0 {
            return Some(GroundVector::default());
        }

        let u = self.time_fraction(t);
        let speed2 = geodesy::distance(&p1.location, &p2.location) / (p2.time - p1.time);
        let speed1 = geodesy::distance(&p0.location, &p1.location) / (p1.time - p0.time);

        let r0 = self.interpolate(t - BEARING_HALF_STEP)?;
        let r1 = self.interpolate(t + BEARING_HALF_STEP)?;
        if r0.location == r1.location {
            return Some(GroundVector::default());
        }

        Some(GroundVector {
            speed: speed2 * u + speed1 * (1.0 - u),
            bearing: geodesy::bearing(&r0.location, &r1.location),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(time: f64, lat: f64, lon: f64, alt: f64) -> TrajectorySample {
        TrajectorySample {
            location: GeoPoint::new(lat, lon),
            gps_altitude: alt,
            baro_altitude: alt - 10.0,
            time,
        }
    }

    fn linear_window() -> CatmullRomInterpolator {
        let mut interp = CatmullRomInterpolator::default();
        for i in 0..4 {
            let k = i as f64;
            assert!(interp.push(sample(
                10.0 + k,
                47.0 + 0.001 * k,
                8.0 + 0.002 * k,
                1000.0 + 5.0 * k
            )));
        }
        interp
    }

    #[test]
    fn test_not_ready_before_four_samples() {
        let mut interp = CatmullRomInterpolator::default();
        for i in 0..3 {
            assert!(interp.need_data(0.0));
            assert!(!interp.ready());
            assert!(interp.interpolate(0.0).is_none());
            interp.push(sample(i as f64, 47.0, 8.0, 1000.0));
        }
        assert!(!interp.ready());
        assert!(interp.min_time().is_none());
        interp.push(sample(3.0, 47.0, 8.0, 1000.0));
        assert!(interp.ready());
    }

    #[test]
    fn test_rejects_non_increasing_time() {
        let mut interp = linear_window();
        assert!(!interp.push(sample(13.0, 0.0, 0.0, 0.0)));
        assert!(!interp.push(sample(12.5, 0.0, 0.0, 0.0)));
        assert_eq!(interp.max_time(), Some(13.0));
        assert_eq!(interp.min_time(), Some(10.0));
    }

    #[test]
    fn test_linear_samples_interpolate_exactly() {
        let interp = linear_window();
        for step in 0..=10 {
            let f = step as f64 / 10.0;
            let r = interp.interpolate(11.0 + f).unwrap();
            assert_relative_eq!(r.location.latitude, 47.001 + 0.001 * f, epsilon = 1e-12);
            assert_relative_eq!(r.location.longitude, 8.002 + 0.002 * f, epsilon = 1e-12);
            assert_relative_eq!(r.gps_altitude, 1005.0 + 5.0 * f, epsilon = 1e-9);
            assert_relative_eq!(r.baro_altitude, 995.0 + 5.0 * f, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_interpolation_clamps_outside_central_segment() {
        let interp = linear_window();
        let before = interp.interpolate(5.0).unwrap();
        let after = interp.interpolate(20.0).unwrap();
        assert_relative_eq!(before.gps_altitude, 1005.0, epsilon = 1e-9);
        assert_relative_eq!(after.gps_altitude, 1010.0, epsilon = 1e-9);
    }

    #[test]
    fn test_need_data_and_is_actual() {
        let interp = linear_window();
        assert!(!interp.need_data(11.5));
        assert!(interp.need_data(12.0));
        assert!(interp.is_actual(11.0));
        assert!(interp.is_actual(12.005));
        assert!(!interp.is_actual(11.5));
        assert!(!interp.is_actual(11.02));
    }

    #[test]
    fn test_ground_vector_straight_track() {
        let mut interp = CatmullRomInterpolator::default();
        let origin = GeoPoint::new(47.0, 8.0);
        for i in 0..4 {
            let p = geodesy::destination(&origin, 0.0, 30.0 * i as f64);
            interp.push(TrajectorySample {
                location: p,
                gps_altitude: 1000.0,
                baro_altitude: 1000.0,
                time: i as f64,
            });
        }
        let gv = interp.ground_vector(1.5).unwrap();
        assert_relative_eq!(gv.speed, 30.0, epsilon = 1e-3);
        assert_relative_eq!(gv.bearing, 0.0, epsilon = 1e-6);

        let v = gv.to_vector();
        assert_relative_eq!(v.y, 30.0, epsilon = 1e-3);
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_ground_vector_stationary_is_zero() {
        let mut interp = CatmullRomInterpolator::default();
        for i in 0..4 {
            interp.push(sample(i as f64, 47.0, 8.0, 1000.0));
        }
        assert_eq!(interp.ground_vector(1.5), Some(GroundVector::default()));
    }
}
