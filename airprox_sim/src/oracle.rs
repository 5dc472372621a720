//! Ground truth oracle for synthetic traffic.
//!
//! The Oracle knows where every aircraft really is and turns that into
//! recorded flights:
//! - Analytic motion (straight legs, circles drifting with the wind)
//! - Fix generation at 1 Hz with Gaussian position and altitude noise
//! - Per-flight barometric bias and optional on-ground lead-in before launch

use airprox_core::geodesy::FlatProjection;
use airprox_env::{CirclingMode, GeoPoint, ReplayRecord, ReplaySource, Wind};
use nalgebra::Vector2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::error::SimError;

/// Horizontal motion of one aircraft, in local meters (x east, y north).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Constant ground velocity
    Straight {
        start: Vector2<f64>,
        velocity: Vector2<f64>,
    },

    /// Circle whose center drifts with the wind
    Circling {
        center: Vector2<f64>,
        radius: f64,
        /// Angular rate in rad/s, positive counter-clockwise
        omega: f64,
        phase: f64,
    },
}

impl Motion {
    pub fn position(&self, t: f64, drift: &Vector2<f64>) -> Vector2<f64> {
        match *self {
            Motion::Straight { start, velocity } => start + velocity * t,
            Motion::Circling { center, radius, omega, phase } => {
                let a = phase + omega * t;
                center + drift * t + Vector2::new(a.cos(), a.sin()) * radius
            }
        }
    }

    pub fn velocity(&self, t: f64, drift: &Vector2<f64>) -> Vector2<f64> {
        match *self {
            Motion::Straight { velocity, .. } => velocity,
            Motion::Circling { radius, omega, phase, .. } => {
                let a = phase + omega * t;
                drift + Vector2::new(-a.sin(), a.cos()) * (radius * omega)
            }
        }
    }

    pub fn turn_mode(&self) -> CirclingMode {
        match self {
            Motion::Straight { .. } => CirclingMode::Cruise,
            Motion::Circling { .. } => CirclingMode::Circling,
        }
    }
}

/// A synthetic flight before noise.
#[derive(Debug, Clone)]
pub struct SyntheticFlight {
    pub id: String,
    pub type_info: String,
    pub motion: Motion,
    pub altitude: f64,

    /// Seconds after scenario start at which the aircraft takes off
    pub launch_time: f64,

    /// Altitude while on the ground before launch
    pub ground_altitude: f64,

    /// Whether the recorder supplies its own wind estimate
    pub reports_wind: bool,
}

impl SyntheticFlight {
    pub fn new(id: &str, motion: Motion, altitude: f64) -> Self {
        Self {
            id: id.to_string(),
            type_info: String::new(),
            motion,
            altitude,
            launch_time: 0.0,
            ground_altitude: 0.0,
            reports_wind: false,
        }
    }

    pub fn with_type_info(mut self, type_info: &str) -> Self {
        self.type_info = type_info.to_string();
        self
    }

    pub fn with_launch(mut self, launch_time: f64, ground_altitude: f64) -> Self {
        self.launch_time = launch_time;
        self.ground_altitude = ground_altitude;
        self
    }

    pub fn reporting_wind(mut self) -> Self {
        self.reports_wind = true;
        self
    }

    /// True position at scenario time `t` (on the ground before launch).
    pub fn position(&self, t: f64, drift: &Vector2<f64>) -> Vector2<f64> {
        self.motion.position((t - self.launch_time).max(0.0), drift)
    }

    pub fn is_flying(&self, t: f64) -> bool {
        t >= self.launch_time
    }
}

/// The Oracle - holds ground truth and generates recorded flights.
pub struct Oracle {
    seed: u64,
    rng: ChaCha8Rng,
    projection: FlatProjection,

    /// Absolute time of scenario second 0
    start_time: f64,

    wind: Wind,
    flights: Vec<SyntheticFlight>,

    position_noise_std: f64,
    altitude_noise_std: f64,
    baro_bias_std: f64,
    h_accuracy: f64,
}

impl Oracle {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            projection: FlatProjection::new(GeoPoint::new(46.5, 7.9)),
            start_time: 36_000.0,
            wind: Wind::default(),
            flights: Vec::new(),
            position_noise_std: 1.0,
            altitude_noise_std: 1.0,
            baro_bias_std: 20.0,
            h_accuracy: 5.0,
        }
    }

    pub fn with_origin(mut self, origin: GeoPoint) -> Self {
        self.projection = FlatProjection::new(origin);
        self
    }

    pub fn with_wind(mut self, wind: Wind) -> Self {
        self.wind = wind;
        self
    }

    /// Sets the horizontal and vertical noise standard deviations.
    pub fn with_noise(mut self, position_std: f64, altitude_std: f64) -> Self {
        self.position_noise_std = position_std;
        self.altitude_noise_std = altitude_std;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn wind(&self) -> Wind {
        self.wind
    }

    /// Adds a flight and returns its index.
    pub fn spawn(&mut self, flight: SyntheticFlight) -> usize {
        self.flights.push(flight);
        self.flights.len() - 1
    }

    pub fn flights(&self) -> &[SyntheticFlight] {
        &self.flights
    }

    fn drift(&self) -> Vector2<f64> {
        Vector2::new(self.wind.east, self.wind.north)
    }

    /// True horizontal separation between two flights at scenario time `t`.
    pub fn separation(&self, a: usize, b: usize, t: f64) -> Option<f64> {
        let drift = self.drift();
        let pa = self.flights.get(a)?.position(t, &drift);
        let pb = self.flights.get(b)?.position(t, &drift);
        Some((pa - pb).norm())
    }

    /// Closest true approach of two flights over whole seconds in
    /// [0, duration]: (distance, scenario time).
    pub fn closest_approach(&self, a: usize, b: usize, duration: u32) -> Option<(f64, f64)> {
        (0..=duration)
            .filter_map(|i| self.separation(a, b, i as f64).map(|d| (d, i as f64)))
            .min_by(|x, y| x.0.total_cmp(&y.0))
    }

    /// Samples every flight at 1 Hz for `duration` seconds.
    pub fn generate(&mut self, duration: u32) -> Result<Vec<ReplaySource>, SimError> {
        let normal = |std: f64| Normal::new(0.0, std).map_err(|e| SimError::noise(e.to_string()));
        let h_noise = normal(self.position_noise_std)?;
        let v_noise = normal(self.altitude_noise_std)?;
        let bias = normal(self.baro_bias_std)?;
        let drift = self.drift();

        let mut sources = Vec::with_capacity(self.flights.len());
        for flight in &self.flights {
            let baro_bias = bias.sample(&mut self.rng);
            let mut records = Vec::with_capacity(duration as usize + 1);
            for i in 0..=duration {
                let t = i as f64;
                let flying = flight.is_flying(t);
                let noise =
                    Vector2::new(h_noise.sample(&mut self.rng), h_noise.sample(&mut self.rng));
                let location = self.projection.unproject(&(flight.position(t, &drift) + noise));
                let altitude = if flying { flight.altitude } else { flight.ground_altitude };
                let gps_altitude = altitude + v_noise.sample(&mut self.rng);

                let mut record = ReplayRecord::new(
                    self.start_time + t,
                    location.latitude,
                    location.longitude,
                    gps_altitude,
                );
                record.baro_altitude = Some(altitude + baro_bias + v_noise.sample(&mut self.rng));
                record.h_accuracy = Some(self.h_accuracy);
                record.flying = flying;
                if flying {
                    let local_t = t - flight.launch_time;
                    record.ground_speed = flight.motion.velocity(local_t, &drift).norm();
                    record.turn_mode = flight.motion.turn_mode();
                    if flight.reports_wind {
                        record.wind = Some(self.wind);
                    }
                } else {
                    record.ground_speed = 0.0;
                }
                records.push(record);
            }
            debug!("Generated {} fixes for {}", records.len(), flight.id);
            let source = ReplaySource::new(flight.id.clone(), records)?
                .with_type_info(flight.type_info.clone());
            sources.push(source);
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airprox_env::FlightSource;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn straight(x: f64, y: f64, vx: f64, vy: f64) -> Motion {
        Motion::Straight {
            start: Vector2::new(x, y),
            velocity: Vector2::new(vx, vy),
        }
    }

    #[test]
    fn test_circling_motion_stays_on_radius() {
        let m = Motion::Circling {
            center: Vector2::zeros(),
            radius: 60.0,
            omega: 0.25,
            phase: 1.0,
        };
        let drift = Vector2::new(3.0, 1.0);
        for i in 0..50 {
            let t = i as f64;
            let rel = m.position(t, &drift) - drift * t;
            assert_relative_eq!(rel.norm(), 60.0, epsilon = 1e-9);
            let v_rel = m.velocity(t, &drift) - drift;
            assert_relative_eq!(v_rel.norm(), 15.0, epsilon = 1e-9);
            assert_relative_eq!(rel.dot(&v_rel), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_closest_approach_of_crossing_tracks() {
        let mut oracle = Oracle::new(1);
        let a = oracle.spawn(SyntheticFlight::new("A", straight(-500.0, 0.0, 25.0, 0.0), 1000.0));
        let b = oracle.spawn(SyntheticFlight::new(
            "B",
            straight(-500.0, 190.0, 25.0, -9.5),
            1000.0,
        ));
        let (d, t) = oracle.closest_approach(a, b, 100).unwrap();
        assert_relative_eq!(d, 0.0, epsilon = 1e-9);
        assert_eq!(t, 20.0);
        assert!(oracle.separation(a, 7, 0.0).is_none());
    }

    #[test]
    fn test_generate_is_deterministic() {
        let build = |seed| {
            let mut oracle = Oracle::new(seed);
            oracle.spawn(SyntheticFlight::new("A", straight(0.0, 0.0, 20.0, 0.0), 1000.0));
            oracle.generate(30).unwrap()
        };
        let a = build(42)[0].to_trace();
        let b = build(42)[0].to_trace();
        let c = build(43)[0].to_trace();
        assert_eq!(a.records, b.records);
        assert_ne!(a.records, c.records);
        assert_eq!(a.records.len(), 31);
    }

    #[test]
    fn test_late_launch_is_on_ground_first() {
        let mut oracle = Oracle::new(7).with_noise(0.0, 0.0);
        oracle.spawn(
            SyntheticFlight::new("L", straight(0.0, 0.0, 30.0, 0.0), 900.0)
                .with_type_info("LS8")
                .with_launch(10.0, 350.0),
        );
        let sources = oracle.generate(20).unwrap();
        let source = &sources[0];
        assert_eq!(source.type_info(), "LS8");

        let trace = source.to_trace();
        assert!(!trace.records[9].flying);
        assert_eq!(trace.records[9].gps_altitude, 350.0);
        assert_eq!(trace.records[9].ground_speed, 0.0);
        assert!(trace.records[10].flying);
        assert_eq!(trace.records[10].gps_altitude, 900.0);
        assert_relative_eq!(trace.records[15].ground_speed, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wind_only_from_reporting_flights() {
        let mut oracle = Oracle::new(3).with_wind(Wind::new(3.0, 1.0));
        oracle.spawn(
            SyntheticFlight::new("W", straight(0.0, 0.0, 20.0, 0.0), 1000.0).reporting_wind(),
        );
        oracle.spawn(SyntheticFlight::new("N", straight(0.0, 100.0, 20.0, 0.0), 1000.0));
        let sources = oracle.generate(5).unwrap();
        assert!(sources[0].to_trace().records.iter().all(|r| r.wind == Some(Wind::new(3.0, 1.0))));
        assert!(sources[1].to_trace().records.iter().all(|r| r.wind.is_none()));
    }

    proptest! {
        #[test]
        fn test_noisy_fixes_stay_near_truth(
            seed in any::<u64>(),
            vx in -40.0f64..40.0,
            vy in -40.0f64..40.0,
        ) {
            let mut oracle = Oracle::new(seed);
            let projection = oracle.projection;
            let drift = Vector2::zeros();
            oracle.spawn(SyntheticFlight::new("P", straight(0.0, 0.0, vx, vy), 1000.0));
            let trace = oracle.generate(20).unwrap()[0].to_trace();
            prop_assert_eq!(trace.records.len(), 21);
            for (i, r) in trace.records.iter().enumerate() {
                let truth = oracle.flights()[0].position(i as f64, &drift);
                let fix = projection.project(&GeoPoint::new(r.latitude, r.longitude));
                prop_assert!((fix - truth).norm() < 10.0);
                prop_assert_eq!(r.time, oracle.start_time() + i as f64);
            }
        }
    }
}
