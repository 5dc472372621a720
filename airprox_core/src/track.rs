//! One aircraft: its flight source, interpolation window, bounded 1-second
//! trail and bookkeeping (flight start/end, baro offset, penalties).

use std::collections::VecDeque;

use airprox_env::{CirclingMode, FlightSource, GeoPoint, TrajectorySample, Wind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::airprox_interp::{CatmullRomInterpolator, InterpolatedState, DEFAULT_ALPHA};
use crate::averager::Averager;
use crate::geodesy;
use crate::kinematics::{KinematicsConfig, TrailPoint};
use crate::report::AircraftSummary;
use crate::visibility::{inertial_offset, Aspect, EulerAngles};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Catmull-Rom tension (default: 0.5)
    pub alpha: f64,

    /// Tracks below this baro altitude are not analysed (default: 400 m)
    pub min_valid_altitude: f64,

    /// Baro offset correction gain per fix (default: 0.05)
    pub baro_gain: f64,

    /// Weight of baro in the mixed altitude statistic (default: 0.5)
    pub baro_mix: f64,

    /// Maximum trail length in seconds (default: 97)
    pub trail_capacity: usize,

    /// Vertical accuracy (1σ) assumed for every track (default: 5 m)
    pub v_accuracy: f64,

    /// Below this ground speed near the start point a fix counts as landed (default: 20 m/s)
    pub landing_speed: f64,

    /// Radius around the flight start for landing detection (default: 2500 m)
    pub landing_radius: f64,

    pub kinematics: KinematicsConfig,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            min_valid_altitude: 400.0,
            baro_gain: 0.05,
            baro_mix: 0.5,
            trail_capacity: 97,
            v_accuracy: 5.0,
            landing_speed: 20.0,
            landing_radius: 2500.0,
            kinematics: KinematicsConfig::default(),
        }
    }
}

// ============================================================================
// AIRCRAFT TRACK
// ============================================================================

pub struct AircraftTrack {
    index: usize,
    id: String,
    type_info: String,
    source: Box<dyn FlightSource>,
    source_ok: bool,
    config: TrackConfig,

    interpolator: CatmullRomInterpolator,
    trail: VecDeque<TrailPoint>,
    current: Option<InterpolatedState>,
    previous: Option<InterpolatedState>,
    euler: EulerAngles,

    /// Interpolated at the current step
    pub valid: bool,
    /// Valid and above the altitude gate at the current step
    pub live: bool,
    /// Has been live at least once
    pub ever_live: bool,
    /// Involved in an encounter finalised since the last status line
    pub mark: bool,
    pub in_flock: bool,

    pub penalty: f64,
    pub n_encounters: u32,
    h_accuracy: Option<f64>,

    flight_loc_start: Option<GeoPoint>,
    flight_time_start: Option<f64>,
    flight_time_end: Option<f64>,
    flight_num_records: u32,
    alt_start: Averager,
    alt_end: Averager,

    baro_offset: f64,
    baro_error: Averager,
}

impl std::fmt::Debug for AircraftTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AircraftTrack")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("valid", &self.valid)
            .field("live", &self.live)
            .field("trail", &self.trail.len())
            .finish()
    }
}

impl AircraftTrack {
    pub fn new(index: usize, source: Box<dyn FlightSource>, config: TrackConfig) -> Self {
        let id = source.identifier().to_string();
        let type_info = source.type_info().to_string();
        Self {
            index,
            id,
            type_info,
            source,
            source_ok: true,
            interpolator: CatmullRomInterpolator::new(config.alpha),
            config,
            trail: VecDeque::new(),
            current: None,
            previous: None,
            euler: EulerAngles::default(),
            valid: false,
            live: false,
            ever_live: false,
            mark: false,
            in_flock: false,
            penalty: 0.0,
            n_encounters: 0,
            h_accuracy: None,
            flight_loc_start: None,
            flight_time_start: None,
            flight_time_end: None,
            flight_num_records: 0,
            alt_start: Averager::new(),
            alt_end: Averager::new(),
            baro_offset: 0.0,
            baro_error: Averager::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_info(&self) -> &str {
        &self.type_info
    }

    /// Rewinds the source and clears all per-run state.
    pub fn reset(&mut self) {
        self.source.rewind();
        self.source.calculated_mut().estimated_wind = Wind::default();
        self.source_ok = true;
        self.interpolator.reset();
        self.trail.clear();
        self.current = None;
        self.previous = None;
        self.valid = false;
        self.live = false;
        self.flight_loc_start = None;
        self.flight_time_start = None;
        self.flight_time_end = None;
        self.flight_num_records = 0;
    }

    /// Pulls one fix into the interpolation window.
    fn advance(&mut self) {
        if !self.source.next() {
            if self.source_ok {
                debug!("Track {} reached end of data", self.id);
            }
            self.source_ok = false;
            return;
        }
        let basic = self.source.basic().clone();
        let flying = self.source.calculated().flying;
        if !basic.location_available || !basic.gps_altitude_available {
            return;
        }
        self.h_accuracy = basic.h_accuracy;

        if flying {
            match self.flight_loc_start {
                None => {
                    self.flight_loc_start = Some(basic.location);
                    self.flight_time_start = Some(basic.time);
                    if self.alt_start.is_empty() {
                        self.alt_start.add(basic.gps_altitude);
                    }
                }
                Some(start) => {
                    if basic.ground_speed < self.config.landing_speed
                        && geodesy::distance(&basic.location, &start) < self.config.landing_radius
                    {
                        self.alt_end.add(basic.gps_altitude);
                    }
                }
            }
            self.flight_time_end = Some(basic.time);
            self.flight_num_records += 1;
        } else if self.flight_time_start.is_some() {
            self.alt_end.add(basic.gps_altitude);
        } else {
            self.baro_offset = basic.gps_altitude - basic.baro_altitude;
            self.alt_start.add(basic.gps_altitude);
        }

        let baro_altitude = self.update_baro_altitude(basic.gps_altitude, basic.baro_altitude);
        self.interpolator.push(TrajectorySample {
            location: basic.location,
            gps_altitude: basic.gps_altitude,
            baro_altitude,
            time: basic.time,
        });
    }

    /// Offset-corrected baro altitude; tracks the gps/baro disagreement.
    fn update_baro_altitude(&mut self, gps_altitude: f64, raw_baro: f64) -> f64 {
        let baro = raw_baro + self.baro_offset;
        let err = gps_altitude - baro;
        let mix = (1.0 - self.config.baro_mix) * gps_altitude + self.config.baro_mix * baro;
        self.baro_error
            .add((gps_altitude - mix).powi(2) + (baro - mix).powi(2));
        self.baro_offset += self.config.baro_gain * err;
        baro
    }

    /// Pulls fixes until the track is flying with a full window.
    /// Returns the time of the current fix, or `None` if the data ran out.
    pub fn advance_to_start(&mut self) -> Option<f64> {
        while self.source_ok
            && (!self.interpolator.ready()
                || !self.source.calculated().flying
                || self.flight_time_start.is_none())
        {
            self.advance();
        }
        if !self.source_ok {
            return None;
        }
        Some(self.source.basic().time)
    }

    /// Latest fix time held in the window.
    pub fn max_time(&self) -> Option<f64> {
        self.interpolator.max_time()
    }

    /// Brings the track to analysis time `t`. Returns true when the track is
    /// live (interpolated, flying, above the altitude gate) at `t`.
    pub fn advance_to_time(&mut self, t: f64) -> bool {
        self.valid = false;
        self.live = false;
        if !self.source_ok || !self.interpolator.ready() {
            return false;
        }
        if self.interpolator.min_time().map_or(true, |min| t < min) {
            return false;
        }
        while self.interpolator.need_data(t) && self.source_ok {
            self.advance();
        }
        if !self.source.calculated().flying {
            return false;
        }

        let wind = self.source.calculated().estimated_wind;
        if !self.interpolate(t, &wind) {
            return false;
        }

        if self.current.map_or(false, |s| s.baro_altitude >= self.config.min_valid_altitude) {
            self.live = true;
            self.ever_live = true;
        }
        self.live
    }

    fn interpolate(&mut self, t: f64, wind: &Wind) -> bool {
        let (Some(state), Some(ground)) = (
            self.interpolator.interpolate(t),
            self.interpolator.ground_vector(t),
        ) else {
            return false;
        };
        self.previous = self.current.or(Some(state));
        self.current = Some(state);

        let turn_mode = self.source.calculated().turn_mode;
        let mut point = TrailPoint::new(
            state,
            ground,
            turn_mode,
            self.h_accuracy.unwrap_or(0.0),
            self.interpolator.is_actual(t),
        );
        match self.trail.back() {
            Some(prev) => point.reconstruct(prev, wind, &self.config.kinematics),
            None => point.seed(wind),
        }
        self.euler = EulerAngles::new(point.bank, point.pitch, point.yaw);
        self.trail.push_back(point);
        while self.trail.len() > self.config.trail_capacity {
            self.trail.pop_front();
        }
        self.valid = true;
        true
    }

    // ------------------------------------------------------------------------
    // State accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> Option<&InterpolatedState> {
        self.current.as_ref()
    }

    /// State at the previous analysis step (same as current on the first one).
    pub fn previous_state(&self) -> Option<&InterpolatedState> {
        self.previous.as_ref()
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.current.map(|s| s.location)
    }

    pub fn wind(&self) -> Wind {
        self.source.calculated().estimated_wind
    }

    pub fn wind_available(&self) -> bool {
        self.source.calculated().estimated_wind_available
    }

    pub fn flying(&self) -> bool {
        self.source.calculated().flying
    }

    pub fn has_data(&self) -> bool {
        self.source_ok
    }

    /// Substitutes a fleet average when the wind estimator has nothing.
    pub fn set_wind_if_not_available(&mut self, wind: Wind) {
        if !self.wind_available() {
            self.source.calculated_mut().estimated_wind = wind;
        }
    }

    pub fn h_accuracy(&self) -> Option<f64> {
        self.h_accuracy.filter(|h| *h > 0.0)
    }

    pub fn v_accuracy(&self) -> f64 {
        self.config.v_accuracy
    }

    pub fn flight_loc_start(&self) -> Option<GeoPoint> {
        self.flight_loc_start
    }

    pub fn trail(&self) -> &VecDeque<TrailPoint> {
        &self.trail
    }

    pub fn trail_window(&self, t0: f64, t1: f64) -> impl Iterator<Item = &TrailPoint> {
        self.trail.iter().filter(move |p| p.within_time(t0, t1))
    }

    // ------------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------------

    /// How `target` appears from this aircraft's cockpit right now.
    pub fn aspect_to(&self, target: &AircraftTrack) -> Option<Aspect> {
        let own = self.current?;
        let other = target.current?;
        let d = geodesy::distance(&own.location, &other.location);
        let brg = geodesy::bearing(&own.location, &other.location);
        let x = inertial_offset(d, brg, own.gps_altitude - other.gps_altitude);
        Some(self.euler.aspect(&x))
    }

    /// Stores an aspect on the latest trail point.
    pub fn record_aspect(&mut self, target: usize, aspect: Aspect) {
        if let Some(p) = self.trail.back_mut() {
            p.aspects.insert(target, aspect);
        }
    }

    /// Was `target` within visibility distance at any time in [t0, t1]?
    pub fn saw(&self, target: usize, t0: f64, t1: f64) -> bool {
        self.trail_window(t0, t1).any(|p| p.sees(target))
    }

    /// Turn modes flown in [t0, t1], consecutive duplicates collapsed.
    pub fn turn_modes(&self, t0: f64, t1: f64) -> Vec<CirclingMode> {
        let mut modes: Vec<CirclingMode> = Vec::new();
        for p in self.trail_window(t0, t1) {
            if modes.last() != Some(&p.turn_mode) {
                modes.push(p.turn_mode);
            }
        }
        modes
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    /// Single-character status for the progress line.
    pub fn symbol(&self) -> char {
        if self.mark {
            '#'
        } else if self.in_flock {
            '|'
        } else if !self.flying() {
            ' '
        } else if !self.valid {
            '~'
        } else if !self.live {
            '?'
        } else {
            '.'
        }
    }

    /// Accumulated baro mixing error (sum of squares and count).
    pub fn baro_error(&self) -> &Averager {
        &self.baro_error
    }

    pub fn summary(&self) -> AircraftSummary {
        let avg_timestep = match (self.flight_time_start, self.flight_time_end) {
            (Some(start), Some(end)) if self.flight_num_records > 1 => {
                ((end - start - 1.0) / (self.flight_num_records - 1) as f64).max(0.0)
            }
            _ => 0.0,
        };
        AircraftSummary {
            id: self.id.clone(),
            index: self.index,
            type_info: self.type_info.clone(),
            penalty: self.penalty,
            n_encounters: self.n_encounters,
            flight_time_start: self.flight_time_start,
            flight_time_end: self.flight_time_end,
            alt_start: self.alt_start.mean(),
            alt_end: self.alt_end.mean(),
            baro_error: self.baro_error.mean().map(f64::sqrt),
            avg_timestep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airprox_env::{ReplayRecord, ReplaySource};
    use approx::assert_relative_eq;

    fn records(n: usize, altitude: f64) -> Vec<ReplayRecord> {
        let origin = GeoPoint::new(47.0, 8.0);
        (0..n)
            .map(|i| {
                let p = geodesy::destination(&origin, 0.0, 25.0 * i as f64);
                let mut r = ReplayRecord::new(100.0 + i as f64, p.latitude, p.longitude, altitude);
                r.ground_speed = 25.0;
                r.h_accuracy = Some(4.0);
                r
            })
            .collect()
    }

    fn track(records: Vec<ReplayRecord>) -> AircraftTrack {
        let source = ReplaySource::new("T1", records).unwrap();
        AircraftTrack::new(0, Box::new(source), TrackConfig::default())
    }

    #[test]
    fn test_advance_to_start_skips_ground_fixes() {
        let mut recs = records(20, 1000.0);
        for r in recs.iter_mut().take(5) {
            r.flying = false;
            r.baro_altitude = Some(980.0);
        }
        let mut t = track(recs);
        t.reset();
        let start = t.advance_to_start().unwrap();
        assert_eq!(start, 105.0);
        assert_eq!(t.summary().flight_time_start, Some(105.0));
    }

    #[test]
    fn test_advance_to_time_builds_trail() {
        let mut t = track(records(60, 1000.0));
        t.reset();
        let start = t.advance_to_start().unwrap();
        for step in 0..40 {
            assert!(t.advance_to_time(start + step as f64));
        }
        assert!(t.live && t.valid);
        assert_eq!(t.trail().len(), 40);
        let last = t.trail().back().unwrap();
        assert_relative_eq!(last.ground.speed, 25.0, epsilon = 1e-2);
        assert!(last.plausible);
        assert_eq!(t.h_accuracy(), Some(4.0));
        assert_eq!(t.symbol(), '.');
    }

    #[test]
    fn test_trail_is_bounded() {
        let config = TrackConfig {
            trail_capacity: 10,
            ..Default::default()
        };
        let source = ReplaySource::new("T1", records(60, 1000.0)).unwrap();
        let mut t = AircraftTrack::new(0, Box::new(source), config);
        t.reset();
        let start = t.advance_to_start().unwrap();
        for step in 0..30 {
            t.advance_to_time(start + step as f64);
        }
        assert_eq!(t.trail().len(), 10);
    }

    #[test]
    fn test_low_altitude_is_not_live() {
        let mut t = track(records(30, 300.0));
        t.reset();
        let start = t.advance_to_start().unwrap();
        assert!(!t.advance_to_time(start + 1.0));
        assert!(t.valid);
        assert!(!t.live);
        assert_eq!(t.symbol(), '?');
    }

    #[test]
    fn test_end_of_data_stops_track() {
        let mut t = track(records(8, 1000.0));
        t.reset();
        let start = t.advance_to_start().unwrap();
        let mut live_steps = 0;
        for step in 0..20 {
            if t.advance_to_time(start + step as f64) {
                live_steps += 1;
            }
        }
        assert!(live_steps > 0 && live_steps < 20);
        assert!(!t.has_data());
    }

    #[test]
    fn test_wind_substitution_only_without_estimate() {
        let mut recs = records(10, 1000.0);
        let mut t = track(recs.clone());
        t.reset();
        t.advance_to_start();
        t.set_wind_if_not_available(Wind::new(3.0, 1.0));
        assert_eq!(t.wind(), Wind::new(3.0, 1.0));

        for r in recs.iter_mut() {
            r.wind = Some(Wind::new(-2.0, 0.0));
        }
        let mut t = track(recs);
        t.reset();
        t.advance_to_start();
        t.set_wind_if_not_available(Wind::new(3.0, 1.0));
        assert_eq!(t.wind(), Wind::new(-2.0, 0.0));
    }

    #[test]
    fn test_turn_modes_collapse_duplicates() {
        let mut recs = records(40, 1000.0);
        for (i, r) in recs.iter_mut().enumerate() {
            r.turn_mode = match i {
                0..=14 => CirclingMode::Cruise,
                15..=17 => CirclingMode::Entry,
                _ => CirclingMode::Circling,
            };
        }
        let mut t = track(recs);
        t.reset();
        let start = t.advance_to_start().unwrap();
        for step in 0..25 {
            t.advance_to_time(start + step as f64);
        }
        let modes = t.turn_modes(start, start + 30.0);
        assert_eq!(
            modes,
            vec![CirclingMode::Cruise, CirclingMode::Entry, CirclingMode::Circling]
        );
    }

    #[test]
    fn test_baro_offset_converges_to_gps() {
        let mut recs = records(40, 1000.0);
        for r in recs.iter_mut() {
            r.baro_altitude = Some(950.0);
        }
        let mut t = track(recs);
        t.reset();
        let start = t.advance_to_start().unwrap();
        for step in 0..30 {
            t.advance_to_time(start + step as f64);
        }
        let baro = t.state().unwrap().baro_altitude;
        assert!(baro > 950.0 && baro <= 1000.0, "baro was {baro}");
        assert!(t.summary().baro_error.unwrap() > 0.0);
    }
}
