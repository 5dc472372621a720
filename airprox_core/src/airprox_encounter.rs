//! The "ENCOUNTER" Engine - statistical near-miss detection
//!
//! Every analysis second, each unordered pair of live tracks is tested for
//! proximity. Fixes are noisy (GNSS horizontal error of a few meters, similar
//! vertical), so "closer than the safety distance" is a probability:
//!
//! 1. Fast exits (vertical separation, lat/lon box, 2.5σ margins)
//! 2. P(close) = Φ((D/2 − d_vert)/σv) · Φ((D − d_horiz)/σh)
//! 3. Above threshold: accumulate an `EncounterInfo` for the pair
//! 4. Pairs quiet for the hysteresis period (or open too long) are finalised
//!
//! Stores are `BTreeMap`s keyed by the ordered index pair so finalisation
//! order, and therefore report numbering, is reproducible.

use std::collections::BTreeMap;

use airprox_env::{GeoPoint, Wind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::averager::{Averager, WindAverager};
use crate::geodesy::{self, GeoBounds, GeoDelta};
use crate::report::{EncounterReport, ParticipantTrace, TraceRole};
use crate::track::AircraftTrack;
use crate::visibility::{Visibility, VisibilityConfig};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    /// Safety distance D (default: 30 m)
    pub safety_distance: f64,

    /// P(close) above which a pair is recorded (default: 0.2)
    pub p_threshold: f64,

    /// Fast-exit margin in standard deviations (default: 2.5)
    pub sigma_limit: f64,

    /// Quiet time after which an encounter is finalised (default: 15 s)
    pub hysteresis: f64,

    /// Lead-in included in encounter traces (default: 20 s)
    pub typical_trail: f64,

    /// Hard limit on an encounter's duration (default: 60 s)
    pub max_duration: f64,

    /// Horizontal accuracy when no live aircraft reports one (default: 5 m)
    pub default_h_accuracy: f64,

    /// Step of the expected-distance integration (default: 0.5 m)
    pub integration_step: f64,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            safety_distance: 30.0,
            p_threshold: 0.2,
            sigma_limit: 2.5,
            hysteresis: 15.0,
            typical_trail: 20.0,
            max_duration: 60.0,
            default_h_accuracy: 5.0,
            integration_step: 0.5,
        }
    }
}

impl EncounterConfig {
    /// Trail length (seconds) a track needs to cover a full encounter report.
    pub fn required_trail(&self) -> usize {
        (self.typical_trail + self.max_duration + self.hysteresis).ceil() as usize + 2
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Error function (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Gaussian density of a standardised offset `z` for deviation `sigma`.
pub fn normal_pdf(z: f64, sigma: f64) -> f64 {
    (-0.5 * z * z).exp() / ((2.0 * std::f64::consts::PI).sqrt() * sigma)
}

/// Expected |x| for x ~ N(d, σ) truncated to [−D, D], integrated numerically.
pub fn expected_distance(safety: f64, d: f64, sigma: f64, step: f64) -> f64 {
    if sigma <= 0.0 {
        return d.abs();
    }
    let mut h_acc = 0.0;
    let mut p_acc = 0.0;
    let n = (2.0 * safety / step).floor() as usize;
    for i in 0..=n {
        let x = -safety + i as f64 * step;
        let p = normal_pdf((x - d) / sigma, sigma);
        h_acc += x.abs() * p;
        p_acc += p;
    }
    if p_acc > 0.0 {
        h_acc / p_acc
    } else {
        d.abs()
    }
}

/// Separation of a pair at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub d_horiz: f64,
    pub d_vert: f64,
    /// Combined horizontal 1σ
    pub sigma_h: f64,
    /// Combined vertical 1σ
    pub sigma_v: f64,
}

impl Separation {
    pub fn d_abs(&self) -> f64 {
        self.d_horiz.hypot(self.d_vert)
    }
}

// ============================================================================
// ENCOUNTER INFO
// ============================================================================

/// Accumulated record of one pair's encounter.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterInfo {
    pub id: u32,
    pub pair: (usize, usize),
    pub time_start: f64,
    pub time_end: f64,
    /// Seconds above threshold
    pub time_close: u32,
    /// Location of closest approach
    pub origin: GeoPoint,
    pub altitude: f64,
    /// Running average of the pair's wind
    pub wind: Wind,
    wind_acc: WindAverager,
    pub d_min: f64,
    /// Peak closing speed
    pub v_max: f64,
    /// Predicted time to closest approach
    pub time_pred: f64,
    /// Probability the safety distance was never infringed
    pub p_free: f64,
}

/// One above-threshold observation of a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub time: f64,
    pub location: GeoPoint,
    pub altitude: f64,
    pub wind: Wind,
    /// Distance estimate
    pub d: f64,
    /// Rate of change of separation (negative = closing)
    pub v: f64,
    pub p_close: f64,
}

impl EncounterInfo {
    pub fn new(id: u32, pair: (usize, usize), obs: &Observation) -> Self {
        let mut wind_acc = WindAverager::default();
        wind_acc.add(&obs.wind);
        Self {
            id,
            pair,
            time_start: obs.time,
            time_end: obs.time,
            time_close: 1,
            origin: obs.location,
            altitude: obs.altitude,
            wind: obs.wind,
            wind_acc,
            d_min: obs.d,
            v_max: -obs.v,
            time_pred: if obs.v < 0.0 { -obs.d / obs.v } else { 0.0 },
            p_free: 1.0 - obs.p_close,
        }
    }

    pub fn update(&mut self, obs: &Observation) {
        self.time_end = obs.time;
        self.time_close += 1;
        if obs.d < self.d_min {
            self.d_min = obs.d;
            self.origin = obs.location;
            self.altitude = obs.altitude;
        }
        if obs.v < 0.0 {
            self.time_pred = self.time_pred.min(-obs.d / obs.v);
            self.v_max = self.v_max.max(-obs.v);
        }
        self.wind_acc.add(&obs.wind);
        if let Some(w) = self.wind_acc.mean() {
            self.wind = w;
        }
        self.p_free *= 1.0 - obs.p_close;
    }

    pub fn is_expired(&self, time: f64, config: &EncounterConfig) -> bool {
        time - self.time_end > config.hysteresis || time - self.time_start > config.max_duration
    }

    /// Probability that the safety distance was infringed at least once.
    pub fn p_close(&self) -> f64 {
        1.0 - self.p_free
    }

    /// Penalty charged to each participant.
    pub fn penalty(&self, safety_distance: f64) -> f64 {
        safety_distance - self.d_min
    }
}

// ============================================================================
// ENCOUNTER STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct EncounterStore {
    encounters: BTreeMap<(usize, usize), EncounterInfo>,
    next_id: u32,
}

impl EncounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.encounters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encounters.is_empty()
    }

    /// Total number of encounters ever opened.
    pub fn opened(&self) -> u32 {
        self.next_id
    }

    pub fn get(&self, a: usize, b: usize) -> Option<&EncounterInfo> {
        self.encounters.get(&Self::key(a, b))
    }

    fn key(a: usize, b: usize) -> (usize, usize) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Opens or extends the encounter of pair (a, b).
    pub fn update(&mut self, a: usize, b: usize, obs: &Observation) {
        let key = Self::key(a, b);
        match self.encounters.get_mut(&key) {
            Some(info) => info.update(obs),
            None => {
                let info = EncounterInfo::new(self.next_id, key, obs);
                debug!(
                    "Encounter {} opened between {} and {} at t={}",
                    info.id, key.0, key.1, obs.time
                );
                self.encounters.insert(key, info);
                self.next_id += 1;
            }
        }
    }

    /// Removes and returns expired encounters, in key order.
    pub fn take_expired(&mut self, time: f64, config: &EncounterConfig) -> Vec<EncounterInfo> {
        let expired: Vec<(usize, usize)> = self
            .encounters
            .iter()
            .filter(|(_, info)| info.is_expired(time, config))
            .map(|(k, _)| *k)
            .collect();
        expired
            .into_iter()
            .filter_map(|k| self.encounters.remove(&k))
            .collect()
    }

    /// Removes and returns everything (end of run).
    pub fn drain(&mut self) -> Vec<EncounterInfo> {
        std::mem::take(&mut self.encounters).into_values().collect()
    }
}

// ============================================================================
// ENCOUNTER DETECTOR
// ============================================================================

#[derive(Debug)]
pub struct EncounterDetector {
    config: EncounterConfig,
    store: EncounterStore,
    proximity_delta: Option<GeoDelta>,
}

impl EncounterDetector {
    pub fn new(config: EncounterConfig) -> Self {
        Self {
            config,
            store: EncounterStore::new(),
            proximity_delta: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EncounterConfig::default())
    }

    pub fn config(&self) -> &EncounterConfig {
        &self.config
    }

    pub fn store(&self) -> &EncounterStore {
        &self.store
    }

    /// Fixes the lat/lon extent of the proximity box for the analysis area.
    pub fn set_reference(&mut self, origin: &GeoPoint) {
        self.proximity_delta = Some(GeoDelta::around(origin, 2.0 * self.config.safety_distance));
    }

    /// P(close) for a separation, or `None` if a fast exit applies.
    pub fn probability(&self, sep: &Separation) -> Option<f64> {
        let safety = self.config.safety_distance;
        let limit = self.config.sigma_limit;
        if sep.d_vert > 3.0 * safety {
            return None;
        }
        if sep.d_vert - limit * sep.sigma_v > safety / 2.0 {
            return None;
        }
        if sep.d_abs() - limit * sep.sigma_h > safety {
            return None;
        }
        let p_v = normal_cdf((safety / 2.0 - sep.d_vert) / sep.sigma_v);
        let p_h = normal_cdf((safety - sep.d_horiz) / sep.sigma_h);
        Some(p_v * p_h)
    }

    /// Mean reported horizontal accuracy over live tracks.
    pub fn average_h_accuracy(&self, tracks: &[AircraftTrack]) -> f64 {
        let mut acc = Averager::new();
        for t in tracks.iter().filter(|t| t.live) {
            if let Some(h) = t.h_accuracy() {
                acc.add(h);
            }
        }
        acc.mean_or(self.config.default_h_accuracy)
    }

    /// Pairwise test of all live tracks at time `t`. Returns the number of
    /// pairs above threshold.
    pub fn update(&mut self, t: f64, tracks: &[AircraftTrack]) -> usize {
        let h_acc_avg = self.average_h_accuracy(tracks);
        let mut n_close = 0;

        for (i, a) in tracks.iter().enumerate() {
            let Some(sa) = a.state().filter(|_| a.live) else {
                continue;
            };
            let bounds = self
                .proximity_delta
                .map(|delta| GeoBounds::around(&sa.location, &delta));
            let a_h = a.h_accuracy().unwrap_or(h_acc_avg);

            for b in tracks.iter().skip(i + 1) {
                let Some(sb) = b.state().filter(|_| b.live) else {
                    continue;
                };
                let d_vert = (sa.gps_altitude - sb.gps_altitude).abs();
                if d_vert > 3.0 * self.config.safety_distance {
                    continue;
                }
                if bounds.map_or(false, |bb| !bb.contains(&sb.location)) {
                    continue;
                }

                let b_h = b.h_accuracy().unwrap_or(h_acc_avg);
                let sep = Separation {
                    d_horiz: geodesy::distance(&sa.location, &sb.location),
                    d_vert,
                    sigma_h: a_h.hypot(b_h),
                    sigma_v: a.v_accuracy().hypot(b.v_accuracy()),
                };
                let Some(p_close) = self.probability(&sep) else {
                    continue;
                };
                if p_close <= self.config.p_threshold {
                    continue;
                }

                let d_abs = sep.d_abs();
                let d_last = match (a.previous_state(), b.previous_state()) {
                    (Some(pa), Some(pb)) => {
                        geodesy::distance(&pa.location, &pb.location)
                            .hypot(pa.gps_altitude - pb.gps_altitude)
                    }
                    _ => d_abs,
                };
                let wa = a.wind();
                let wb = b.wind();
                let obs = Observation {
                    time: t,
                    location: geodesy::midpoint(&sa.location, &sb.location),
                    altitude: sa.baro_altitude,
                    wind: Wind::new((wa.east + wb.east) / 2.0, (wa.north + wb.north) / 2.0),
                    d: expected_distance(
                        self.config.safety_distance,
                        d_abs,
                        sep.sigma_h,
                        self.config.integration_step,
                    ),
                    v: d_abs - d_last,
                    p_close,
                };
                self.store.update(a.index(), b.index(), &obs);
                n_close += 1;
            }
        }
        n_close
    }

    pub fn take_expired(&mut self, t: f64) -> Vec<EncounterInfo> {
        self.store.take_expired(t, &self.config)
    }

    pub fn drain(&mut self) -> Vec<EncounterInfo> {
        self.store.drain()
    }

    /// Builds the report of a finalised encounter: the two participants with
    /// full detail, then every other aircraft either participant saw.
    pub fn report(
        &self,
        info: &EncounterInfo,
        tracks: &[AircraftTrack],
        visibility: &VisibilityConfig,
        first_launch: f64,
    ) -> EncounterReport {
        let t0 = info.time_start - self.config.typical_trail;
        let t1 = info.time_end + self.config.hysteresis;
        let vignette = crate::report::Vignette::new(info.origin, &info.wind, info.time_start);
        let (ia, ib) = info.pair;

        let mut aircraft = Vec::new();
        for (own, other) in [(ia, ib), (ib, ia)] {
            let Some(track) = tracks.iter().find(|t| t.index() == own) else {
                continue;
            };
            let mut plausible = true;
            let mut visibility_avg = Averager::new();
            for p in track.trail_window(t0, info.time_start) {
                plausible &= p.plausible;
                let aspect = p.aspect(other).copied().unwrap_or_default();
                visibility_avg.add(Visibility::from_aspect(&aspect, visibility).score());
            }
            aircraft.push(ParticipantTrace {
                id: track.id().to_string(),
                type_info: track.type_info().to_string(),
                role: TraceRole::Participant,
                turn_modes: track.turn_modes(t0, info.time_start + 1.0),
                in_flock: track.in_flock,
                plausible,
                visibility_avg: visibility_avg.mean(),
                trace: track
                    .trail_window(t0, t1)
                    .map(|p| vignette.trace_point(p, Some(other), visibility))
                    .collect(),
            });
        }

        let participants: Vec<&AircraftTrack> =
            tracks.iter().filter(|t| t.index() == ia || t.index() == ib).collect();
        for bystander in tracks.iter().filter(|t| t.index() != ia && t.index() != ib) {
            if !participants.iter().any(|p| p.saw(bystander.index(), t0, t1)) {
                continue;
            }
            aircraft.push(ParticipantTrace {
                id: bystander.id().to_string(),
                type_info: bystander.type_info().to_string(),
                role: TraceRole::Bystander,
                turn_modes: bystander.turn_modes(t0, info.time_start + 1.0),
                in_flock: bystander.in_flock,
                plausible: true,
                visibility_avg: None,
                trace: bystander
                    .trail_window(t0, t1)
                    .map(|p| vignette.trace_point(p, None, visibility))
                    .collect(),
            });
        }

        EncounterReport {
            id: info.id,
            first_launch,
            time_start: info.time_start,
            time_end: info.time_end,
            time_close: info.time_close,
            d_min: info.d_min,
            d_threshold: self.config.safety_distance,
            time_pred: info.time_pred,
            v_max: info.v_max,
            latitude: info.origin.latitude,
            longitude: info.origin.longitude,
            altitude: info.altitude,
            wind: info.wind,
            p_close: info.p_close(),
            aircraft,
        }
    }
}
