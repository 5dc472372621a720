//! The analysis orchestrator.
//!
//! `FlightCollection` owns every track and drives the 1-second master loop:
//! advance all tracks to `t`, share a fleet wind estimate, record aspects for
//! nearby pairs, run encounter detection and (every `cadence` seconds) flock
//! mining, and stream finished reports to a `ReportSink`.

use std::path::Path;

use airprox_env::{EnvError, FlightSource, GeoPoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::airprox_encounter::{EncounterConfig, EncounterDetector, EncounterInfo};
use crate::airprox_flock::{FlockConfig, FlockMiner, FlockPattern, IndexedPoint};
use crate::averager::{Averager, WindAverager};
use crate::geodesy::{FlatProjection, GeoBounds, GeoDelta};
use crate::report::{scoring_penalties, FlockReport, FlockSample, ReportSink, RunSummary};
use crate::track::{AircraftTrack, TrackConfig};
use crate::visibility::VisibilityConfig;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No flights loaded")]
    NoTracks,

    #[error("No aircraft reached a common flying state")]
    NoCommonFlyingState,

    #[error("Report sink failed: {0}")]
    Sink(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl AnalysisError {
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Everything tunable about a run. Every field has a default, so a JSON
/// file only needs the fields it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub encounter: EncounterConfig,

    pub flock: FlockConfig,

    pub track: TrackConfig,

    pub visibility: VisibilityConfig,

    /// Pairs further apart than this get no aspect (default: 1000 m)
    pub visibility_distance: f64,

    /// Subtracted from penalties before scoring (default: 0)
    pub score_buffer: i64,

    /// Seconds between status lines (default: 300)
    pub display_interval: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            encounter: EncounterConfig::default(),
            flock: FlockConfig::default(),
            track: TrackConfig::default(),
            visibility: VisibilityConfig::default(),
            visibility_distance: 1000.0,
            score_buffer: 0,
            display_interval: 300,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AnalysisError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.encounter.safety_distance <= 0.0 {
            return Err(AnalysisError::config("safety_distance must be positive"));
        }
        if self.flock.epsilon <= 0.0 {
            return Err(AnalysisError::config("flock epsilon must be positive"));
        }
        if self.flock.mu < 2 {
            return Err(AnalysisError::config("flock mu must be at least 2"));
        }
        if self.flock.cadence == 0 {
            return Err(AnalysisError::config("flock cadence must be at least 1 s"));
        }
        if !(0.0..1.0).contains(&self.encounter.p_threshold) {
            return Err(AnalysisError::config("p_threshold must be in [0, 1)"));
        }
        Ok(())
    }
}

// ============================================================================
// FLIGHT COLLECTION
// ============================================================================

pub struct FlightCollection {
    config: AnalysisConfig,
    tracks: Vec<AircraftTrack>,
    encounters: EncounterDetector,
    flocks: FlockMiner,

    projection: FlatProjection,
    visibility_delta: GeoDelta,
    flock_delta: GeoDelta,

    t_start: f64,
    t_end: f64,
    first_launch: f64,
    num_flightsecs: u64,
    time_close: u64,
    alt_range: Option<(f64, f64)>,
    n_encounters: u32,
    n_flocks: u32,
}

impl FlightCollection {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            encounters: EncounterDetector::new(config.encounter.clone()),
            flocks: FlockMiner::new(config.flock.clone()),
            config,
            tracks: Vec::new(),
            projection: FlatProjection::default(),
            visibility_delta: GeoDelta::default(),
            flock_delta: GeoDelta::default(),
            t_start: 0.0,
            t_end: 0.0,
            first_launch: 0.0,
            num_flightsecs: 0,
            time_close: 0,
            alt_range: None,
            n_encounters: 0,
            n_flocks: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AnalysisConfig::default())
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Adds a flight; returns its track index.
    pub fn add_source(&mut self, source: Box<dyn FlightSource>) -> usize {
        let index = self.tracks.len();
        let mut track_config = self.config.track.clone();
        track_config.trail_capacity = track_config
            .trail_capacity
            .max(self.config.encounter.required_trail());
        self.tracks.push(AircraftTrack::new(index, source, track_config));
        index
    }

    pub fn tracks(&self) -> &[AircraftTrack] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn projection(&self) -> &FlatProjection {
        &self.projection
    }

    /// Runs the whole analysis, streaming reports into `sink`.
    pub fn run(&mut self, sink: &mut dyn ReportSink) -> Result<RunSummary, AnalysisError> {
        if self.tracks.is_empty() {
            return Err(AnalysisError::NoTracks);
        }
        info!("Starting analysis of {} flights", self.tracks.len());
        debug!(
            "Track order: {}",
            self.tracks.iter().map(|t| t.id()).collect::<Vec<_>>().join(" ")
        );

        self.advance_to_start()?;

        let origin = self.average_start_location();
        self.projection = FlatProjection::new(origin);
        self.visibility_delta = GeoDelta::around(&origin, self.config.visibility_distance);
        self.flock_delta = GeoDelta::around(&origin, self.config.flock.epsilon);
        self.encounters.set_reference(&origin);
        info!(
            "Analysis window t={}..{} around ({:.5}, {:.5})",
            self.t_start, self.t_end, origin.latitude, origin.longitude
        );

        let interval = self.config.display_interval.max(1) as u64;
        let mut t = self.t_start.ceil();
        let mut step: u64 = 0;
        while t <= self.t_end {
            self.process(t, sink)?;
            if step % interval == 0 {
                self.status_line(t);
            }
            step += 1;
            t += 1.0;
        }

        self.finalise(sink)
    }

    fn advance_to_start(&mut self) -> Result<(), AnalysisError> {
        let mut start: Option<f64> = None;
        let mut end = f64::NEG_INFINITY;
        for track in self.tracks.iter_mut() {
            track.reset();
            match track.advance_to_start() {
                Some(t) => {
                    start = Some(start.map_or(t, |s: f64| s.min(t)));
                    if let Some(max) = track.max_time() {
                        end = end.max(max);
                    }
                }
                None => warn!("Track {} never reached a flying state", track.id()),
            }
        }
        let start = start.ok_or(AnalysisError::NoCommonFlyingState)?;
        self.t_start = start;
        self.t_end = end.max(start);
        self.first_launch = self
            .tracks
            .iter()
            .filter_map(|t| t.summary().flight_time_start)
            .fold(f64::INFINITY, f64::min);
        Ok(())
    }

    fn average_start_location(&self) -> GeoPoint {
        let starts: Vec<GeoPoint> = self
            .tracks
            .iter()
            .filter_map(|t| t.flight_loc_start())
            .collect();
        let n = starts.len().max(1) as f64;
        GeoPoint::new(
            starts.iter().map(|p| p.latitude).sum::<f64>() / n,
            starts.iter().map(|p| p.longitude).sum::<f64>() / n,
        )
    }

    /// One second of the master loop.
    pub fn process(&mut self, t: f64, sink: &mut dyn ReportSink) -> Result<(), AnalysisError> {
        self.advance_to_time(t);
        self.visibility_update();
        self.encounters.update(t, &self.tracks);

        for info in self.encounters.take_expired(t) {
            self.finalise_encounter(&info, sink)?;
        }

        if self.flocks.is_due(t as i64) {
            let points = self.flock_candidates();
            let finished = self.flocks.process(t, &points);
            for pattern in finished {
                self.report_flock(&pattern, sink)?;
            }
            for track in self.tracks.iter_mut() {
                track.in_flock = self.flocks.in_flock(track.index());
            }
        }
        Ok(())
    }

    fn advance_to_time(&mut self, t: f64) {
        let mut wind = WindAverager::default();
        for track in self.tracks.iter_mut() {
            let live = track.advance_to_time(t);
            if let Some(max) = track.max_time() {
                self.t_end = self.t_end.max(max);
            }
            if !live {
                continue;
            }
            self.num_flightsecs += 1;
            if track.wind_available() {
                wind.add(&track.wind());
            }
            if let Some(state) = track.state() {
                let alt = state.gps_altitude;
                self.alt_range = Some(match self.alt_range {
                    Some((lo, hi)) => (lo.min(alt), hi.max(alt)),
                    None => (alt, alt),
                });
            }
        }
        if let Some(avg) = wind.mean() {
            for track in self.tracks.iter_mut() {
                track.set_wind_if_not_available(avg);
            }
        }
    }

    /// Records aspects for every live pair within visibility range. The
    /// lat/lon box and altitude band only prefilter; the slant range decides.
    fn visibility_update(&mut self) {
        let mut aspects = Vec::new();
        for (i, a) in self.tracks.iter().enumerate() {
            let Some(sa) = a.state().filter(|_| a.live) else {
                continue;
            };
            let bounds = GeoBounds::around(&sa.location, &self.visibility_delta);
            for b in self.tracks.iter().skip(i + 1) {
                let Some(sb) = b.state().filter(|_| b.live) else {
                    continue;
                };
                if !bounds.contains(&sb.location) {
                    continue;
                }
                if (sa.gps_altitude - sb.gps_altitude).abs() > self.config.visibility_distance {
                    continue;
                }
                let Some((ab, ba)) = a.aspect_to(b).zip(b.aspect_to(a)) else {
                    continue;
                };
                if ab.range <= self.config.visibility_distance {
                    aspects.push((a.index(), b.index(), ab));
                    aspects.push((b.index(), a.index(), ba));
                }
            }
        }
        for (observer, target, aspect) in aspects {
            self.tracks[observer].record_aspect(target, aspect);
        }
    }

    /// Live aircraft within the flock box of at least one other live aircraft.
    fn flock_candidates(&self) -> Vec<IndexedPoint> {
        let mut candidate = vec![false; self.tracks.len()];
        for (i, a) in self.tracks.iter().enumerate() {
            let Some(sa) = a.state().filter(|_| a.live) else {
                continue;
            };
            let bounds = GeoBounds::around(&sa.location, &self.flock_delta);
            for (j, b) in self.tracks.iter().enumerate().skip(i + 1) {
                let Some(sb) = b.state().filter(|_| b.live) else {
                    continue;
                };
                if bounds.contains(&sb.location) {
                    candidate[i] = true;
                    candidate[j] = true;
                }
            }
        }
        self.tracks
            .iter()
            .filter(|t| candidate[t.index()])
            .filter_map(|t| {
                let p = self.projection.project(&t.location()?);
                Some(IndexedPoint::new(t.index(), p.x, p.y))
            })
            .collect()
    }

    fn finalise_encounter(
        &mut self,
        info: &EncounterInfo,
        sink: &mut dyn ReportSink,
    ) -> Result<(), AnalysisError> {
        let report = self
            .encounters
            .report(info, &self.tracks, &self.config.visibility, self.first_launch);
        let penalty = info.penalty(self.config.encounter.safety_distance);
        for idx in [info.pair.0, info.pair.1] {
            if let Some(track) = self.tracks.get_mut(idx) {
                track.penalty += penalty;
                track.n_encounters += 1;
                track.mark = true;
            }
        }
        self.time_close += info.time_close as u64;
        self.n_encounters += 1;
        info!(
            "Encounter {:05} {} - {} t={}..{} d_min={:.1} m p={:.2}",
            report.id,
            self.tracks[info.pair.0].id(),
            self.tracks[info.pair.1].id(),
            info.time_start,
            info.time_end,
            info.d_min,
            info.p_close()
        );
        sink.on_encounter(&report)
    }

    fn report_flock(
        &mut self,
        pattern: &FlockPattern,
        sink: &mut dyn ReportSink,
    ) -> Result<(), AnalysisError> {
        let mut bounds: Option<GeoBounds> = None;
        let trace: Vec<FlockSample> = pattern
            .samples
            .iter()
            .map(|s| {
                let loc = self.projection.unproject(&s.centroid);
                match bounds.as_mut() {
                    Some(b) => b.extend(&loc),
                    None => bounds = Some(GeoBounds::from_point(&loc)),
                }
                FlockSample {
                    t: s.time,
                    latitude: loc.latitude,
                    longitude: loc.longitude,
                    members: s
                        .members
                        .iter()
                        .filter_map(|&m| self.tracks.get(m).map(|t| t.id().to_string()))
                        .collect(),
                }
            })
            .collect();
        let report = FlockReport {
            id: self.n_flocks,
            time_start: pattern.time_start,
            time_end: pattern.time_end,
            duration: pattern.duration,
            av_size: pattern.av_size,
            bounds: bounds.unwrap_or_else(|| GeoBounds::from_point(&self.projection.origin())),
            trace,
        };
        self.n_flocks += 1;
        info!(
            "Flock {} t={}..{} duration={} av_size={:.1}",
            report.id, report.time_start, report.time_end, report.duration, report.av_size
        );
        sink.on_flock(&report)
    }

    fn status_line(&mut self, t: f64) {
        let line: String = self.tracks.iter().map(|track| track.symbol()).collect();
        debug!("{:>8} {}", t, line);
        for track in self.tracks.iter_mut() {
            track.mark = false;
        }
    }

    fn finalise(&mut self, sink: &mut dyn ReportSink) -> Result<RunSummary, AnalysisError> {
        for info in self.encounters.drain() {
            self.finalise_encounter(&info, sink)?;
        }
        for pattern in self.flocks.finish() {
            self.report_flock(&pattern, sink)?;
        }

        let aircraft: Vec<_> = self
            .tracks
            .iter()
            .filter(|t| t.ever_live)
            .map(|t| t.summary())
            .collect();
        let mut baro = Averager::new();
        for t in self.tracks.iter().filter(|t| t.ever_live) {
            baro.merge(t.baro_error());
        }
        let (alt_min, alt_max) = self.alt_range.unwrap_or((0.0, 0.0));
        let run = RunSummary {
            num_flightsecs: self.num_flightsecs,
            num_aircraft: aircraft.len(),
            time_close: self.time_close,
            alt_max,
            alt_min,
            t_start: self.t_start,
            t_end: self.t_end,
            origin: self.projection.origin(),
            baro_error: baro.mean().map(f64::sqrt),
            n_encounters: self.n_encounters,
            n_flocks: self.n_flocks,
            scoring: scoring_penalties(&aircraft, self.config.score_buffer),
        };
        info!(
            "Analysis complete: {} aircraft, {} flight seconds, {} encounters, {} flocks",
            run.num_aircraft, run.num_flightsecs, run.n_encounters, run.n_flocks
        );
        sink.on_summary(&aircraft, &run)?;
        Ok(run)
    }
}
