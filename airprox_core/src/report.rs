//! Report types streamed out of an analysis run, and the sink they go to.
//!
//! Everything here is plain serde data so a sink can write it verbatim.
//! Angles in reports are degrees, distances meters, times seconds.

use airprox_env::{CirclingMode, GeoPoint, Wind};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::collection::AnalysisError;
use crate::geodesy::{FlatProjection, GeoBounds};
use crate::kinematics::TrailPoint;
use crate::visibility::{Visibility, VisibilityConfig};

// ============================================================================
// ENCOUNTER REPORT
// ============================================================================

/// Attitude/visibility detail, only written for the two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDetail {
    pub turn_rate: f64,
    pub turn_mode: CirclingMode,
    pub actual: bool,
    pub plausible: bool,
    pub fix_accuracy: f64,
    pub range: f64,
    pub elevation_angle: f64,
    pub azimuth_angle: f64,
    pub inclination_angle: f64,
    pub angular_size: f64,
    pub occlusion: f64,
    pub focus_factor: f64,
}

/// One second of an aircraft's trace around an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    /// Seconds relative to the encounter start
    pub t: f64,
    /// Air-mass frame position relative to the closest-approach location
    pub x: f64,
    pub y: f64,
    pub alt_baro: f64,
    pub alt_gps: f64,
    /// Indicated airspeed
    pub v_ias: f64,
    /// True airspeed
    pub v: f64,
    pub hdg: f64,
    pub bank: f64,
    pub pitch: f64,
    pub yaw: f64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub detail: Option<TraceDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceRole {
    Participant,
    Bystander,
}

/// Trace of one aircraft involved in (or witnessing) an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTrace {
    pub id: String,
    pub type_info: String,
    pub role: TraceRole,
    /// Turn modes flown during the lead-in, consecutive duplicates collapsed
    pub turn_modes: Vec<CirclingMode>,
    pub in_flock: bool,
    /// False if any lead-in sample had implausible kinematics
    pub plausible: bool,
    /// Mean conspicuity of the other participant up to the encounter start
    pub visibility_avg: Option<f64>,
    pub trace: Vec<TracePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterReport {
    pub id: u32,
    pub first_launch: f64,
    pub time_start: f64,
    pub time_end: f64,
    /// Number of seconds the pair was above the probability threshold
    pub time_close: u32,
    pub d_min: f64,
    pub d_threshold: f64,
    pub time_pred: f64,
    pub v_max: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub wind: Wind,
    /// Probability that the safety distance was infringed
    pub p_close: f64,
    pub aircraft: Vec<ParticipantTrace>,
}

// ============================================================================
// FLOCK REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlockSample {
    pub t: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlockReport {
    pub id: u32,
    pub time_start: f64,
    pub time_end: f64,
    pub duration: f64,
    pub av_size: f64,
    pub trace: Vec<FlockSample>,
    pub bounds: GeoBounds,
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSummary {
    pub id: String,
    pub index: usize,
    pub type_info: String,
    /// Σ (safety distance − d_min) over this aircraft's encounters
    pub penalty: f64,
    pub n_encounters: u32,
    pub flight_time_start: Option<f64>,
    pub flight_time_end: Option<f64>,
    pub alt_start: Option<f64>,
    pub alt_end: Option<f64>,
    /// RMS disagreement between gps and offset-corrected baro altitude
    pub baro_error: Option<f64>,
    pub avg_timestep: f64,
}

/// Penalty handed to the scorer (penalty minus buffer, positive only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPenalty {
    pub id: String,
    pub penalty: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub num_flightsecs: u64,
    pub num_aircraft: usize,
    pub time_close: u64,
    pub alt_max: f64,
    pub alt_min: f64,
    pub t_start: f64,
    pub t_end: f64,
    pub origin: GeoPoint,
    pub baro_error: Option<f64>,
    pub n_encounters: u32,
    pub n_flocks: u32,
    pub scoring: Vec<ScoringPenalty>,
}

/// Scoring list from per-aircraft summaries.
pub fn scoring_penalties(aircraft: &[AircraftSummary], buffer: i64) -> Vec<ScoringPenalty> {
    aircraft
        .iter()
        .filter_map(|a| {
            let penalty = a.penalty as i64 - buffer;
            (penalty > 0).then(|| ScoringPenalty {
                id: a.id.clone(),
                penalty,
            })
        })
        .collect()
}

// ============================================================================
// VIGNETTE (air-mass frame projection)
// ============================================================================

/// Local projection around an encounter's closest-approach point that
/// removes the wind drift, so circling traces close up.
#[derive(Debug, Clone)]
pub struct Vignette {
    projection: FlatProjection,
    wind: Vector2<f64>,
    time_start: f64,
}

impl Vignette {
    pub fn new(origin: GeoPoint, wind: &Wind, time_start: f64) -> Self {
        Self {
            projection: FlatProjection::new(origin),
            wind: Vector2::new(wind.east, wind.north),
            time_start,
        }
    }

    pub fn project(&self, point: &TrailPoint) -> Vector2<f64> {
        self.projection.project(&point.state.location)
            - self.wind * (point.time() - self.time_start)
    }

    /// Trace point; `target` selects the participant detail block.
    pub fn trace_point(
        &self,
        point: &TrailPoint,
        target: Option<usize>,
        config: &VisibilityConfig,
    ) -> TracePoint {
        let xy = self.project(point);
        let detail = target.map(|target| {
            let aspect = point.aspect(target).copied().unwrap_or_default();
            let vis = Visibility::from_aspect(&aspect, config);
            TraceDetail {
                turn_rate: point.turn_rate.to_degrees(),
                turn_mode: point.turn_mode,
                actual: point.actual,
                plausible: point.plausible,
                fix_accuracy: point.fix_accuracy,
                range: aspect.range,
                elevation_angle: aspect.elevation.to_degrees(),
                azimuth_angle: aspect.azimuth.to_degrees(),
                inclination_angle: aspect.inclination.to_degrees(),
                angular_size: vis.angular_size.to_degrees(),
                occlusion: vis.occlusion,
                focus_factor: vis.focus_factor,
            }
        });
        TracePoint {
            t: point.time() - self.time_start,
            x: xy.x,
            y: xy.y,
            alt_baro: point.state.baro_altitude,
            alt_gps: point.state.gps_altitude,
            v_ias: point.airspeed,
            v: point.air_speed_true(),
            hdg: point.air_bearing().to_degrees(),
            bank: point.bank.to_degrees(),
            pitch: point.pitch.to_degrees(),
            yaw: point.yaw.to_degrees(),
            detail,
        }
    }
}

// ============================================================================
// SINK
// ============================================================================

/// Receives reports as the analysis produces them.
pub trait ReportSink {
    fn on_encounter(&mut self, report: &EncounterReport) -> Result<(), AnalysisError>;

    fn on_flock(&mut self, report: &FlockReport) -> Result<(), AnalysisError>;

    fn on_summary(
        &mut self,
        aircraft: &[AircraftSummary],
        run: &RunSummary,
    ) -> Result<(), AnalysisError>;
}

/// Collects everything in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub encounters: Vec<EncounterReport>,
    pub flocks: Vec<FlockReport>,
    pub aircraft: Vec<AircraftSummary>,
    pub run: Option<RunSummary>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn penalty_of(&self, id: &str) -> Option<f64> {
        self.aircraft.iter().find(|a| a.id == id).map(|a| a.penalty)
    }
}

impl ReportSink for MemorySink {
    fn on_encounter(&mut self, report: &EncounterReport) -> Result<(), AnalysisError> {
        self.encounters.push(report.clone());
        Ok(())
    }

    fn on_flock(&mut self, report: &FlockReport) -> Result<(), AnalysisError> {
        self.flocks.push(report.clone());
        Ok(())
    }

    fn on_summary(
        &mut self,
        aircraft: &[AircraftSummary],
        run: &RunSummary,
    ) -> Result<(), AnalysisError> {
        self.aircraft = aircraft.to_vec();
        self.run = Some(run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airprox_interp::{GroundVector, InterpolatedState};
    use approx::assert_relative_eq;

    fn summary(id: &str, penalty: f64) -> AircraftSummary {
        AircraftSummary {
            id: id.to_string(),
            index: 0,
            type_info: String::new(),
            penalty,
            n_encounters: 1,
            flight_time_start: None,
            flight_time_end: None,
            alt_start: None,
            alt_end: None,
            baro_error: None,
            avg_timestep: 0.0,
        }
    }

    #[test]
    fn test_scoring_penalties_subtract_buffer() {
        let list = vec![summary("A", 25.7), summary("B", 4.0), summary("C", 0.0)];
        let scoring = scoring_penalties(&list, 5);
        assert_eq!(
            scoring,
            vec![ScoringPenalty {
                id: "A".to_string(),
                penalty: 20
            }]
        );
    }

    #[test]
    fn test_vignette_removes_wind_drift() {
        let origin = GeoPoint::new(47.0, 8.0);
        let wind = Wind::new(5.0, 0.0);
        let vignette = Vignette::new(origin, &wind, 100.0);

        // drifting with the air mass for 10 s stays at the origin
        let proj = FlatProjection::new(origin);
        let drifted = proj.unproject(&Vector2::new(50.0, 0.0));
        let state = InterpolatedState {
            location: drifted,
            time: 110.0,
            ..Default::default()
        };
        let p = TrailPoint::new(state, GroundVector::default(), CirclingMode::Circling, 0.0, true);
        let xy = vignette.project(&p);
        assert_relative_eq!(xy.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(xy.y, 0.0, epsilon = 1e-6);

        let tp = vignette.trace_point(&p, None, &VisibilityConfig::default());
        assert_relative_eq!(tp.t, 10.0);
        assert!(tp.detail.is_none());

        let tp = vignette.trace_point(&p, Some(3), &VisibilityConfig::default());
        let detail = tp.detail.unwrap();
        assert_eq!(detail.turn_mode, CirclingMode::Circling);
        assert_eq!(detail.range, 0.0);
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        let run = RunSummary {
            num_flightsecs: 10,
            num_aircraft: 1,
            time_close: 0,
            alt_max: 1000.0,
            alt_min: 900.0,
            t_start: 0.0,
            t_end: 10.0,
            origin: GeoPoint::default(),
            baro_error: None,
            n_encounters: 0,
            n_flocks: 0,
            scoring: Vec::new(),
        };
        sink.on_summary(&[summary("A", 12.0)], &run).unwrap();
        assert_eq!(sink.penalty_of("A"), Some(12.0));
        assert_eq!(sink.penalty_of("Z"), None);
        assert!(sink.run.is_some());
    }
}
