//! Replay source over recorded (or synthesized) fixes.
//!
//! A trace is a flat list of records, loadable from JSON:
//!
//! ```json
//! { "id": "D-1234", "records": [ { "time": 0.0, "latitude": 47.1, "longitude": 8.3, "gps_altitude": 1200.0 } ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CirclingMode, DerivedState, EnvError, FlightSource, GeoPoint, NavState, Wind};

fn default_true() -> bool {
    true
}

/// One recorded fix plus whatever the external estimators derived for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub gps_altitude: f64,
    /// Falls back to `gps_altitude` when the logger has no baro sensor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baro_altitude: Option<f64>,
    #[serde(default)]
    pub ground_speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_accuracy: Option<f64>,
    #[serde(default = "default_true")]
    pub flying: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<Wind>,
    #[serde(default)]
    pub turn_mode: CirclingMode,
}

impl ReplayRecord {
    /// A flying fix with no baro, accuracy or wind information.
    pub fn new(time: f64, latitude: f64, longitude: f64, gps_altitude: f64) -> Self {
        Self {
            time,
            latitude,
            longitude,
            gps_altitude,
            baro_altitude: None,
            ground_speed: 0.0,
            h_accuracy: None,
            flying: true,
            wind: None,
            turn_mode: CirclingMode::Cruise,
        }
    }
}

/// On-disk trace layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayTrace {
    pub id: String,
    #[serde(default)]
    pub type_info: String,
    pub records: Vec<ReplayRecord>,
}

/// `FlightSource` backed by an in-memory list of records.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    id: String,
    type_info: String,
    records: Vec<ReplayRecord>,
    cursor: Option<usize>,
    basic: NavState,
    calculated: DerivedState,
}

impl ReplaySource {
    /// Builds a source, rejecting empty or time-reversed traces.
    pub fn new(id: impl Into<String>, records: Vec<ReplayRecord>) -> Result<Self, EnvError> {
        let id = id.into();
        if records.is_empty() {
            return Err(EnvError::empty(id));
        }
        for (index, pair) in records.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(EnvError::NonMonotonic {
                    id,
                    index: index + 1,
                    time: pair[1].time,
                    previous: pair[0].time,
                });
            }
        }
        Ok(Self {
            id,
            type_info: String::new(),
            records,
            cursor: None,
            basic: NavState::default(),
            calculated: DerivedState::default(),
        })
    }

    /// Attaches recorder/type information.
    pub fn with_type_info(mut self, type_info: impl Into<String>) -> Self {
        self.type_info = type_info.into();
        self
    }

    pub fn from_trace(trace: ReplayTrace) -> Result<Self, EnvError> {
        Ok(Self::new(trace.id, trace.records)?.with_type_info(trace.type_info))
    }

    pub fn from_json_str(json: &str) -> Result<Self, EnvError> {
        let trace: ReplayTrace = serde_json::from_str(json)?;
        Self::from_trace(trace)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serializes the records back into the trace layout.
    pub fn to_trace(&self) -> ReplayTrace {
        ReplayTrace {
            id: self.id.clone(),
            type_info: self.type_info.clone(),
            records: self.records.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn load(&mut self, index: usize) {
        let r = &self.records[index];
        self.basic = NavState {
            time: r.time,
            location: GeoPoint::new(r.latitude, r.longitude),
            gps_altitude: r.gps_altitude,
            baro_altitude: r.baro_altitude.unwrap_or(r.gps_altitude),
            ground_speed: r.ground_speed,
            location_available: true,
            gps_altitude_available: true,
            h_accuracy: r.h_accuracy,
        };
        self.calculated = DerivedState {
            estimated_wind: r.wind.unwrap_or_default(),
            estimated_wind_available: r.wind.is_some(),
            flying: r.flying,
            turn_mode: r.turn_mode,
        };
    }
}

impl FlightSource for ReplaySource {
    fn next(&mut self) -> bool {
        let index = self.cursor.map_or(0, |c| c + 1);
        if index >= self.records.len() {
            return false;
        }
        self.cursor = Some(index);
        self.load(index);
        true
    }

    fn basic(&self) -> &NavState {
        &self.basic
    }

    fn calculated(&self) -> &DerivedState {
        &self.calculated
    }

    fn calculated_mut(&mut self) -> &mut DerivedState {
        &mut self.calculated
    }

    fn rewind(&mut self) {
        self.cursor = None;
        self.basic = NavState::default();
        self.calculated = DerivedState::default();
    }

    fn identifier(&self) -> &str {
        &self.id
    }

    fn type_info(&self) -> &str {
        &self.type_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(n: usize) -> Vec<ReplayRecord> {
        (0..n)
            .map(|i| ReplayRecord::new(i as f64, 47.0, 8.0 + i as f64 * 1e-4, 1000.0))
            .collect()
    }

    #[test]
    fn test_replay_iterates_all_records() {
        let mut source = ReplaySource::new("A", straight(5)).unwrap();
        let mut times = Vec::new();
        while source.next() {
            times.push(source.basic().time);
        }
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(!source.next());
    }

    #[test]
    fn test_replay_rewind_restarts() {
        let mut source = ReplaySource::new("A", straight(3)).unwrap();
        while source.next() {}
        source.rewind();
        assert!(source.next());
        assert_eq!(source.basic().time, 0.0);
    }

    #[test]
    fn test_replay_rejects_empty_trace() {
        let err = ReplaySource::new("A", Vec::new()).unwrap_err();
        assert!(matches!(err, EnvError::EmptyTrace(_)));
    }

    #[test]
    fn test_replay_rejects_time_reversal() {
        let mut records = straight(4);
        records[2].time = 0.5;
        let err = ReplaySource::new("A", records).unwrap_err();
        match err {
            EnvError::NonMonotonic { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_replay_baro_falls_back_to_gps() {
        let mut source = ReplaySource::new("A", straight(1)).unwrap();
        assert!(source.next());
        assert_eq!(source.basic().baro_altitude, 1000.0);
        assert!(!source.calculated().estimated_wind_available);
    }

    #[test]
    fn test_replay_from_json() {
        let json = r#"{
            "id": "HB-1234",
            "records": [
                { "time": 10.0, "latitude": 46.5, "longitude": 7.5, "gps_altitude": 1500.0,
                  "wind": { "east": 2.0, "north": -1.0 }, "turn_mode": "circling" },
                { "time": 11.0, "latitude": 46.5001, "longitude": 7.5, "gps_altitude": 1501.0,
                  "flying": false, "h_accuracy": 3.5 }
            ]
        }"#;
        let mut source = ReplaySource::from_json_str(json).unwrap();
        assert_eq!(source.identifier(), "HB-1234");
        assert_eq!(source.len(), 2);

        assert!(source.next());
        assert!(source.calculated().estimated_wind_available);
        assert_eq!(source.calculated().estimated_wind, Wind::new(2.0, -1.0));
        assert_eq!(source.calculated().turn_mode, CirclingMode::Circling);
        assert!(source.calculated().flying);

        assert!(source.next());
        assert!(!source.calculated().flying);
        assert_eq!(source.basic().h_accuracy, Some(3.5));
    }

    #[test]
    fn test_replay_json_parse_error() {
        let err = ReplaySource::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, EnvError::Parse(_)));
    }
}
