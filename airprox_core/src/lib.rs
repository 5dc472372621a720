//! AirProx Core - Multi-Aircraft Proximity Analysis Engine
//!
//! Replays a set of recorded flights on a common 1-second clock and answers:
//! 1. **Near Misses**: probabilistic encounter detection with hysteresis
//! 2. **Pilot Perspective**: attitude reconstruction and visibility of traffic
//! 3. **Gaggles**: disk-based flock pattern mining over the projected fleet

pub mod airprox_encounter;
pub mod airprox_flock;
pub mod airprox_interp;
pub mod averager;
pub mod collection;
pub mod geodesy;
pub mod kinematics;
pub mod report;
pub mod track;
pub mod visibility;

// Re-export key types for convenience
pub use airprox_encounter::{EncounterConfig, EncounterDetector, EncounterInfo};
pub use airprox_flock::{FlockConfig, FlockMiner, FlockPattern};
pub use airprox_interp::CatmullRomInterpolator;
pub use collection::{AnalysisConfig, AnalysisError, FlightCollection};
pub use geodesy::{FlatProjection, GeoBounds, GeoDelta};
pub use report::{
    AircraftSummary, EncounterReport, FlockReport, MemorySink, ReportSink, RunSummary,
    ScoringPenalty,
};
pub use track::{AircraftTrack, TrackConfig};
pub use visibility::VisibilityConfig;
