//! AirProx Environment Abstraction Layer
//!
//! This crate provides the pull-based input seam that lets the AirProx
//! engines consume recorded flights without knowing where they came from.
//!
//! # Core Concept: Pull, Don't Push
//!
//! The analysis loop owns the clock. Each aircraft track asks its source for
//! the next fix only when its interpolation window runs dry:
//! - `next()` advances the source by one fix (or reports end-of-data)
//! - `basic()` exposes the raw navigation state of that fix
//! - `calculated()` exposes the derived state (wind, flying, turn mode)
//!   produced by estimators that live outside the core
//!
//! # Example
//!
//! ```ignore
//! use airprox_env::{FlightSource, ReplaySource};
//!
//! let mut source = ReplaySource::from_json_file("trace_ABC.json")?;
//! while source.next() {
//!     let fix = source.basic();
//!     println!("{} {:?}", fix.time, fix.location);
//! }
//! ```

mod error;
mod replay;
mod source;
mod types;

pub use error::EnvError;
pub use replay::{ReplayRecord, ReplaySource, ReplayTrace};
pub use source::FlightSource;
pub use types::{CirclingMode, DerivedState, GeoPoint, NavState, TrajectorySample, Wind};
