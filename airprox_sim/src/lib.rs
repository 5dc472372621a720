//! AirProx Batch Driver and Synthetic Traffic Harness
//!
//! Feeds recorded or synthetic flights through the analysis engine and
//! writes the reports to disk.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ReplaySource   ┌──────────────────┐   ReportSink   ┌──────────────┐
//! │    Oracle    │ ───────────────► │ FlightCollection │ ─────────────► │ JsonExporter │
//! │ (synthetic)  │                  │  (airprox_core)  │                │  MemorySink  │
//! └──────────────┘                  └──────────────────┘                └──────────────┘
//!        ▲                                    ▲
//!        │ ground truth                       │ JSON traces
//! ┌──────┴───────┐                            │
//! │ScenarioRunner│                       --input files
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use airprox_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Gaggle);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::JsonExporter;
pub use oracle::{Motion, Oracle, SyntheticFlight};
pub use runner::{ScenarioResult, ScenarioRunner};
