//! Error types for the AirProx environment abstraction.

use thiserror::Error;

/// Errors that can occur while loading or replaying a flight source.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Reading the trace from disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The trace file is not valid JSON or has the wrong shape
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The trace contains no records at all
    #[error("Empty trace: {0}")]
    EmptyTrace(String),

    /// Record timestamps go backwards
    #[error("Non-monotonic trace {id}: record {index} at t={time} follows t={previous}")]
    NonMonotonic {
        id: String,
        index: usize,
        time: f64,
        previous: f64,
    },
}

impl EnvError {
    /// Creates an empty-trace error.
    pub fn empty(id: impl Into<String>) -> Self {
        Self::EmptyTrace(id.into())
    }
}
