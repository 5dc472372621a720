use airprox_core::AnalysisError;
use airprox_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Flight data error: {0}")]
    Env(#[from] EnvError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Invalid noise model: {0}")]
    Noise(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn noise(msg: impl Into<String>) -> Self {
        Self::Noise(msg.into())
    }
}
