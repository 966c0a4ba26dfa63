use qbench_scenarios::LoadError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a benchmark before (or after) its episodes run.
///
/// Failures inside an episode never surface here; they become violations
/// in that episode's result.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Parallelism must be between 1 and {max}, got {value}")]
    InvalidParallelism { value: usize, max: usize },

    #[error("Invalid benchmark config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Scenario(#[from] LoadError),
}
