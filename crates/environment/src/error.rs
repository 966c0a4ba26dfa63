use qbench_types::ScenarioConfigError;
use thiserror::Error;

/// Misuse of the engine API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    #[error("Invalid scenario: {0}")]
    InvalidScenario(#[from] ScenarioConfigError),

    #[error("Episode has not been reset")]
    NotStarted,

    #[error("Episode already finished at step {0}")]
    EpisodeFinished(u64),
}
