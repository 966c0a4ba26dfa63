//! Episode and benchmark runners for QBench.
//!
//! ```text
//! BenchmarkRunner ──(semaphore, N workers)──► EpisodeRunner ──► QueueEnvironment
//!        │                                          │
//!        │                                   DecisionClient
//!        │                               (InProcessClient | HttpClient)
//!        ▼
//! BenchmarkSummary ──► write_summary (JSON artifact)
//! ```

pub mod agents;
mod benchmark;
pub mod client;
mod episode;
mod error;
mod output;

pub use benchmark::{
    BenchmarkConfig, BenchmarkRunner, BenchmarkSummary, ScenarioBreakdown, DEFAULT_EPISODE_BUDGET_MS,
    MAX_PARALLELISM,
};
pub use client::{ClientError, ClientFactory, DecisionClient, HttpClient, InProcessClient};
pub use episode::{EpisodeConfig, EpisodeRunner};
pub use error::RunnerError;
pub use output::{default_artifact_name, write_summary};
