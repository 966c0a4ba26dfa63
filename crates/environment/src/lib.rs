//! Deterministic event-driven simulation engine for QBench.
//!
//! [`QueueEnvironment`] owns one episode at a time: it ingests the scripted
//! events of a [`ScenarioConfig`](qbench_types::ScenarioConfig), applies the
//! agent's actions through the
//! [`ActionValidator`](qbench_validation::ActionValidator), detects
//! capacity overruns and missed deadlines, and records a step trace.
//!
//! ```text
//! reset(scenario) ──► Observation(t=0)
//!                        │
//!        ┌───────────────┘
//!        ▼
//!   step(actions) ──► validate + apply ──► deadlines ──► t+1 events ──► completions
//!        ▲                                                                  │
//!        └────────────────────── Observation(t+1), done ◄───────────────────┘
//! ```

mod config;
mod environment;
mod error;
mod state;

pub use config::EnvironmentConfig;
pub use environment::{EpisodeOutcome, QueueEnvironment, StepOutcome};
pub use error::EnvironmentError;
pub use state::EpisodeState;
