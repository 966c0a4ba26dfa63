//! The agent boundary.
//!
//! The episode runner talks to every agent through [`DecisionClient`],
//! whatever the transport:
//!
//! - [`InProcessClient`]: wraps an [`Agent`](qbench_core::Agent) object
//! - [`HttpClient`]: posts each observation to a remote agent

mod http;
mod in_process;

pub use http::{ActRequest, ActResponse, HttpClient};
pub use in_process::InProcessClient;

use async_trait::async_trait;
use qbench_core::ParseError;
use qbench_types::{Action, Observation};
use std::fmt;
use thiserror::Error;

/// Failure to obtain a step decision.
///
/// Inside an episode every variant is absorbed: the step proceeds with no
/// actions and an `agent_error` violation is logged.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unparsable agent response: {0}")]
    Parse(#[from] ParseError),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// One decision exchange per step.
#[async_trait]
pub trait DecisionClient: Send + fmt::Debug {
    /// Name of the agent behind this client, for logs and results.
    fn name(&self) -> &str;

    /// Send the observation and wait for the agent's actions.
    async fn exchange(&mut self, observation: &Observation) -> Result<Vec<Action>, ClientError>;
}

/// Builds a fresh client for every episode.
///
/// Clients are never shared between episodes, so agent state cannot leak
/// from one run into another.
pub trait ClientFactory: Send + Sync {
    fn create(&self, scenario: &str, seed: u64) -> Result<Box<dyn DecisionClient>, ClientError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&str, u64) -> Result<Box<dyn DecisionClient>, ClientError> + Send + Sync,
{
    fn create(&self, scenario: &str, seed: u64) -> Result<Box<dyn DecisionClient>, ClientError> {
        self(scenario, seed)
    }
}
