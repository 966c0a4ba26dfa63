use qbench_core::Agent;
use qbench_types::{Action, Observation};

/// Never acts. Every urgent arrival ends up missed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAgent;

impl Agent for NoopAgent {
    fn name(&self) -> &str {
        "noop"
    }

    fn decide(&mut self, _observation: &Observation) -> Vec<Action> {
        Vec::new()
    }
}
