//! In-process agent interface.

use qbench_types::{Action, Observation};

/// A decision maker that runs inside the benchmark process.
///
/// Agents see one observation per step and answer with the actions to
/// submit for that step. They may keep state across steps; every episode
/// gets its own instance.
///
/// # Example
///
/// ```ignore
/// struct Idle;
///
/// impl Agent for Idle {
///     fn name(&self) -> &str {
///         "idle"
///     }
///
///     fn decide(&mut self, _observation: &Observation) -> Vec<Action> {
///         Vec::new()
///     }
/// }
/// ```
pub trait Agent: Send {
    /// Short name used in logs and result files.
    fn name(&self) -> &str;

    /// Choose the actions for the observed step.
    fn decide(&mut self, observation: &Observation) -> Vec<Action>;
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn decide(&mut self, observation: &Observation) -> Vec<Action> {
        (**self).decide(observation)
    }
}
