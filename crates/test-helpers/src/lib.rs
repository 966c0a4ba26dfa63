//! Test fixtures shared across QBench crates.
//!
//! - [`ScenarioBuilder`]: fluent construction of small scenarios
//! - [`ScriptedAgent`]: replays a fixed action script
//! - [`PanickingAgent`]: panics at a chosen step

use qbench_core::Agent;
use qbench_types::{Action, Event, Observation, Priority, ScenarioConfig, Step};
use std::collections::BTreeMap;

/// Fluent builder for [`ScenarioConfig`] fixtures.
///
/// ```ignore
/// let scenario = ScenarioBuilder::new(20, 3)
///     .urgent("u1", 0, 12)
///     .routine("r1", 2, 15)
///     .capacity(5, 1)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    config: ScenarioConfig,
}

impl ScenarioBuilder {
    pub fn new(horizon: u64, capacity_per_step: u32) -> Self {
        Self {
            config: ScenarioConfig::new(horizon, capacity_per_step),
        }
    }

    /// An urgent arrival at step `arrival`.
    pub fn urgent(self, id: &str, arrival: u64, deadline: u64) -> Self {
        self.arrival(id, Priority::Urgent, arrival, deadline)
    }

    /// A routine arrival at step `arrival`.
    pub fn routine(self, id: &str, arrival: u64, deadline: u64) -> Self {
        self.arrival(id, Priority::Routine, arrival, deadline)
    }

    pub fn arrival(mut self, id: &str, priority: Priority, arrival: u64, deadline: u64) -> Self {
        self.config
            .push_event(Step(arrival), Event::arrival(id, priority, deadline));
        self
    }

    /// A scripted cancellation at step `at`.
    pub fn cancel(mut self, id: &str, at: u64) -> Self {
        self.config.push_event(Step(at), Event::cancel(id));
        self
    }

    /// A capacity change taking effect at step `at`.
    pub fn capacity(mut self, at: u64, capacity: u32) -> Self {
        self.config
            .push_event(Step(at), Event::capacity_change(capacity));
        self
    }

    pub fn build(self) -> ScenarioConfig {
        self.config
    }
}

/// Submits a fixed list of actions at chosen steps and nothing otherwise.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: BTreeMap<u64, Vec<Action>>,
    observed: Vec<Step>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit `actions` when the observed time is `step`.
    pub fn at(mut self, step: u64, actions: Vec<Action>) -> Self {
        self.script.entry(step).or_default().extend(actions);
        self
    }

    /// Every step this agent was asked to decide, in order.
    pub fn observed(&self) -> &[Step] {
        &self.observed
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, observation: &Observation) -> Vec<Action> {
        self.observed.push(observation.time);
        self.script
            .get(&observation.time.0)
            .cloned()
            .unwrap_or_default()
    }
}

/// Panics on reaching a chosen step.
#[derive(Debug, Clone, Copy)]
pub struct PanickingAgent {
    at: u64,
}

impl PanickingAgent {
    pub fn at(step: u64) -> Self {
        Self { at: step }
    }
}

impl Agent for PanickingAgent {
    fn name(&self) -> &str {
        "panicking"
    }

    fn decide(&mut self, observation: &Observation) -> Vec<Action> {
        if observation.time.0 >= self.at {
            panic!("agent gave up at step {}", observation.time.0);
        }
        Vec::new()
    }
}
