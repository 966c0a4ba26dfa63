//! Single-episode driver.

use crate::client::{ClientError, DecisionClient};
use qbench_environment::{EnvironmentConfig, QueueEnvironment};
use qbench_types::{
    Action, EpisodeResult, Observation, ScenarioConfig, Step, TaskSummary, Violation,
    ViolationKind,
};
use qbench_validation::ConstraintChecker;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Time limits and engine options for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeConfig {
    /// Longest wait for a single agent decision. A late reply counts as an
    /// agent error and the step proceeds with no actions.
    pub step_timeout: Option<Duration>,

    /// Wall-clock budget for the whole episode. Exhausting it ends the
    /// episode with a fatal timeout.
    pub episode_budget: Option<Duration>,

    pub environment: EnvironmentConfig,
}

impl EpisodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn with_episode_budget(mut self, budget: Duration) -> Self {
        self.episode_budget = Some(budget);
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }
}

/// How one decision exchange ended.
enum Exchange {
    Reply(Result<Vec<Action>, ClientError>),
    StepTimeout(Duration),
    BudgetExhausted,
}

/// Runs one scenario against one client from reset to done.
///
/// Always produces an [`EpisodeResult`]: agent failures are logged as
/// `agent_error` violations, budget exhaustion as a fatal `timeout`, and an
/// unusable scenario as a fatal `internal_error`.
#[derive(Debug, Clone, Default)]
pub struct EpisodeRunner {
    config: EpisodeConfig,
    checker: ConstraintChecker,
}

impl EpisodeRunner {
    pub fn new(config: EpisodeConfig) -> Self {
        Self {
            config,
            checker: ConstraintChecker::new(),
        }
    }

    pub fn config(&self) -> &EpisodeConfig {
        &self.config
    }

    pub async fn run(
        &self,
        name: &str,
        seed: u64,
        scenario: ScenarioConfig,
        client: &mut dyn DecisionClient,
    ) -> EpisodeResult {
        let budget_end = self.config.episode_budget.map(|budget| Instant::now() + budget);
        let mut env = QueueEnvironment::new(self.config.environment);

        let mut observation = match env.reset(scenario) {
            Ok(observation) => observation,
            Err(e) => {
                warn!(scenario = name, seed, error = %e, "Scenario rejected by engine");
                return EpisodeResult::aborted(
                    name,
                    seed,
                    Violation::new(ViolationKind::InternalError, Step::ZERO, e.to_string()),
                );
            }
        };

        info!(scenario = name, seed, agent = client.name(), "Episode started");

        let mut runner_violations = Vec::new();
        loop {
            let now = observation.time;
            let actions = match self.exchange(client, &observation, budget_end).await {
                Exchange::Reply(Ok(actions)) => actions,
                Exchange::Reply(Err(e)) => {
                    warn!(scenario = name, seed, step = now.0, error = %e, "Agent error");
                    runner_violations.push(Violation::new(
                        ViolationKind::AgentError,
                        now,
                        e.to_string(),
                    ));
                    Vec::new()
                }
                Exchange::StepTimeout(limit) => {
                    warn!(scenario = name, seed, step = now.0, ?limit, "Agent reply timed out");
                    runner_violations.push(Violation::new(
                        ViolationKind::AgentError,
                        now,
                        format!("no reply within {:?}", limit),
                    ));
                    Vec::new()
                }
                Exchange::BudgetExhausted => {
                    warn!(scenario = name, seed, step = now.0, "Episode budget exhausted");
                    runner_violations.push(Violation::new(
                        ViolationKind::Timeout,
                        now,
                        format!(
                            "episode budget of {:?} exhausted",
                            self.config.episode_budget.unwrap_or_default()
                        ),
                    ));
                    break;
                }
            };

            match env.step(&actions) {
                Ok(outcome) => {
                    debug!(step = now.0, accepted = outcome.accepted, "Actions applied");
                    observation = outcome.observation;
                    if outcome.done {
                        break;
                    }
                }
                Err(e) => {
                    runner_violations.push(Violation::new(
                        ViolationKind::InternalError,
                        now,
                        e.to_string(),
                    ));
                    break;
                }
            }
        }

        let outcome = match env.take_outcome() {
            Ok(outcome) => outcome,
            Err(e) => {
                return EpisodeResult::aborted(
                    name,
                    seed,
                    Violation::new(ViolationKind::InternalError, Step::ZERO, e.to_string()),
                );
            }
        };

        let mut violations = outcome.violations;
        violations.extend(runner_violations);
        violations.sort_by_key(|violation| violation.step);

        let report = self
            .checker
            .check(&violations, &outcome.tasks, &outcome.trace, outcome.horizon);
        violations.extend(report.findings);

        let result = EpisodeResult {
            scenario: name.to_string(),
            seed,
            verdict: report.verdict,
            metrics: qbench_metrics::compute(&outcome.trace, &outcome.tasks),
            summary: TaskSummary::from_tasks(outcome.tasks.values()),
            steps: outcome.steps,
            violations,
            tasks: outcome.tasks,
            trace: outcome.trace,
        };

        info!(
            scenario = name,
            seed,
            verdict = %result.verdict,
            violations = result.violations.len(),
            fatal = result.fatal_violations().count(),
            "Episode finished"
        );
        result
    }

    /// One exchange bounded by the step timeout and the remaining budget.
    async fn exchange(
        &self,
        client: &mut dyn DecisionClient,
        observation: &Observation,
        budget_end: Option<Instant>,
    ) -> Exchange {
        let remaining = budget_end.map(|end| end.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) {
            return Exchange::BudgetExhausted;
        }

        let limit = match (self.config.step_timeout, remaining) {
            (Some(step), Some(left)) => Some(step.min(left)),
            (step, left) => step.or(left),
        };
        let Some(limit) = limit else {
            return Exchange::Reply(client.exchange(observation).await);
        };

        match timeout(limit, client.exchange(observation)).await {
            Ok(reply) => Exchange::Reply(reply),
            Err(_) if remaining.is_some_and(|left| left <= limit) => Exchange::BudgetExhausted,
            Err(_) => Exchange::StepTimeout(limit),
        }
    }
}
