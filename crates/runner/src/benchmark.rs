//! Parallel multi-episode benchmark.

use crate::client::ClientFactory;
use crate::episode::{EpisodeConfig, EpisodeRunner};
use crate::error::RunnerError;
use futures::FutureExt;
use parking_lot::Mutex;
use qbench_environment::EnvironmentConfig;
use qbench_metrics::average;
use qbench_scenarios::ScenarioRegistry;
use qbench_types::{EpisodeResult, MetricsSnapshot, Step, Violation, ViolationKind};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Upper bound on concurrently running episodes.
pub const MAX_PARALLELISM: usize = 100;

/// Wall-clock budget per episode unless configured otherwise.
pub const DEFAULT_EPISODE_BUDGET_MS: u64 = 300_000;

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Benchmark-wide settings.
///
/// Can be built in code or read from a TOML file:
///
/// ```toml
/// parallelism = 8
/// scenarios = ["steady_near_capacity", "urgent_flood_strict_sla"]
/// max_seeds = 3
/// step_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Episodes in flight at once, 1 to [`MAX_PARALLELISM`].
    pub parallelism: usize,

    /// Scenario names to run. Empty or `["all"]` runs every registered one.
    pub scenarios: Vec<String>,

    /// Seeds per scenario, lowest first. `None` runs every seed.
    pub max_seeds: Option<usize>,

    /// Cap on the total number of episodes.
    pub max_episodes: Option<usize>,

    pub step_timeout_ms: Option<u64>,

    /// Defaults to [`DEFAULT_EPISODE_BUDGET_MS`].
    pub episode_budget_ms: Option<u64>,

    pub stop_on_fatal: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            scenarios: Vec::new(),
            max_seeds: None,
            max_episodes: None,
            step_timeout_ms: None,
            episode_budget_ms: Some(DEFAULT_EPISODE_BUDGET_MS),
            stop_on_fatal: false,
        }
    }
}

impl BenchmarkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RunnerError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<String>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_max_seeds(mut self, max_seeds: usize) -> Self {
        self.max_seeds = Some(max_seeds);
        self
    }

    pub fn with_max_episodes(mut self, max_episodes: usize) -> Self {
        self.max_episodes = Some(max_episodes);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_episode_budget(mut self, budget: Duration) -> Self {
        self.episode_budget_ms = Some(budget.as_millis() as u64);
        self
    }

    pub fn with_stop_on_fatal(mut self, stop_on_fatal: bool) -> Self {
        self.stop_on_fatal = stop_on_fatal;
        self
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if !(1..=MAX_PARALLELISM).contains(&self.parallelism) {
            return Err(RunnerError::InvalidParallelism {
                value: self.parallelism,
                max: MAX_PARALLELISM,
            });
        }
        Ok(())
    }

    /// Per-episode settings derived from this config.
    pub fn episode_config(&self) -> EpisodeConfig {
        let mut config = EpisodeConfig::new().with_environment(
            EnvironmentConfig::new().with_stop_on_fatal(self.stop_on_fatal),
        );
        if let Some(ms) = self.step_timeout_ms {
            config = config.with_step_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.episode_budget_ms {
            config = config.with_episode_budget(Duration::from_millis(ms));
        }
        config
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Summary
// ═══════════════════════════════════════════════════════════════════════════

/// Pass/fail tally of one scenario across its seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBreakdown {
    pub episodes: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    /// Metrics averaged over the scenario's passing episodes.
    pub metrics: Option<MetricsSnapshot>,
}

/// Aggregate outcome of a benchmark run.
///
/// Built from results sorted by `(scenario, seed)`, so it is identical for
/// any parallelism and any completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub total_episodes: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    /// Metrics averaged over all passing episodes.
    pub aggregate_metrics: Option<MetricsSnapshot>,
    pub scenarios: BTreeMap<String, ScenarioBreakdown>,
    pub results: Vec<EpisodeResult>,
}

impl BenchmarkSummary {
    pub fn from_results(mut results: Vec<EpisodeResult>) -> Self {
        results.sort_by(|a, b| (&a.scenario, a.seed).cmp(&(&b.scenario, b.seed)));

        let mut grouped: BTreeMap<&str, Vec<&EpisodeResult>> = BTreeMap::new();
        for result in &results {
            grouped.entry(&result.scenario).or_default().push(result);
        }

        let scenarios = grouped
            .into_iter()
            .map(|(name, episodes)| {
                let passed = episodes.iter().filter(|r| r.passed()).count();
                let breakdown = ScenarioBreakdown {
                    episodes: episodes.len(),
                    passed,
                    failed: episodes.len() - passed,
                    pass_rate: rate(passed, episodes.len()),
                    metrics: average(
                        episodes
                            .iter()
                            .filter(|r| r.passed())
                            .map(|r| &r.metrics),
                    ),
                };
                (name.to_string(), breakdown)
            })
            .collect();

        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            total_episodes: results.len(),
            passed,
            failed: results.len() - passed,
            pass_rate: rate(passed, results.len()),
            aggregate_metrics: average(
                results.iter().filter(|r| r.passed()).map(|r| &r.metrics),
            ),
            scenarios,
            results,
        }
    }

    /// Results that failed, in `(scenario, seed)` order.
    pub fn failures(&self) -> impl Iterator<Item = &EpisodeResult> {
        self.results.iter().filter(|result| !result.passed())
    }
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} episodes: {} passed, {} failed (pass rate {:.1}%)",
            self.total_episodes,
            self.passed,
            self.failed,
            self.pass_rate * 100.0
        )?;
        for (name, breakdown) in &self.scenarios {
            write!(
                f,
                "  {:<40} {:>3}/{:<3}",
                name, breakdown.passed, breakdown.episodes
            )?;
            if let Some(metrics) = &breakdown.metrics {
                write!(f, "  {}", metrics)?;
            }
            writeln!(f)?;
        }
        if let Some(metrics) = &self.aggregate_metrics {
            writeln!(f, "aggregate: {}", metrics)?;
        }
        Ok(())
    }
}

fn rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════

/// Runs many episodes on a bounded pool of tokio tasks.
///
/// Each episode gets its own engine and its own client from the factory.
/// A failure in one episode (bad seed file, client setup error, panic)
/// becomes a failed result for that episode only.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    registry: Arc<ScenarioRegistry>,
    factory: Arc<dyn ClientFactory>,
}

impl BenchmarkRunner {
    pub fn new(
        config: BenchmarkConfig,
        registry: Arc<ScenarioRegistry>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, RunnerError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            factory,
        })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// The `(scenario, seed)` pairs this benchmark will run, in order.
    pub fn episodes(&self) -> Result<Vec<(String, u64)>, RunnerError> {
        let mut episodes = self
            .registry
            .episodes(&self.config.scenarios, self.config.max_seeds)?;
        if let Some(max) = self.config.max_episodes {
            episodes.truncate(max);
        }
        Ok(episodes)
    }

    pub async fn run(&self) -> Result<BenchmarkSummary, RunnerError> {
        let episodes = self.episodes()?;
        let started = Instant::now();
        info!(
            episodes = episodes.len(),
            parallelism = self.config.parallelism,
            "Starting benchmark"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let results = Arc::new(Mutex::new(Vec::with_capacity(episodes.len())));
        let runner = EpisodeRunner::new(self.config.episode_config());
        let mut tasks = JoinSet::new();

        for (scenario, seed) in episodes.iter().cloned() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let registry = self.registry.clone();
            let factory = self.factory.clone();
            let runner = runner.clone();
            let results = results.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let result = run_isolated(&runner, &registry, factory.as_ref(), &scenario, seed).await;
                results.lock().push(result);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Episode task did not complete");
            }
        }

        let mut results = std::mem::take(&mut *results.lock());
        let finished: HashSet<(String, u64)> = results
            .iter()
            .map(|result| (result.scenario.clone(), result.seed))
            .collect();
        for (scenario, seed) in episodes {
            if !finished.contains(&(scenario.clone(), seed)) {
                results.push(EpisodeResult::aborted(
                    scenario,
                    seed,
                    Violation::new(
                        ViolationKind::InternalError,
                        Step::ZERO,
                        "episode produced no result",
                    ),
                ));
            }
        }

        let summary = BenchmarkSummary::from_results(results);
        info!(
            total = summary.total_episodes,
            passed = summary.passed,
            failed = summary.failed,
            elapsed = ?started.elapsed(),
            "Benchmark finished"
        );
        Ok(summary)
    }
}

/// Run one episode, turning every failure into a failed result.
async fn run_isolated(
    runner: &EpisodeRunner,
    registry: &ScenarioRegistry,
    factory: &dyn ClientFactory,
    scenario: &str,
    seed: u64,
) -> EpisodeResult {
    let episode = async {
        let config = match registry.load(scenario, seed) {
            Ok(config) => config,
            Err(e) => {
                warn!(scenario, seed, error = %e, "Failed to load scenario");
                return EpisodeResult::aborted(
                    scenario,
                    seed,
                    Violation::new(ViolationKind::InternalError, Step::ZERO, e.to_string()),
                );
            }
        };

        let mut client = match factory.create(scenario, seed) {
            Ok(client) => client,
            Err(e) => {
                warn!(scenario, seed, error = %e, "Failed to create agent client");
                return EpisodeResult::aborted(
                    scenario,
                    seed,
                    Violation::new(ViolationKind::InternalError, Step::ZERO, e.to_string()),
                );
            }
        };

        runner.run(scenario, seed, config, client.as_mut()).await
    };

    match AssertUnwindSafe(episode).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(scenario, seed, panic = %message, "Episode panicked");
            EpisodeResult::aborted(
                scenario,
                seed,
                Violation::new(
                    ViolationKind::InternalError,
                    Step::ZERO,
                    format!("episode panicked: {}", message),
                ),
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::GreedyAgent;
    use crate::client::{ClientError, DecisionClient, InProcessClient};
    use qbench_test_helpers::{PanickingAgent, ScenarioBuilder};
    use tracing_test::traced_test;

    fn registry() -> ScenarioRegistry {
        let mut registry = ScenarioRegistry::new();
        for seed in 1..=3 {
            registry.insert_inline(
                "steady",
                seed,
                ScenarioBuilder::new(10, 2)
                    .routine("r1", 0, 5)
                    .urgent("u1", seed, seed + 3)
                    .routine("r2", 2, 9)
                    .build(),
            );
        }
        registry.insert_inline(
            "overload",
            1,
            ScenarioBuilder::new(4, 1)
                .urgent("u1", 0, 1)
                .urgent("u2", 0, 1)
                .build(),
        );
        registry
    }

    fn greedy_factory() -> Arc<dyn ClientFactory> {
        Arc::new(|_: &str, _: u64| -> Result<Box<dyn DecisionClient>, ClientError> {
            Ok(Box::new(InProcessClient::new(GreedyAgent::new())))
        })
    }

    #[test]
    fn test_config_validation() {
        assert!(BenchmarkConfig::new().validate().is_ok());
        assert!(matches!(
            BenchmarkConfig::new().with_parallelism(0).validate(),
            Err(RunnerError::InvalidParallelism { value: 0, .. })
        ));
        assert!(BenchmarkConfig::new().with_parallelism(101).validate().is_err());
        assert!(BenchmarkConfig::new().with_parallelism(100).validate().is_ok());
    }

    #[test]
    fn test_default_config_bounds_every_episode() {
        let episode = BenchmarkConfig::default().episode_config();
        assert_eq!(episode.episode_budget, Some(Duration::from_secs(300)));
        assert_eq!(episode.step_timeout, None);

        let overridden = BenchmarkConfig::new()
            .with_episode_budget(Duration::from_secs(5))
            .episode_config();
        assert_eq!(overridden.episode_budget, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_config_from_toml() {
        let config = BenchmarkConfig::from_toml_str(
            r#"
            parallelism = 8
            scenarios = ["steady"]
            max_seeds = 2
            step_timeout_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.max_seeds, Some(2));

        let episode = config.episode_config();
        assert_eq!(episode.step_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(
            episode.episode_budget,
            Some(Duration::from_millis(DEFAULT_EPISODE_BUDGET_MS))
        );

        assert!(matches!(
            BenchmarkConfig::from_toml_str("paralelism = 2"),
            Err(RunnerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_episode_selection() {
        let runner = BenchmarkRunner::new(
            BenchmarkConfig::new().with_max_seeds(2).with_max_episodes(2),
            Arc::new(registry()),
            greedy_factory(),
        )
        .unwrap();

        assert_eq!(
            runner.episodes().unwrap(),
            vec![("overload".to_string(), 1), ("steady".to_string(), 1)]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_parallelism_does_not_change_summary() {
        let registry = Arc::new(registry());
        let sequential = BenchmarkRunner::new(
            BenchmarkConfig::new().with_parallelism(1),
            registry.clone(),
            greedy_factory(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();
        let parallel = BenchmarkRunner::new(
            BenchmarkConfig::new().with_parallelism(4),
            registry,
            greedy_factory(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(sequential.total_episodes, 4);
        assert_eq!(sequential.passed, 3);
        assert_eq!(sequential.scenarios["overload"].failed, 1);
        assert_eq!(sequential.scenarios["steady"].pass_rate, 1.0);
        assert!(sequential.scenarios["overload"].metrics.is_none());
        assert!(logs_contain("Benchmark finished"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_episode_is_isolated() {
        let factory: Arc<dyn ClientFactory> = Arc::new(
            |scenario: &str, _: u64| -> Result<Box<dyn DecisionClient>, ClientError> {
                if scenario == "overload" {
                    Ok(Box::new(InProcessClient::new(PanickingAgent::at(1))))
                } else {
                    Ok(Box::new(InProcessClient::new(GreedyAgent::new())))
                }
            },
        );
        let summary = BenchmarkRunner::new(
            BenchmarkConfig::new().with_parallelism(2),
            Arc::new(registry()),
            factory,
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        assert_eq!(summary.total_episodes, 4);
        let failed: Vec<&EpisodeResult> = summary.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].scenario, "overload");
        assert_eq!(
            failed[0].violations[0].kind,
            ViolationKind::InternalError
        );
        assert!(failed[0].violations[0].detail.contains("agent gave up"));
        assert!(logs_contain("Episode panicked"));
    }

    #[tokio::test]
    async fn test_broken_seed_file_fails_only_its_episode() {
        let mut registry = registry();
        registry.insert_file("steady", 9, "/nonexistent/seed_9.json".into());

        let summary = BenchmarkRunner::new(
            BenchmarkConfig::new()
                .with_parallelism(3)
                .with_scenarios(vec!["steady".to_string()]),
            Arc::new(registry),
            greedy_factory(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        assert_eq!(summary.total_episodes, 4);
        assert_eq!(summary.passed, 3);
        let broken = summary.results.last().unwrap();
        assert_eq!(broken.seed, 9);
        assert_eq!(broken.violations[0].kind, ViolationKind::InternalError);
    }

    #[tokio::test]
    async fn test_client_setup_failure_fails_episode() {
        let factory: Arc<dyn ClientFactory> = Arc::new(
            |_: &str, _: u64| -> Result<Box<dyn DecisionClient>, ClientError> {
                Err(ClientError::Setup("no agent".to_string()))
            },
        );
        let summary = BenchmarkRunner::new(BenchmarkConfig::new(), Arc::new(registry()), factory)
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(summary.passed, 0);
        assert_eq!(summary.pass_rate, 0.0);
        assert!(summary.aggregate_metrics.is_none());
    }

    #[test]
    fn test_summary_display() {
        let summary = BenchmarkSummary::from_results(vec![EpisodeResult::aborted(
            "steady",
            1,
            Violation::new(ViolationKind::InternalError, Step::ZERO, "boom"),
        )]);
        let text = summary.to_string();
        assert!(text.contains("1 episodes: 0 passed, 1 failed"));
        assert!(text.contains("steady"));
    }
}
