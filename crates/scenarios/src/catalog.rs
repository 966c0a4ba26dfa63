//! Scenario catalog and registry.

use crate::loader::{load_file, LoadError, ScenarioLoader};
use qbench_types::ScenarioConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Names of the standard benchmark scenarios.
pub const SCENARIO_NAMES: [&str; 35] = [
    "backlog_cap_stability_guard",
    "cancel_then_rearrival_consistency",
    "cancellation_cascade_mass",
    "cold_start_to_surge",
    "conflicting_duplicate_id_robustness",
    "correlated_burst_cluster",
    "deceptive_calm_then_rate_shift",
    "double_peak_bursts",
    "duplicate_arrival_idempotency",
    "early_burst_then_calm",
    "fairness_anti_starvation",
    "gradual_capacity_increase",
    "hard_deadline_cutoff",
    "heavy_tail_random_bursts",
    "infeasible_overload_must_reject",
    "late_burst_slack_trap",
    "late_cancellation_backfill",
    "mixed_deadlines_tight_vs_loose",
    "mixed_priorities_tight_deadlines",
    "no_traffic_health_check",
    "periodic_spikes_wave_load",
    "planned_capacity_drop_window",
    "priority_mix_shift",
    "ramp_down_recovery",
    "ramp_up_load",
    "rolling_deadlines_stream",
    "routine_flood_with_urgent_trickle",
    "routine_spam_adversarial_load",
    "same_deadline_conflict",
    "stale_cancel_out_of_order",
    "steady_low_load_baseline",
    "steady_near_capacity",
    "temporary_capacity_boost_window",
    "unannounced_capacity_drop_shock",
    "urgent_flood_strict_sla",
];

/// Whether `name` is one of the standard scenarios.
pub fn is_standard(name: &str) -> bool {
    SCENARIO_NAMES.contains(&name)
}

/// Where a registered scenario seed comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioSource {
    /// A seed file, loaded on demand.
    File(PathBuf),
    /// An in-memory scenario.
    Inline(ScenarioConfig),
}

impl ScenarioSource {
    pub fn load(&self) -> Result<ScenarioConfig, LoadError> {
        match self {
            ScenarioSource::File(path) => load_file(path),
            ScenarioSource::Inline(config) => Ok(config.clone()),
        }
    }
}

/// Scenario name → seed → source.
///
/// Built once, then shared read-only (behind an `Arc`) by every worker.
/// Seed files are parsed when an episode asks for them, so a broken file
/// only fails its own episode.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, BTreeMap<u64, ScenarioSource>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every `<scenario>/seed_<n>.json` under the loader's root.
    pub fn discover(loader: &ScenarioLoader) -> Result<Self, LoadError> {
        let mut registry = Self::new();
        for name in loader.scenario_dirs()? {
            for seed in loader.seeds(&name)? {
                registry.insert_file(&name, seed, loader.seed_path(&name, seed));
            }
        }

        let standard = registry.names().filter(|name| is_standard(name)).count();
        info!(
            root = %loader.root().display(),
            scenarios = registry.len(),
            standard,
            seeds = registry.seed_count(),
            "Discovered scenarios"
        );
        Ok(registry)
    }

    pub fn insert_file(&mut self, name: &str, seed: u64, path: PathBuf) {
        self.insert(name, seed, ScenarioSource::File(path));
    }

    pub fn insert_inline(&mut self, name: &str, seed: u64, config: ScenarioConfig) {
        self.insert(name, seed, ScenarioSource::Inline(config));
    }

    fn insert(&mut self, name: &str, seed: u64, source: ScenarioSource) {
        self.scenarios
            .entry(name.to_string())
            .or_default()
            .insert(seed, source);
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn seed_count(&self) -> usize {
        self.scenarios.values().map(BTreeMap::len).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenarios.contains_key(name)
    }

    /// Registered scenario names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    /// Seeds registered for a scenario, ascending.
    pub fn seeds(&self, name: &str) -> Result<Vec<u64>, LoadError> {
        self.scenarios
            .get(name)
            .map(|seeds| seeds.keys().copied().collect())
            .ok_or_else(|| LoadError::UnknownScenario(name.to_string()))
    }

    /// Resolve a scenario filter. An empty filter or one containing `all`
    /// selects every registered scenario.
    pub fn select(&self, filter: &[String]) -> Result<Vec<String>, LoadError> {
        if filter.is_empty() || filter.iter().any(|name| name == "all") {
            return Ok(self.names().map(str::to_string).collect());
        }
        filter
            .iter()
            .map(|name| {
                if self.contains(name) {
                    Ok(name.clone())
                } else {
                    Err(LoadError::UnknownScenario(name.clone()))
                }
            })
            .collect()
    }

    /// `(scenario, seed)` pairs for the selected scenarios, at most
    /// `max_seeds` per scenario (all seeds when `None`).
    pub fn episodes(
        &self,
        filter: &[String],
        max_seeds: Option<usize>,
    ) -> Result<Vec<(String, u64)>, LoadError> {
        let mut episodes = Vec::new();
        for name in self.select(filter)? {
            let seeds = self.seeds(&name)?;
            let take = max_seeds.unwrap_or(seeds.len());
            episodes.extend(seeds.into_iter().take(take).map(|seed| (name.clone(), seed)));
        }
        Ok(episodes)
    }

    /// Load the scenario registered under `(name, seed)`.
    pub fn load(&self, name: &str, seed: u64) -> Result<ScenarioConfig, LoadError> {
        let seeds = self
            .scenarios
            .get(name)
            .ok_or_else(|| LoadError::UnknownScenario(name.to_string()))?;
        let source = seeds.get(&seed).ok_or_else(|| LoadError::UnknownSeed {
            scenario: name.to_string(),
            seed,
        })?;
        source.load()
    }
}
