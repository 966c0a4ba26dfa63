//! Seeded synthetic scenario generation.

use qbench_types::{Event, Priority, ScenarioConfig, Step, TaskId};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Shape of the arrival rate over the episode.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum LoadPattern {
    /// Constant mean rate.
    #[default]
    Steady,

    /// Rate grows linearly from zero to twice the mean.
    RampUp,

    /// Rate falls linearly from twice the mean to zero.
    RampDown,

    /// Steady background with a burst every `period` steps.
    Bursts {
        /// Steps between bursts.
        period: u64,
        /// Extra arrivals per burst.
        size: u32,
    },
}

/// Parameters of a generated scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorConfig {
    pub horizon: u64,

    pub capacity_per_step: u32,

    /// Mean arrivals per step.
    pub arrival_rate: f64,

    /// Fraction of arrivals that are urgent.
    pub urgent_ratio: f64,

    /// Deadline slack range (steps after arrival), inclusive.
    pub min_slack: u64,
    pub max_slack: u64,

    /// Fraction of arrivals later cancelled by a scripted event.
    pub cancel_ratio: f64,

    /// Fraction of arrivals whose id is re-sent at a later step.
    pub duplicate_ratio: f64,

    /// Number of scripted capacity changes.
    pub capacity_changes: u32,

    pub pattern: LoadPattern,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            capacity_per_step: 3,
            arrival_rate: 2.0,
            urgent_ratio: 0.3,
            min_slack: 2,
            max_slack: 10,
            cancel_ratio: 0.05,
            duplicate_ratio: 0.0,
            capacity_changes: 0,
            pattern: LoadPattern::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn new(horizon: u64, capacity_per_step: u32) -> Self {
        Self {
            horizon,
            capacity_per_step,
            ..Default::default()
        }
    }

    pub fn with_arrival_rate(mut self, rate: f64) -> Self {
        self.arrival_rate = rate.max(0.0);
        self
    }

    pub fn with_urgent_ratio(mut self, ratio: f64) -> Self {
        self.urgent_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_slack(mut self, min: u64, max: u64) -> Self {
        self.min_slack = min.min(max);
        self.max_slack = max.max(min);
        self
    }

    pub fn with_cancel_ratio(mut self, ratio: f64) -> Self {
        self.cancel_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_duplicate_ratio(mut self, ratio: f64) -> Self {
        self.duplicate_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_capacity_changes(mut self, changes: u32) -> Self {
        self.capacity_changes = changes;
        self
    }

    pub fn with_pattern(mut self, pattern: LoadPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Mean arrival rate at `step` under the configured pattern.
    fn rate_at(&self, step: u64) -> f64 {
        let progress = if self.horizon > 1 {
            step as f64 / (self.horizon - 1) as f64
        } else {
            0.0
        };
        match self.pattern {
            LoadPattern::Steady | LoadPattern::Bursts { .. } => self.arrival_rate,
            LoadPattern::RampUp => 2.0 * self.arrival_rate * progress,
            LoadPattern::RampDown => 2.0 * self.arrival_rate * (1.0 - progress),
        }
    }
}

/// Generates valid scenarios from a [`GeneratorConfig`] and a seed.
///
/// The same config and seed always produce the same scenario.
#[derive(Clone, Debug)]
pub struct ScenarioGenerator {
    config: GeneratorConfig,
}

impl ScenarioGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn generate(&self, seed: u64) -> ScenarioConfig {
        let config = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut scenario = ScenarioConfig::new(config.horizon, config.capacity_per_step.max(1));
        if config.horizon == 0 {
            return scenario;
        }

        // Arrivals are only useful while a slot before the horizon remains.
        let last_arrival = config.horizon.saturating_sub(2);
        let mut arrived: Vec<(TaskId, u64, u64)> = Vec::new();
        let mut next_id = 0u64;

        for step in 0..=last_arrival {
            let mut count = poisson(&mut rng, config.rate_at(step));
            if let LoadPattern::Bursts { period, size } = config.pattern {
                if period > 0 && step > 0 && step % period == 0 {
                    count += size;
                }
            }

            for _ in 0..count {
                let urgent = rng.gen_bool(config.urgent_ratio.clamp(0.0, 1.0));
                let (priority, prefix) = if urgent {
                    (Priority::Urgent, "u")
                } else {
                    (Priority::Routine, "r")
                };
                let id = TaskId::new(format!("{}{}", prefix, next_id));
                next_id += 1;

                let slack =
                    rng.gen_range(config.min_slack..=config.max_slack.max(config.min_slack));
                let deadline = (step + slack.max(1)).min(config.horizon - 1);

                scenario.push_event(Step(step), Event::arrival(id.clone(), priority, deadline));
                arrived.push((id, step, deadline));
            }
        }

        for (id, arrival, deadline) in &arrived {
            if *deadline > *arrival && rng.gen_bool(config.cancel_ratio.clamp(0.0, 1.0)) {
                let at = rng.gen_range(arrival + 1..=*deadline);
                scenario.push_event(Step(at), Event::cancel(id.clone()));
            }
        }

        for (id, arrival, deadline) in &arrived {
            if *arrival < last_arrival && rng.gen_bool(config.duplicate_ratio.clamp(0.0, 1.0)) {
                let at = rng.gen_range(arrival + 1..=last_arrival);
                let priority = if rng.gen_bool(0.5) {
                    Priority::Urgent
                } else {
                    Priority::Routine
                };
                let resent_deadline = (*deadline).max(at);
                scenario.push_event(
                    Step(at),
                    Event::arrival(id.clone(), priority, resent_deadline),
                );
            }
        }

        let mut change_steps: Vec<u64> = (1..config.horizon).collect();
        change_steps.shuffle(&mut rng);
        for &step in change_steps.iter().take(config.capacity_changes as usize) {
            let capacity = rng.gen_range(1..=config.capacity_per_step.max(1) * 2);
            scenario.push_event(Step(step), Event::capacity_change(capacity));
        }

        scenario
    }
}

/// Poisson sample by inversion; adequate for the small rates used here.
fn poisson(rng: &mut impl Rng, mean: f64) -> u32 {
    if mean <= 0.0 {
        return 0;
    }
    let limit = (-mean).exp();
    let mut product: f64 = rng.gen();
    let mut count = 0;
    while product > limit {
        product *= rng.gen::<f64>();
        count += 1;
    }
    count
}
