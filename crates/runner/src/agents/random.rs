use qbench_core::Agent;
use qbench_types::{Action, Observation, Step};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Probability of scheduling a pending task in a given step.
const SCHEDULE_PROB: f64 = 0.6;

/// Probability of rejecting a pending task (checked after scheduling).
const REJECT_PROB: f64 = 0.1;

/// Probability of moving an already scheduled task.
const RESCHEDULE_PROB: f64 = 0.05;

/// Submits random, plausible-looking actions.
///
/// Targets are always inside `(t, horizon)` but capacity and priority are
/// ignored, so a fair share of its actions get rejected by the validator.
/// The action stream depends only on the seed and the observations.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn target(&mut self, observation: &Observation) -> Option<Step> {
        let first = observation.time.0 + 1;
        let last = observation.horizon.checked_sub(1)?;
        (first <= last).then(|| Step(self.rng.gen_range(first..=last)))
    }
}

impl Agent for RandomAgent {
    fn name(&self) -> &str {
        "random"
    }

    fn decide(&mut self, observation: &Observation) -> Vec<Action> {
        let mut actions = Vec::new();

        for task in &observation.pending {
            let roll: f64 = self.rng.gen();
            if roll < SCHEDULE_PROB {
                if let Some(step) = self.target(observation) {
                    actions.push(Action::Schedule {
                        task_id: task.id.clone(),
                        step,
                    });
                }
            } else if roll < SCHEDULE_PROB + REJECT_PROB {
                actions.push(Action::Reject {
                    task_id: task.id.clone(),
                });
            }
        }

        for scheduled in &observation.scheduled {
            if self.rng.gen_bool(RESCHEDULE_PROB) {
                if let Some(step) = self.target(observation) {
                    actions.push(Action::Reschedule {
                        task_id: scheduled.task.id.clone(),
                        step,
                    });
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::{Priority, Task, TaskId};

    fn observation() -> Observation {
        Observation {
            time: Step(2),
            horizon: 8,
            capacity_per_step: 2,
            pending: (0..20)
                .map(|i| {
                    Task::new(
                        TaskId::new(format!("t{}", i)),
                        Step(0),
                        Priority::Routine,
                        Step(7),
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_seed_same_actions() {
        let obs = observation();
        let first: Vec<Vec<Action>> = {
            let mut agent = RandomAgent::new(11);
            (0..3).map(|_| agent.decide(&obs)).collect()
        };
        let second: Vec<Vec<Action>> = {
            let mut agent = RandomAgent::new(11);
            (0..3).map(|_| agent.decide(&obs)).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_targets_stay_inside_horizon() {
        let obs = observation();
        let mut agent = RandomAgent::new(5);
        for _ in 0..10 {
            for action in agent.decide(&obs) {
                if let Some(step) = action.target_step() {
                    assert!(step > obs.time && step.0 < obs.horizon, "{}", action);
                }
            }
        }
    }

    #[test]
    fn test_last_step_has_no_targets() {
        let mut obs = observation();
        obs.time = Step(7);
        let actions = RandomAgent::new(5).decide(&obs);
        assert!(actions.iter().all(|action| action.target_step().is_none()));
    }
}
