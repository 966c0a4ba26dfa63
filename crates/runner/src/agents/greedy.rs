//! Earliest-deadline-first baseline.

use qbench_core::Agent;
use qbench_types::{Action, Observation, Step, Task, TaskId};
use std::collections::BTreeMap;
use tracing::debug;

/// Schedules urgent tasks first, then by earliest deadline, each into the
/// earliest step in `(t, deadline]` with free capacity.
///
/// Routine tasks that cannot fit before their deadline are rejected. An
/// urgent task that cannot fit displaces a routine task holding a slot in
/// its window: the routine task moves to a later free slot when one exists
/// within its own deadline, and is cancelled otherwise.
///
/// Future capacity is assumed to equal the capacity observed now.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAgent;

impl GreedyAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Agent for GreedyAgent {
    fn name(&self) -> &str {
        "greedy"
    }

    fn decide(&mut self, observation: &Observation) -> Vec<Action> {
        let mut plan = SlotPlan::new(observation);
        let first = observation.time.next();

        let mut pending: Vec<&Task> = observation.pending.iter().collect();
        pending.sort_by(|a, b| {
            (a.priority, a.deadline, a.arrival_time)
                .cmp(&(b.priority, b.deadline, b.arrival_time))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut actions = Vec::new();
        for task in pending {
            let last = plan.last_slot(task.deadline);
            if let Some(step) = plan.free_slot(first, last) {
                plan.take(step);
                actions.push(Action::Schedule {
                    task_id: task.id.clone(),
                    step,
                });
            } else if !task.priority.is_urgent() {
                actions.push(Action::Reject {
                    task_id: task.id.clone(),
                });
            } else if let Some(step) = plan.displace(first, last, &mut actions) {
                plan.take(step);
                actions.push(Action::Schedule {
                    task_id: task.id.clone(),
                    step,
                });
            } else {
                debug!(
                    step = observation.time.0,
                    task = %task.id,
                    "No slot left for urgent task"
                );
            }
        }
        actions
    }
}

/// A routine task currently holding a slot.
#[derive(Debug)]
struct Holder {
    task_id: TaskId,
    step: Step,
    deadline: Step,
}

/// The agent's working copy of slot occupancy for one decision.
#[derive(Debug)]
struct SlotPlan {
    capacity: usize,
    horizon: u64,
    occupancy: BTreeMap<Step, usize>,
    routine: Vec<Holder>,
}

impl SlotPlan {
    fn new(observation: &Observation) -> Self {
        let mut occupancy = BTreeMap::new();
        let mut routine = Vec::new();
        for scheduled in &observation.scheduled {
            *occupancy.entry(scheduled.step).or_insert(0) += 1;
            if !scheduled.task.priority.is_urgent() {
                routine.push(Holder {
                    task_id: scheduled.task.id.clone(),
                    step: scheduled.step,
                    deadline: scheduled.task.deadline,
                });
            }
        }
        // Displace the loosest routine task first.
        routine.sort_by(|a, b| {
            b.deadline
                .cmp(&a.deadline)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });

        Self {
            capacity: observation.capacity_per_step as usize,
            horizon: observation.horizon,
            occupancy,
            routine,
        }
    }

    /// Last step a task with `deadline` may occupy.
    fn last_slot(&self, deadline: Step) -> Step {
        deadline.min(Step(self.horizon.saturating_sub(1)))
    }

    fn used(&self, step: Step) -> usize {
        self.occupancy.get(&step).copied().unwrap_or(0)
    }

    fn free_slot(&self, from: Step, to: Step) -> Option<Step> {
        (from.0..=to.0)
            .map(Step)
            .find(|&step| self.used(step) < self.capacity)
    }

    fn take(&mut self, step: Step) {
        *self.occupancy.entry(step).or_insert(0) += 1;
    }

    fn release(&mut self, step: Step) {
        if let Some(used) = self.occupancy.get_mut(&step) {
            *used = used.saturating_sub(1);
        }
    }

    /// Free a slot in `[from, to]` held by a routine task, recording the
    /// reschedule or cancel that frees it.
    fn displace(&mut self, from: Step, to: Step, actions: &mut Vec<Action>) -> Option<Step> {
        let candidates: Vec<usize> = (0..self.routine.len())
            .filter(|&i| (from..=to).contains(&self.routine[i].step))
            .collect();

        for &index in &candidates {
            let deadline = self.routine[index].deadline;
            if let Some(target) = self.free_slot(from, self.last_slot(deadline)) {
                let holder = self.routine.remove(index);
                let freed = holder.step;
                self.release(freed);
                self.take(target);
                actions.push(Action::Reschedule {
                    task_id: holder.task_id.clone(),
                    step: target,
                });
                self.routine.push(Holder {
                    step: target,
                    ..holder
                });
                return Some(freed);
            }
        }

        let index = *candidates.first()?;
        let holder = self.routine.remove(index);
        self.release(holder.step);
        actions.push(Action::Cancel {
            task_id: holder.task_id,
        });
        Some(holder.step)
    }
}
