//! Observation snapshot handed to the agent each step.

use crate::{Step, Task, TaskId};
use serde::{Deserialize, Serialize};

/// A scheduled task together with the step it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task: Task,
    pub step: Step,
}

/// Read-only view of the queue at the start of a step.
///
/// This is an owned copy: mutating it never affects the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub time: Step,
    pub horizon: u64,
    pub capacity_per_step: u32,
    /// Tasks that arrived at this step.
    #[serde(default)]
    pub arrivals: Vec<Task>,
    /// Task ids cancelled externally at this step.
    #[serde(default)]
    pub cancellations: Vec<TaskId>,
    /// All tasks awaiting a slot.
    #[serde(default)]
    pub pending: Vec<Task>,
    /// All tasks holding a future slot.
    #[serde(default)]
    pub scheduled: Vec<ScheduledTask>,
    /// Task ids completed on entering this step.
    #[serde(default)]
    pub completed_this_step: Vec<TaskId>,
    /// Task ids that missed their deadline at the end of the previous step.
    #[serde(default)]
    pub missed_this_step: Vec<TaskId>,
}

impl Observation {
    /// Number of tasks already holding `step`.
    pub fn scheduled_at(&self, step: Step) -> usize {
        self.scheduled
            .iter()
            .filter(|scheduled| scheduled.step == step)
            .count()
    }

    /// Pending plus scheduled task count.
    pub fn backlog(&self) -> usize {
        self.pending.len() + self.scheduled.len()
    }

    /// Steps remaining before the horizon.
    pub fn remaining_steps(&self) -> u64 {
        self.horizon.saturating_sub(self.time.0)
    }
}
