//! Episode trace, metrics and result types.

use crate::{Action, Step, Task, TaskId, TaskStatus, Violation};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard pass/fail outcome of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Soft performance statistics of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Routine tasks completed on time / routine tasks that ended neither
    /// cancelled nor rejected.
    pub routine_sla: f64,
    /// Mean steps between arrival and completion.
    pub avg_wait_time: f64,
    /// Mean pending + scheduled count per step.
    pub avg_backlog: f64,
    /// Mean slots used / capacity per step.
    pub avg_utilization: f64,
    /// Largest pending + scheduled count of any step.
    pub max_backlog: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "routine_sla={:.3} wait={:.1} backlog={:.1}/{} util={:.3}",
            self.routine_sla,
            self.avg_wait_time,
            self.avg_backlog,
            self.max_backlog,
            self.avg_utilization
        )
    }
}

/// One entry of the step trace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepRecord {
    pub time: Step,
    /// Capacity in effect at this step.
    pub capacity: u32,
    pub arrivals: Vec<TaskId>,
    pub cancellations: Vec<TaskId>,
    /// Tasks completed on entering this step.
    pub completed: Vec<TaskId>,
    /// Slots consumed at this step (equal to `completed.len()`).
    pub slots_used: u32,
    /// Pending count when the observation was built.
    pub pending: u64,
    /// Scheduled count when the observation was built.
    pub scheduled: u64,
    /// Actions the agent submitted at this step, in submission order.
    pub actions: Vec<Action>,
    /// How many of `actions` were accepted.
    pub accepted: u32,
    /// Tasks that missed their deadline at the end of this step.
    pub missed: Vec<TaskId>,
}

impl StepRecord {
    /// Pending plus scheduled count at observation time.
    pub fn backlog(&self) -> u64 {
        self.pending + self.scheduled
    }
}

/// Final task counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: u64,
    pub pending: u64,
    pub scheduled: u64,
    pub completed: u64,
    pub rejected: u64,
    pub cancelled: u64,
    pub missed: u64,
}

impl TaskSummary {
    /// Count tasks by status.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut summary = TaskSummary::default();
        for task in tasks {
            summary.total += 1;
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Scheduled => summary.scheduled += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Rejected => summary.rejected += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
                TaskStatus::Missed => summary.missed += 1,
            }
        }
        summary
    }
}

/// Everything one episode produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub scenario: String,
    pub seed: u64,
    pub verdict: Verdict,
    pub violations: Vec<Violation>,
    pub metrics: MetricsSnapshot,
    pub summary: TaskSummary,
    /// Steps actually executed (less than the horizon after a timeout).
    pub steps: u64,
    pub tasks: IndexMap<TaskId, Task>,
    pub trace: Vec<StepRecord>,
}

impl EpisodeResult {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    /// Violations that decided the verdict.
    pub fn fatal_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|violation| violation.is_fatal())
    }

    /// A failed result for an episode that never ran (or aborted), carrying
    /// the single violation that explains why.
    pub fn aborted(scenario: impl Into<String>, seed: u64, violation: Violation) -> Self {
        Self {
            scenario: scenario.into(),
            seed,
            verdict: Verdict::Fail,
            violations: vec![violation],
            metrics: MetricsSnapshot::default(),
            summary: TaskSummary::default(),
            steps: 0,
            tasks: IndexMap::new(),
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for EpisodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seed={} {}", self.scenario, self.seed, self.verdict)?;
        let fatal = self.fatal_violations().count();
        if fatal > 0 {
            write!(f, " ({} violations)", fatal)?;
        }
        write!(f, " - {}", self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Priority, ViolationKind};

    #[test]
    fn test_summary_counts_by_status() {
        let mut done = Task::new(TaskId::new("a"), Step(0), Priority::Routine, Step(4));
        done.status = TaskStatus::Completed;
        let mut missed = Task::new(TaskId::new("b"), Step(0), Priority::Urgent, Step(2));
        missed.status = TaskStatus::Missed;
        let pending = Task::new(TaskId::new("c"), Step(1), Priority::Routine, Step(4));

        let summary = TaskSummary::from_tasks([&done, &missed, &pending]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.missed, 1);
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn test_aborted_result_fails() {
        let result = EpisodeResult::aborted(
            "steady",
            2,
            Violation::new(ViolationKind::InternalError, Step::ZERO, "bad seed file"),
        );
        assert!(!result.passed());
        assert_eq!(result.fatal_violations().count(), 1);
    }
}
