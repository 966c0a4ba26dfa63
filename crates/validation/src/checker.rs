//! Hard pass/fail policy.

use indexmap::IndexMap;
use qbench_types::{
    Step, StepRecord, Task, TaskId, TaskStatus, Verdict, Violation, ViolationKind,
};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Outcome of a constraint check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub verdict: Verdict,
    /// Violations detected by the checker that were missing from the log.
    pub findings: Vec<Violation>,
}

/// Decides the hard verdict of a finished (or aborted) episode.
///
/// The episode fails iff at least one of:
///
/// 1. an urgent task ended `missed`
/// 2. a step completed more tasks than the capacity recorded for it
/// 3. the log holds a fatal violation
/// 4. the task table contradicts itself (e.g. a missed task with a
///    completion step)
///
/// Deterministic and side-effect free. It reads the violation log, task
/// table and trace only, never engine internals, so it double-checks the
/// engine rather than trusting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintChecker;

impl ConstraintChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(
        &self,
        violations: &[Violation],
        tasks: &IndexMap<TaskId, Task>,
        trace: &[StepRecord],
        horizon: u64,
    ) -> CheckReport {
        let mut findings = Vec::new();

        self.check_urgent_misses(violations, tasks, &mut findings);
        self.check_occupancy(violations, tasks, trace, &mut findings);
        self.check_task_table(tasks, horizon, &mut findings);

        for finding in &findings {
            warn!(violation = %finding, "Constraint checker found unlogged violation");
        }

        let failed = !findings.is_empty() || violations.iter().any(Violation::is_fatal);
        CheckReport {
            verdict: if failed { Verdict::Fail } else { Verdict::Pass },
            findings,
        }
    }

    fn check_urgent_misses(
        &self,
        violations: &[Violation],
        tasks: &IndexMap<TaskId, Task>,
        findings: &mut Vec<Violation>,
    ) {
        let logged: HashSet<&TaskId> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::DeadlineMiss)
            .filter_map(|v| v.task_id.as_ref())
            .collect();

        for task in tasks.values() {
            if task.priority.is_urgent()
                && task.status == TaskStatus::Missed
                && !logged.contains(&task.id)
            {
                findings.push(
                    Violation::new(
                        ViolationKind::DeadlineMiss,
                        task.deadline,
                        "urgent task missed without a logged deadline miss",
                    )
                    .with_task(task.id.clone()),
                );
            }
        }
    }

    fn check_occupancy(
        &self,
        violations: &[Violation],
        tasks: &IndexMap<TaskId, Task>,
        trace: &[StepRecord],
        findings: &mut Vec<Violation>,
    ) {
        let mut completions: BTreeMap<Step, u32> = BTreeMap::new();
        for task in tasks.values() {
            if let Some(step) = task.completion_step {
                *completions.entry(step).or_default() += 1;
            }
        }

        let logged_overruns: HashSet<Step> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::CapacityOverrun)
            .map(|v| v.step)
            .collect();

        for record in trace {
            let used = completions.get(&record.time).copied().unwrap_or(0);
            if used != record.slots_used {
                findings.push(Violation::new(
                    ViolationKind::InvariantBreach,
                    record.time,
                    format!(
                        "trace records {} slots used but {} tasks completed",
                        record.slots_used, used
                    ),
                ));
            }
            if used > record.capacity && !logged_overruns.contains(&record.time) {
                findings.push(Violation::new(
                    ViolationKind::CapacityOverrun,
                    record.time,
                    format!("{} tasks completed with capacity {}", used, record.capacity),
                ));
            }
        }
    }

    fn check_task_table(
        &self,
        tasks: &IndexMap<TaskId, Task>,
        horizon: u64,
        findings: &mut Vec<Violation>,
    ) {
        for task in tasks.values() {
            let problem = match (task.status, task.scheduled_step, task.completion_step) {
                (TaskStatus::Completed, _, None) => Some("completed without completion step"),
                (TaskStatus::Completed, _, Some(done)) if done > task.deadline => {
                    Some("completed after its deadline")
                }
                (TaskStatus::Completed, _, Some(done)) if done <= task.arrival_time => {
                    Some("completed before it could be scheduled")
                }
                (TaskStatus::Completed, _, Some(done)) if done.0 >= horizon => {
                    Some("completed beyond the horizon")
                }
                (TaskStatus::Scheduled, None, _) => Some("scheduled without a slot"),
                (status, _, Some(_)) if status != TaskStatus::Completed => {
                    Some("has a completion step but is not completed")
                }
                _ => None,
            };

            if let Some(problem) = problem {
                let step = task.completion_step.unwrap_or(task.arrival_time);
                findings.push(
                    Violation::new(ViolationKind::InvariantBreach, step, problem)
                        .with_task(task.id.clone()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::{Priority, RejectReason};
    use tracing_test::traced_test;

    fn task(id: &str, priority: Priority, arrival: u64, deadline: u64) -> Task {
        Task::new(TaskId::new(id), Step(arrival), priority, Step(deadline))
    }

    fn completed(mut task: Task, at: u64) -> Task {
        task.status = TaskStatus::Completed;
        task.scheduled_step = Some(Step(at));
        task.completion_step = Some(Step(at));
        task
    }

    fn table(tasks: Vec<Task>) -> IndexMap<TaskId, Task> {
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    fn record(time: u64, capacity: u32, slots_used: u32) -> StepRecord {
        StepRecord {
            time: Step(time),
            capacity,
            slots_used,
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_episode_passes() {
        let tasks = table(vec![completed(task("a", Priority::Urgent, 0, 3), 2)]);
        let trace = vec![record(0, 1, 0), record(1, 1, 0), record(2, 1, 1)];
        let violations = vec![
            Violation::invalid_action(Step(0), RejectReason::CapacityExceeded, ""),
            Violation::new(ViolationKind::DuplicateIdConflict, Step(1), ""),
        ];

        let report = ConstraintChecker::new().check(&violations, &tasks, &trace, 5);
        assert_eq!(report.verdict, Verdict::Pass);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_logged_fatal_violation_fails() {
        let mut missed = task("u1", Priority::Urgent, 0, 12);
        missed.status = TaskStatus::Missed;
        let violations = vec![
            Violation::new(ViolationKind::DeadlineMiss, Step(12), "").with_task(TaskId::new("u1"))
        ];

        let report = ConstraintChecker::new().check(&violations, &table(vec![missed]), &[], 20);
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.findings.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_unlogged_urgent_miss_is_found() {
        let mut missed = task("u1", Priority::Urgent, 0, 4);
        missed.status = TaskStatus::Missed;

        let report = ConstraintChecker::new().check(&[], &table(vec![missed]), &[], 10);
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, ViolationKind::DeadlineMiss);
        assert!(logs_contain("unlogged violation"));
    }

    #[test]
    fn test_routine_miss_does_not_fail() {
        let mut missed = task("r1", Priority::Routine, 0, 4);
        missed.status = TaskStatus::Missed;

        let report = ConstraintChecker::new().check(&[], &table(vec![missed]), &[], 10);
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[test]
    fn test_overrun_found_from_trace() {
        let tasks = table(vec![
            completed(task("a", Priority::Routine, 0, 5), 3),
            completed(task("b", Priority::Routine, 0, 5), 3),
        ]);
        let trace = vec![record(3, 1, 2)];

        let report = ConstraintChecker::new().check(&[], &tasks, &trace, 10);
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.findings[0].kind, ViolationKind::CapacityOverrun);
        assert_eq!(report.findings[0].step, Step(3));
    }

    #[test]
    fn test_inconsistent_task_table_is_found() {
        let mut missed = task("m", Priority::Routine, 0, 5);
        missed.status = TaskStatus::Missed;
        missed.completion_step = Some(Step(6));

        let report = ConstraintChecker::new().check(&[], &table(vec![missed]), &[], 10);
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.findings[0].kind, ViolationKind::InvariantBreach);
    }
}
