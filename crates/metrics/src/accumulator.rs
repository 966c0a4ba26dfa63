//! Incremental metric reduction over an episode.

use indexmap::IndexMap;
use qbench_types::{MetricsSnapshot, Priority, StepRecord, Task, TaskId, TaskStatus};

/// Running reduction over an episode's trace and final task table.
///
/// Feed every trace record through [`observe_step`](Self::observe_step)
/// and every task through [`observe_task`](Self::observe_task), then call
/// [`finalize`](Self::finalize). Order of observation does not matter.
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    steps: u64,
    backlog_sum: u64,
    max_backlog: u64,
    utilization_sum: f64,

    routine_counted: u64,
    routine_on_time: u64,
    completed: u64,
    wait_sum: u64,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_step(&mut self, record: &StepRecord) {
        let backlog = record.backlog();
        self.steps += 1;
        self.backlog_sum += backlog;
        self.max_backlog = self.max_backlog.max(backlog);
        if record.capacity > 0 {
            self.utilization_sum += f64::from(record.slots_used) / f64::from(record.capacity);
        }
    }

    pub fn observe_task(&mut self, task: &Task) {
        if let Some(wait) = task.wait_time().filter(|_| task.status == TaskStatus::Completed) {
            self.completed += 1;
            self.wait_sum += wait;
        }

        // Excludes cancelled, rejected and still-open tasks.
        let counted = task.priority == Priority::Routine
            && task.is_terminal()
            && !matches!(task.status, TaskStatus::Cancelled | TaskStatus::Rejected);
        if counted {
            self.routine_counted += 1;
            if task.completed_on_time() {
                self.routine_on_time += 1;
            }
        }
    }

    pub fn finalize(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            routine_sla: ratio(self.routine_on_time as f64, self.routine_counted, 1.0),
            avg_wait_time: ratio(self.wait_sum as f64, self.completed, 0.0),
            avg_backlog: ratio(self.backlog_sum as f64, self.steps, 0.0),
            avg_utilization: ratio(self.utilization_sum, self.steps, 0.0),
            max_backlog: self.max_backlog,
        }
    }
}

/// Compute the metrics of a finished episode in one call.
pub fn compute(trace: &[StepRecord], tasks: &IndexMap<TaskId, Task>) -> MetricsSnapshot {
    let mut accumulator = MetricsAccumulator::new();
    trace.iter().for_each(|record| accumulator.observe_step(record));
    tasks.values().for_each(|task| accumulator.observe_task(task));
    accumulator.finalize()
}

/// Field-wise mean of several snapshots (`max_backlog` rounds down).
///
/// Returns `None` for an empty input.
pub fn average<'a>(
    snapshots: impl IntoIterator<Item = &'a MetricsSnapshot>,
) -> Option<MetricsSnapshot> {
    let mut count = 0u64;
    let mut sum = MetricsSnapshot::default();
    for snapshot in snapshots {
        count += 1;
        sum.routine_sla += snapshot.routine_sla;
        sum.avg_wait_time += snapshot.avg_wait_time;
        sum.avg_backlog += snapshot.avg_backlog;
        sum.avg_utilization += snapshot.avg_utilization;
        sum.max_backlog += snapshot.max_backlog;
    }
    if count == 0 {
        return None;
    }

    let n = count as f64;
    Some(MetricsSnapshot {
        routine_sla: sum.routine_sla / n,
        avg_wait_time: sum.avg_wait_time / n,
        avg_backlog: sum.avg_backlog / n,
        avg_utilization: sum.avg_utilization / n,
        max_backlog: sum.max_backlog / count,
    })
}

fn ratio(numerator: f64, denominator: u64, empty: f64) -> f64 {
    if denominator == 0 {
        empty
    } else {
        numerator / denominator as f64
    }
}
