//! Task entity and its lifecycle enumerations.

use crate::{Step, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Must complete by its deadline; can never be rejected by the agent.
    Urgent,
    /// Soft deadline, counted in the routine SLA metric.
    Routine,
}

impl Priority {
    /// Whether this is the urgent priority.
    pub fn is_urgent(self) -> bool {
        matches!(self, Priority::Urgent)
    }

    /// Lowercase name used in logs and text observations.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::Routine => "routine",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status.
///
/// ```text
/// pending ──► scheduled ──► completed
///    │            │
///    ├──► rejected├──► cancelled
///    ├──► cancelled
///    └──► missed ◄┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Completed,
    Rejected,
    Cancelled,
    Missed,
}

impl TaskStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Rejected
                | TaskStatus::Cancelled
                | TaskStatus::Missed
        )
    }

    /// Lowercase name used in logs and violation details.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Completed => "completed",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Missed => "missed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of work in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub arrival_time: Step,
    pub priority: Priority,
    /// Latest step at which the task may complete.
    pub deadline: Step,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_step: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_step: Option<Step>,
}

impl Task {
    /// Create a freshly arrived, pending task.
    pub fn new(id: TaskId, arrival_time: Step, priority: Priority, deadline: Step) -> Self {
        Self {
            id,
            arrival_time,
            priority,
            deadline,
            status: TaskStatus::Pending,
            scheduled_step: None,
            completion_step: None,
        }
    }

    /// Whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Steps waited between arrival and completion, if completed.
    pub fn wait_time(&self) -> Option<u64> {
        self.completion_step
            .map(|completed| completed.since(self.arrival_time))
    }

    /// Whether the task completed on or before its deadline.
    pub fn completed_on_time(&self) -> bool {
        self.status == TaskStatus::Completed
            && self
                .completion_step
                .is_some_and(|completed| completed <= self.deadline)
    }

    /// Steps left until the deadline, as seen from `now`.
    pub fn slack(&self, now: Step) -> u64 {
        self.deadline.since(now)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task({}, {}, deadline={}, status={})",
            self.id, self.priority, self.deadline, self.status
        )
    }
}
