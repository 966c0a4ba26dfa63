//! Agent actions.

use crate::{Step, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single decision submitted by the agent for the current step.
///
/// Serialized as a tagged object, e.g.
/// `{"type": "schedule", "task_id": "t1", "step": 5}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Assign a pending task to a future step.
    Schedule { task_id: TaskId, step: Step },
    /// Move a scheduled task to another future step.
    Reschedule { task_id: TaskId, step: Step },
    /// Refuse a pending routine task.
    Reject { task_id: TaskId },
    /// Withdraw a scheduled task.
    Cancel { task_id: TaskId },
    /// Do nothing.
    Noop,
}

/// Discriminant of [`Action`], used for logs and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Schedule,
    Reschedule,
    Reject,
    Cancel,
    Noop,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Schedule => "schedule",
            ActionKind::Reschedule => "reschedule",
            ActionKind::Reject => "reject",
            ActionKind::Cancel => "cancel",
            ActionKind::Noop => "noop",
        }
    }
}

impl Action {
    /// Shorthand for a schedule action.
    pub fn schedule(task_id: impl Into<TaskId>, step: u64) -> Self {
        Action::Schedule {
            task_id: task_id.into(),
            step: Step(step),
        }
    }

    /// Shorthand for a reschedule action.
    pub fn reschedule(task_id: impl Into<TaskId>, step: u64) -> Self {
        Action::Reschedule {
            task_id: task_id.into(),
            step: Step(step),
        }
    }

    /// Shorthand for a reject action.
    pub fn reject(task_id: impl Into<TaskId>) -> Self {
        Action::Reject {
            task_id: task_id.into(),
        }
    }

    /// Shorthand for a cancel action.
    pub fn cancel(task_id: impl Into<TaskId>) -> Self {
        Action::Cancel {
            task_id: task_id.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Schedule { .. } => ActionKind::Schedule,
            Action::Reschedule { .. } => ActionKind::Reschedule,
            Action::Reject { .. } => ActionKind::Reject,
            Action::Cancel { .. } => ActionKind::Cancel,
            Action::Noop => ActionKind::Noop,
        }
    }

    /// The task this action targets (None for noop).
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Action::Schedule { task_id, .. }
            | Action::Reschedule { task_id, .. }
            | Action::Reject { task_id }
            | Action::Cancel { task_id } => Some(task_id),
            Action::Noop => None,
        }
    }

    /// The target step for schedule/reschedule actions.
    pub fn target_step(&self) -> Option<Step> {
        match self {
            Action::Schedule { step, .. } | Action::Reschedule { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Schedule { task_id, step } => write!(f, "schedule {} at step {}", task_id, step),
            Action::Reschedule { task_id, step } => {
                write!(f, "reschedule {} to step {}", task_id, step)
            }
            Action::Reject { task_id } => write!(f, "reject {}", task_id),
            Action::Cancel { task_id } => write!(f, "cancel {}", task_id),
            Action::Noop => f.write_str("noop"),
        }
    }
}
