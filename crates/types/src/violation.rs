//! Violation log entries.

use crate::{Step, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the validator refused an agent action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Target step is not strictly after the current time.
    TargetInPast,
    /// Target step is at or beyond the horizon.
    BeyondHorizon,
    /// No task with this id exists.
    UnknownTask,
    /// The task already reached a terminal status.
    TaskTerminal,
    /// Reschedule/cancel of a task that is not scheduled.
    NotScheduled,
    /// Schedule/reject of a task that is not pending.
    NotPending,
    /// The target step has no free slot.
    CapacityExceeded,
    /// Urgent tasks can never be rejected.
    UrgentReject,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::TargetInPast => "target_in_past",
            RejectReason::BeyondHorizon => "beyond_horizon",
            RejectReason::UnknownTask => "unknown_task",
            RejectReason::TaskTerminal => "task_terminal",
            RejectReason::NotScheduled => "not_scheduled",
            RejectReason::NotPending => "not_pending",
            RejectReason::CapacityExceeded => "capacity_exceeded",
            RejectReason::UrgentReject => "urgent_reject",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a recorded violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// An urgent task reached its deadline without completing.
    DeadlineMiss,
    /// More tasks occupied a step than its capacity allowed.
    CapacityOverrun,
    /// Engine state contradicted an invariant the validator guarantees.
    InvariantBreach,
    /// The episode ran out of wall-clock budget.
    Timeout,
    /// The episode could not run or aborted on an internal anomaly.
    InternalError,
    /// The validator refused an agent action.
    InvalidAction { reason: RejectReason },
    /// An arrival reused an existing task id and was discarded.
    DuplicateIdConflict,
    /// A scripted cancel targeted an unknown or terminal task.
    StaleCancel,
    /// The agent failed to answer or answered with something unparsable.
    AgentError,
}

impl ViolationKind {
    /// Fatal kinds force a `fail` verdict.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ViolationKind::DeadlineMiss
                | ViolationKind::CapacityOverrun
                | ViolationKind::InvariantBreach
                | ViolationKind::Timeout
                | ViolationKind::InternalError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::DeadlineMiss => "deadline_miss",
            ViolationKind::CapacityOverrun => "capacity_overrun",
            ViolationKind::InvariantBreach => "invariant_breach",
            ViolationKind::Timeout => "timeout",
            ViolationKind::InternalError => "internal_error",
            ViolationKind::InvalidAction { .. } => "invalid_action",
            ViolationKind::DuplicateIdConflict => "duplicate_id_conflict",
            ViolationKind::StaleCancel => "stale_cancel",
            ViolationKind::AgentError => "agent_error",
        }
    }
}

/// A single entry of the episode's violation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub detail: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, step: Step, detail: impl Into<String>) -> Self {
        Self {
            kind,
            step,
            task_id: None,
            detail: detail.into(),
        }
    }

    /// Attach the task this violation concerns.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn invalid_action(step: Step, reason: RejectReason, detail: impl Into<String>) -> Self {
        Self::new(ViolationKind::InvalidAction { reason }, step, detail)
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[t={}] {}", self.step, self.kind.as_str())?;
        if let ViolationKind::InvalidAction { reason } = self.kind {
            write!(f, "({})", reason)?;
        }
        if let Some(task_id) = &self.task_id {
            write!(f, " task={}", task_id)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}
