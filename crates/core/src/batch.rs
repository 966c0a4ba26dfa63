//! Structured action batch returned by agents.

use qbench_types::{Action, Step, TaskId};
use serde::{Deserialize, Serialize};

/// A task placed at a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub task_id: TaskId,
    pub step: Step,
}

/// A bare task reference: either `"t1"` or `{"task_id": "t1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Id(TaskId),
    Object { task_id: TaskId },
}

impl TaskRef {
    pub fn into_id(self) -> TaskId {
        match self {
            TaskRef::Id(id) | TaskRef::Object { task_id: id } => id,
        }
    }
}

/// Keyed action batch:
/// `{"schedule": [...], "reschedule": [...], "reject": [...], "cancel": [...]}`.
///
/// Flattened into submission order: all schedules, then reschedules, then
/// rejects, then cancels, each in listed order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionBatch {
    #[serde(default)]
    pub schedule: Vec<Placement>,
    #[serde(default)]
    pub reschedule: Vec<Placement>,
    #[serde(default)]
    pub reject: Vec<TaskRef>,
    #[serde(default)]
    pub cancel: Vec<TaskRef>,
}

impl ActionBatch {
    /// Keys recognised as a keyed batch.
    pub const KEYS: [&'static str; 4] = ["schedule", "reschedule", "reject", "cancel"];

    /// Flatten into an ordered action list.
    pub fn into_actions(self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(
            self.schedule.len() + self.reschedule.len() + self.reject.len() + self.cancel.len(),
        );
        actions.extend(
            self.schedule
                .into_iter()
                .map(|p| Action::Schedule {
                    task_id: p.task_id,
                    step: p.step,
                }),
        );
        actions.extend(
            self.reschedule
                .into_iter()
                .map(|p| Action::Reschedule {
                    task_id: p.task_id,
                    step: p.step,
                }),
        );
        actions.extend(self.reject.into_iter().map(|r| Action::Reject {
            task_id: r.into_id(),
        }));
        actions.extend(self.cancel.into_iter().map(|r| Action::Cancel {
            task_id: r.into_id(),
        }));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_batch_flattens_in_key_order() {
        let batch: ActionBatch = serde_json::from_str(
            r#"{
                "cancel": ["c1"],
                "reject": [{"task_id": "r1"}, "r2"],
                "schedule": [{"task_id": "a", "step": 3}, {"task_id": "b", "step": 4}]
            }"#,
        )
        .unwrap();

        assert_eq!(
            batch.into_actions(),
            vec![
                Action::schedule("a", 3),
                Action::schedule("b", 4),
                Action::reject("r1"),
                Action::reject("r2"),
                Action::cancel("c1"),
            ]
        );
    }

    #[test]
    fn test_unknown_keys_are_refused() {
        let result: Result<ActionBatch, _> = serde_json::from_str(r#"{"assign": []}"#);
        assert!(result.is_err());
    }
}
