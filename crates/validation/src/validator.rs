//! Action legality rules.

use qbench_core::StateView;
use qbench_types::{Action, RejectReason, Step, TaskStatus};

/// Decides whether an agent action may be applied to the current state.
///
/// Pure: the validator only reads through [`StateView`] and never mutates.
/// A rejection is non-fatal to the episode; the engine skips the action and
/// records the reason.
///
/// Checks run in this order:
///
/// 1. `noop` is always accepted
/// 2. the task must exist and must not be terminal
/// 3. the task must be in the status the action requires
/// 4. the target step must lie in `(now, horizon)`
/// 5. the target step must have a free slot
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionValidator;

impl ActionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one action against the current state.
    pub fn validate(&self, view: &impl StateView, action: &Action) -> Result<(), RejectReason> {
        let task_id = match action.task_id() {
            Some(task_id) => task_id,
            None => return Ok(()),
        };

        let task = view.task(task_id).ok_or(RejectReason::UnknownTask)?;
        if task.is_terminal() {
            return Err(RejectReason::TaskTerminal);
        }

        match action {
            Action::Schedule { step, .. } => {
                if task.status != TaskStatus::Pending {
                    return Err(RejectReason::NotPending);
                }
                check_target(view, *step)?;
                check_capacity(view, *step)
            }
            Action::Reschedule { step, .. } => {
                if task.status != TaskStatus::Scheduled {
                    return Err(RejectReason::NotScheduled);
                }
                check_target(view, *step)?;
                if task.scheduled_step == Some(*step) {
                    // Already there; the move is a no-op.
                    return Ok(());
                }
                check_capacity(view, *step)
            }
            Action::Reject { .. } => {
                if task.priority.is_urgent() {
                    return Err(RejectReason::UrgentReject);
                }
                if task.status != TaskStatus::Pending {
                    return Err(RejectReason::NotPending);
                }
                Ok(())
            }
            Action::Cancel { .. } => {
                if task.status != TaskStatus::Scheduled {
                    return Err(RejectReason::NotScheduled);
                }
                Ok(())
            }
            Action::Noop => Ok(()),
        }
    }
}

fn check_target(view: &impl StateView, step: Step) -> Result<(), RejectReason> {
    if step <= view.now() {
        return Err(RejectReason::TargetInPast);
    }
    if step.0 >= view.horizon() {
        return Err(RejectReason::BeyondHorizon);
    }
    Ok(())
}

fn check_capacity(view: &impl StateView, step: Step) -> Result<(), RejectReason> {
    if view.free_slots(step) == 0 {
        return Err(RejectReason::CapacityExceeded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::{Priority, Task, TaskId};
    use std::collections::HashMap;

    /// Minimal in-memory view for exercising the rules in isolation.
    struct FakeView {
        now: Step,
        horizon: u64,
        capacity: u32,
        tasks: HashMap<TaskId, Task>,
    }

    impl FakeView {
        fn new(now: u64, horizon: u64, capacity: u32) -> Self {
            Self {
                now: Step(now),
                horizon,
                capacity,
                tasks: HashMap::new(),
            }
        }

        fn with_task(
            mut self,
            id: &str,
            priority: Priority,
            status: TaskStatus,
            slot: Option<u64>,
        ) -> Self {
            let mut task = Task::new(TaskId::new(id), Step(0), priority, Step(self.horizon - 1));
            task.status = status;
            task.scheduled_step = slot.map(Step);
            self.tasks.insert(task.id.clone(), task);
            self
        }
    }

    impl StateView for FakeView {
        fn now(&self) -> Step {
            self.now
        }

        fn horizon(&self) -> u64 {
            self.horizon
        }

        fn task(&self, id: &TaskId) -> Option<&Task> {
            self.tasks.get(id)
        }

        fn occupancy(&self, step: Step) -> usize {
            self.tasks
                .values()
                .filter(|t| t.status == TaskStatus::Scheduled && t.scheduled_step == Some(step))
                .count()
        }

        fn capacity_at(&self, _step: Step) -> u32 {
            self.capacity
        }
    }

    #[test]
    fn test_noop_always_accepted() {
        let view = FakeView::new(3, 10, 0);
        assert_eq!(ActionValidator::new().validate(&view, &Action::Noop), Ok(()));
    }

    #[test]
    fn test_unknown_and_terminal_tasks() {
        let view = FakeView::new(0, 10, 2).with_task(
            "done",
            Priority::Routine,
            TaskStatus::Completed,
            None,
        );
        let validator = ActionValidator::new();
        assert_eq!(
            validator.validate(&view, &Action::schedule("ghost", 2)),
            Err(RejectReason::UnknownTask)
        );
        assert_eq!(
            validator.validate(&view, &Action::schedule("done", 2)),
            Err(RejectReason::TaskTerminal)
        );
    }

    #[test]
    fn test_target_range() {
        let view =
            FakeView::new(4, 10, 2).with_task("a", Priority::Routine, TaskStatus::Pending, None);
        let validator = ActionValidator::new();
        assert_eq!(
            validator.validate(&view, &Action::schedule("a", 4)),
            Err(RejectReason::TargetInPast)
        );
        assert_eq!(
            validator.validate(&view, &Action::schedule("a", 2)),
            Err(RejectReason::TargetInPast)
        );
        assert_eq!(
            validator.validate(&view, &Action::schedule("a", 10)),
            Err(RejectReason::BeyondHorizon)
        );
        assert_eq!(validator.validate(&view, &Action::schedule("a", 5)), Ok(()));
        assert_eq!(validator.validate(&view, &Action::schedule("a", 9)), Ok(()));
    }

    #[test]
    fn test_status_requirements() {
        let view = FakeView::new(0, 10, 2)
            .with_task("p", Priority::Routine, TaskStatus::Pending, None)
            .with_task("s", Priority::Routine, TaskStatus::Scheduled, Some(3));
        let validator = ActionValidator::new();

        assert_eq!(
            validator.validate(&view, &Action::schedule("s", 5)),
            Err(RejectReason::NotPending)
        );
        assert_eq!(
            validator.validate(&view, &Action::reschedule("p", 5)),
            Err(RejectReason::NotScheduled)
        );
        assert_eq!(
            validator.validate(&view, &Action::cancel("p")),
            Err(RejectReason::NotScheduled)
        );
        assert_eq!(
            validator.validate(&view, &Action::reject("s")),
            Err(RejectReason::NotPending)
        );
        assert_eq!(validator.validate(&view, &Action::reschedule("s", 5)), Ok(()));
        assert_eq!(validator.validate(&view, &Action::cancel("s")), Ok(()));
        assert_eq!(validator.validate(&view, &Action::reject("p")), Ok(()));
    }

    #[test]
    fn test_capacity_admission() {
        let view = FakeView::new(0, 10, 1)
            .with_task("a", Priority::Routine, TaskStatus::Scheduled, Some(5))
            .with_task("b", Priority::Routine, TaskStatus::Pending, None);
        let validator = ActionValidator::new();

        assert_eq!(
            validator.validate(&view, &Action::schedule("b", 5)),
            Err(RejectReason::CapacityExceeded)
        );
        assert_eq!(validator.validate(&view, &Action::schedule("b", 6)), Ok(()));
        // A task may always "move" onto its own slot.
        assert_eq!(validator.validate(&view, &Action::reschedule("a", 5)), Ok(()));
    }

    #[test]
    fn test_urgent_reject_always_refused() {
        let validator = ActionValidator::new();
        for status in [TaskStatus::Pending, TaskStatus::Scheduled] {
            let view = FakeView::new(0, 10, 2).with_task("u", Priority::Urgent, status, Some(2));
            assert_eq!(
                validator.validate(&view, &Action::reject("u")),
                Err(RejectReason::UrgentReject)
            );
        }
    }
}
