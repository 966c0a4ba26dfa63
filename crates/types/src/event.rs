//! Scripted scenario events.

use crate::{Priority, Step, TaskId};
use serde::{Deserialize, Serialize};

/// An event attached to a scenario time step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new task enters the queue. Its arrival time is the event's step.
    Arrival {
        id: TaskId,
        priority: Priority,
        deadline: Step,
    },
    /// External cancellation of a task by id.
    Cancel { task_id: TaskId },
    /// Capacity change effective from the event's step onward.
    CapacityChange { new_capacity: u32 },
}

impl Event {
    /// Application order within one step: arrivals, then cancellations,
    /// then capacity changes.
    pub fn phase(&self) -> u8 {
        match self {
            Event::Arrival { .. } => 0,
            Event::Cancel { .. } => 1,
            Event::CapacityChange { .. } => 2,
        }
    }

    /// Shorthand for an arrival event.
    pub fn arrival(id: impl Into<TaskId>, priority: Priority, deadline: u64) -> Self {
        Event::Arrival {
            id: id.into(),
            priority,
            deadline: Step(deadline),
        }
    }

    /// Shorthand for a cancel event.
    pub fn cancel(task_id: impl Into<TaskId>) -> Self {
        Event::Cancel {
            task_id: task_id.into(),
        }
    }

    /// Shorthand for a capacity change event.
    pub fn capacity_change(new_capacity: u32) -> Self {
        Event::CapacityChange { new_capacity }
    }
}
