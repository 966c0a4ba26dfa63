//! Mutable episode state owned by the engine.

use indexmap::{IndexMap, IndexSet};
use qbench_core::StateView;
use qbench_types::{CapacityTimeline, Priority, ScheduledTask, Step, Task, TaskId, TaskStatus};
use std::collections::BTreeMap;

/// Queue state of one episode.
///
/// The task table keeps insertion order so observations list tasks in
/// arrival order. Slot occupancy is stored per step and always mirrors the
/// `scheduled_step` of scheduled tasks.
#[derive(Debug, Clone)]
pub struct EpisodeState {
    time: Step,
    horizon: u64,
    capacity: CapacityTimeline,
    tasks: IndexMap<TaskId, Task>,
    slots: BTreeMap<Step, IndexSet<TaskId>>,
}

impl EpisodeState {
    pub fn new(horizon: u64, initial_capacity: u32) -> Self {
        Self {
            time: Step::ZERO,
            horizon,
            capacity: CapacityTimeline::new(initial_capacity),
            tasks: IndexMap::new(),
            slots: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn time(&self) -> Step {
        self.time
    }

    pub fn tasks(&self) -> &IndexMap<TaskId, Task> {
        &self.tasks
    }

    pub fn capacity(&self) -> &CapacityTimeline {
        &self.capacity
    }

    /// Capacity in effect at the current step.
    pub fn current_capacity(&self) -> u32 {
        self.capacity.at(self.time)
    }

    /// Pending tasks in arrival order.
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
    }

    /// Scheduled tasks in arrival order, paired with their slot.
    pub fn scheduled(&self) -> impl Iterator<Item = ScheduledTask> + '_ {
        self.tasks.values().filter_map(|task| match task.status {
            TaskStatus::Scheduled => task.scheduled_step.map(|step| ScheduledTask {
                task: task.clone(),
                step,
            }),
            _ => None,
        })
    }

    pub fn count(&self, status: TaskStatus) -> u64 {
        self.tasks
            .values()
            .filter(|task| task.status == status)
            .count() as u64
    }

    /// Whether occupancy at `step` agrees with the task table and fits the
    /// capacity known for it.
    pub fn slot_consistent(&self, step: Step) -> bool {
        let holders = self.slots.get(&step);
        let held = holders.map_or(0, IndexSet::len);
        let mirrored = holders.map_or(true, |ids| {
            ids.iter().all(|id| {
                self.tasks.get(id).is_some_and(|task| {
                    task.status == TaskStatus::Scheduled && task.scheduled_step == Some(step)
                })
            })
        });
        mirrored && held <= self.capacity.at(step) as usize
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutation (engine only)
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a freshly arrived task. Returns `false` if the id is taken.
    pub(crate) fn insert_task(&mut self, id: TaskId, priority: Priority, deadline: Step) -> bool {
        if self.tasks.contains_key(&id) {
            return false;
        }
        let task = Task::new(id.clone(), self.time, priority, deadline);
        self.tasks.insert(id, task);
        true
    }

    pub(crate) fn set_capacity(&mut self, capacity: u32) {
        self.capacity.set(self.time, capacity);
    }

    /// Put a pending task into `step`.
    pub(crate) fn assign(&mut self, id: &TaskId, step: Step) -> Option<Step> {
        let task = self.tasks.get_mut(id)?;
        task.status = TaskStatus::Scheduled;
        task.scheduled_step = Some(step);
        self.slots.entry(step).or_default().insert(id.clone());
        Some(step)
    }

    /// Move a scheduled task to `step`. Returns the slot it left.
    pub(crate) fn reassign(&mut self, id: &TaskId, step: Step) -> Option<Step> {
        let previous = self.release(id)?;
        self.assign(id, step);
        Some(previous)
    }

    /// Move a non-terminal task into a terminal status, freeing its slot.
    pub(crate) fn finish(&mut self, id: &TaskId, status: TaskStatus) -> Option<Step> {
        let freed = self.release(id);
        if let Some(task) = self.tasks.get_mut(id) {
            task.status = status;
            task.scheduled_step = match status {
                TaskStatus::Completed => task.scheduled_step,
                _ => None,
            };
        }
        freed
    }

    /// Mark every non-terminal task whose deadline is at or before the
    /// current step as missed. Returns the missed tasks' ids and priorities.
    pub(crate) fn expire_overdue(&mut self) -> Vec<(TaskId, Priority)> {
        let now = self.time;
        let overdue: Vec<(TaskId, Priority)> = self
            .tasks
            .values()
            .filter(|task| !task.is_terminal() && task.deadline <= now)
            .map(|task| (task.id.clone(), task.priority))
            .collect();

        for (id, _) in &overdue {
            self.finish(id, TaskStatus::Missed);
        }
        overdue
    }

    /// Move to the next step.
    pub(crate) fn advance(&mut self) -> Step {
        self.time = self.time.next();
        self.time
    }

    /// Complete every task holding a slot at the current step.
    pub(crate) fn complete_current(&mut self) -> Vec<TaskId> {
        let now = self.time;
        let Some(holders) = self.slots.remove(&now) else {
            return Vec::new();
        };

        let mut completed = Vec::with_capacity(holders.len());
        for id in holders {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.status = TaskStatus::Completed;
                task.completion_step = Some(now);
                completed.push(id);
            }
        }
        completed
    }

    pub(crate) fn into_tasks(self) -> IndexMap<TaskId, Task> {
        self.tasks
    }

    fn release(&mut self, id: &TaskId) -> Option<Step> {
        let step = self.tasks.get(id)?.scheduled_step?;
        if let Some(holders) = self.slots.get_mut(&step) {
            holders.shift_remove(id);
            if holders.is_empty() {
                self.slots.remove(&step);
            }
        }
        if let Some(task) = self.tasks.get_mut(id) {
            task.scheduled_step = None;
        }
        Some(step)
    }
}

impl StateView for EpisodeState {
    fn now(&self) -> Step {
        self.time
    }

    fn horizon(&self) -> u64 {
        self.horizon
    }

    fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    fn occupancy(&self, step: Step) -> usize {
        self.slots.get(&step).map_or(0, IndexSet::len)
    }

    fn capacity_at(&self, step: Step) -> u32 {
        self.capacity.at(step)
    }
}
