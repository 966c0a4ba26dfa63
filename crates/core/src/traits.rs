//! Core traits for reading episode state.

use qbench_types::{Step, Task, TaskId};

/// Read-only view of a running episode.
///
/// The engine implements this over its own state; the validator and any
/// diagnostic tooling only ever see the episode through it. Implementations
/// must be:
///
/// - **Side-effect free**: no method mutates the episode
/// - **Consistent**: `occupancy(s)` equals the number of tasks whose
///   status is scheduled with `scheduled_step == s`
///
/// # Example
///
/// ```ignore
/// fn has_room(view: &impl StateView, step: Step) -> bool {
///     (view.occupancy(step) as u32) < view.capacity_at(step)
/// }
/// ```
pub trait StateView {
    /// The step currently being decided.
    fn now(&self) -> Step;

    /// Total number of steps in the episode.
    fn horizon(&self) -> u64;

    /// Look up a task by id.
    fn task(&self, id: &TaskId) -> Option<&Task>;

    /// Number of tasks currently holding a slot at `step`.
    fn occupancy(&self, step: Step) -> usize;

    /// Capacity in effect at `step`, as currently known.
    fn capacity_at(&self, step: Step) -> u32;

    /// Free slots left at `step`.
    fn free_slots(&self, step: Step) -> usize {
        (self.capacity_at(step) as usize).saturating_sub(self.occupancy(step))
    }
}
