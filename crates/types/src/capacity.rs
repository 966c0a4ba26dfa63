//! Per-step capacity timeline.

use crate::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from step to slot count.
///
/// A value holds from the step it was announced at until the next change.
/// Steps beyond the last announcement inherit the last announced value, so
/// future capacity is always the currently known one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityTimeline {
    changes: BTreeMap<Step, u32>,
}

impl CapacityTimeline {
    /// Create a timeline with the initial capacity in effect from step 0.
    pub fn new(initial: u32) -> Self {
        let mut changes = BTreeMap::new();
        changes.insert(Step::ZERO, initial);
        Self { changes }
    }

    /// Announce a capacity effective from `from` onward.
    pub fn set(&mut self, from: Step, capacity: u32) {
        self.changes.insert(from, capacity);
    }

    /// Capacity in effect at `step`.
    pub fn at(&self, step: Step) -> u32 {
        self.changes
            .range(..=step)
            .next_back()
            .map(|(_, &capacity)| capacity)
            .unwrap_or(0)
    }

    /// The most recently announced capacity.
    pub fn latest(&self) -> u32 {
        self.changes
            .values()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    /// All announced changes in step order.
    pub fn changes(&self) -> impl Iterator<Item = (Step, u32)> + '_ {
        self.changes.iter().map(|(&step, &capacity)| (step, capacity))
    }
}
