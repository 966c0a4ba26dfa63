//! Scenario configuration consumed by the simulation engine.

use crate::{Event, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Malformed or inconsistent scenario data.
///
/// Raised at load time, before any episode runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioConfigError {
    #[error("Horizon must be positive")]
    ZeroHorizon,

    #[error("Initial capacity must be positive")]
    ZeroCapacity,

    #[error("Event scheduled at step {step} but horizon is {horizon}")]
    EventBeyondHorizon { step: Step, horizon: u64 },

    #[error("Task {task_id} has deadline {deadline} before its arrival at step {arrival}")]
    DeadlineBeforeArrival {
        task_id: String,
        arrival: Step,
        deadline: Step,
    },

    #[error("Task {task_id} deadline {deadline} exceeds horizon {horizon}")]
    DeadlineBeyondHorizon {
        task_id: String,
        deadline: Step,
        horizon: u64,
    },

    #[error("Empty task id in event at step {step}")]
    EmptyTaskId { step: Step },
}

/// Full description of one episode: horizon, initial capacity and the
/// event schedule keyed by step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub horizon: u64,
    pub capacity_per_step: u32,
    #[serde(default)]
    pub events: BTreeMap<Step, Vec<Event>>,
}

impl ScenarioConfig {
    /// Create a scenario with no events.
    pub fn new(horizon: u64, capacity_per_step: u32) -> Self {
        Self {
            horizon,
            capacity_per_step,
            events: BTreeMap::new(),
        }
    }

    /// Append an event at the given step.
    pub fn with_event(mut self, step: u64, event: Event) -> Self {
        self.push_event(Step(step), event);
        self
    }

    /// Append an event at the given step.
    pub fn push_event(&mut self, step: Step, event: Event) {
        self.events.entry(step).or_default().push(event);
    }

    /// Events of `step` in application order (arrivals, cancellations,
    /// capacity changes), preserving listing order within each phase.
    pub fn events_at(&self, step: Step) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .events
            .get(&step)
            .map(|events| events.iter().collect())
            .unwrap_or_default();
        events.sort_by_key(|event| event.phase());
        events
    }

    /// Total number of arrival events, duplicates included.
    pub fn arrival_count(&self) -> usize {
        self.events
            .values()
            .flatten()
            .filter(|event| matches!(event, Event::Arrival { .. }))
            .count()
    }

    /// Check the scenario for structural consistency.
    ///
    /// Duplicate task ids are deliberately allowed: the engine treats a
    /// repeated arrival as an idempotent no-op.
    pub fn validate(&self) -> Result<(), ScenarioConfigError> {
        if self.horizon == 0 {
            return Err(ScenarioConfigError::ZeroHorizon);
        }
        if self.capacity_per_step == 0 {
            return Err(ScenarioConfigError::ZeroCapacity);
        }

        for (&step, events) in &self.events {
            if step.0 >= self.horizon {
                return Err(ScenarioConfigError::EventBeyondHorizon {
                    step,
                    horizon: self.horizon,
                });
            }

            for event in events {
                match event {
                    Event::Arrival { id, deadline, .. } => {
                        if id.as_str().is_empty() {
                            return Err(ScenarioConfigError::EmptyTaskId { step });
                        }
                        if *deadline < step {
                            return Err(ScenarioConfigError::DeadlineBeforeArrival {
                                task_id: id.to_string(),
                                arrival: step,
                                deadline: *deadline,
                            });
                        }
                        if deadline.0 >= self.horizon {
                            return Err(ScenarioConfigError::DeadlineBeyondHorizon {
                                task_id: id.to_string(),
                                deadline: *deadline,
                                horizon: self.horizon,
                            });
                        }
                    }
                    Event::Cancel { task_id } => {
                        if task_id.as_str().is_empty() {
                            return Err(ScenarioConfigError::EmptyTaskId { step });
                        }
                    }
                    Event::CapacityChange { .. } => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Priority;

    #[test]
    fn test_events_applied_in_phase_order() {
        let config = ScenarioConfig::new(10, 2)
            .with_event(1, Event::capacity_change(4))
            .with_event(1, Event::cancel("a"))
            .with_event(1, Event::arrival("b", Priority::Routine, 5))
            .with_event(1, Event::arrival("c", Priority::Urgent, 5));

        let phases: Vec<u8> = config.events_at(Step(1)).iter().map(|e| e.phase()).collect();
        assert_eq!(phases, vec![0, 0, 1, 2]);

        // Listing order is kept inside a phase.
        match config.events_at(Step(1))[1] {
            Event::Arrival { id, .. } => assert_eq!(id.as_str(), "c"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(config.events_at(Step(2)).is_empty());
    }

    #[test]
    fn test_validate_rejects_inconsistent_data() {
        assert_eq!(
            ScenarioConfig::new(0, 1).validate(),
            Err(ScenarioConfigError::ZeroHorizon)
        );
        assert_eq!(
            ScenarioConfig::new(5, 0).validate(),
            Err(ScenarioConfigError::ZeroCapacity)
        );
        assert!(matches!(
            ScenarioConfig::new(5, 1)
                .with_event(5, Event::capacity_change(2))
                .validate(),
            Err(ScenarioConfigError::EventBeyondHorizon { .. })
        ));
        assert!(matches!(
            ScenarioConfig::new(10, 1)
                .with_event(4, Event::arrival("x", Priority::Urgent, 3))
                .validate(),
            Err(ScenarioConfigError::DeadlineBeforeArrival { .. })
        ));
        assert!(matches!(
            ScenarioConfig::new(10, 1)
                .with_event(4, Event::arrival("x", Priority::Urgent, 10))
                .validate(),
            Err(ScenarioConfigError::DeadlineBeyondHorizon { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_valid() {
        let config = ScenarioConfig::new(10, 1)
            .with_event(0, Event::arrival("r1", Priority::Routine, 8))
            .with_event(3, Event::arrival("r1", Priority::Routine, 9));
        assert!(config.validate().is_ok());
        assert_eq!(config.arrival_count(), 2);
    }

    #[test]
    fn test_json_round_trip_keeps_step_keys() {
        let config = ScenarioConfig::new(6, 2).with_event(3, Event::cancel("a"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"3\""));
        let back: ScenarioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
