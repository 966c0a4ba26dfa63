//! The queue simulation engine.

use crate::{EnvironmentConfig, EnvironmentError, EpisodeState};
use indexmap::IndexMap;
use qbench_core::StateView;
use qbench_types::{
    Action, Event, Observation, ScenarioConfig, Step, StepRecord, Task, TaskId, TaskStatus,
    Violation, ViolationKind,
};
use qbench_validation::ActionValidator;
use tracing::{debug, info};

/// Result of one [`QueueEnvironment::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Observation of the new current step.
    pub observation: Observation,
    /// How many of the submitted actions were applied.
    pub accepted: usize,
    pub done: bool,
}

/// Everything a finished (or abandoned) episode leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    pub horizon: u64,
    /// Number of `step` calls that completed.
    pub steps: u64,
    pub tasks: IndexMap<TaskId, Task>,
    pub violations: Vec<Violation>,
    pub trace: Vec<StepRecord>,
}

/// Live episode owned by the engine between `reset` and `take_outcome`.
#[derive(Debug)]
struct Episode {
    scenario: ScenarioConfig,
    state: EpisodeState,
    violations: Vec<Violation>,
    trace: Vec<StepRecord>,
    steps: u64,
    done: bool,
}

/// Deterministic event-driven queue simulation.
///
/// Given the same scenario and the same action sequence, the engine
/// produces the same observations, violation log and trace every run.
///
/// # Step order
///
/// For the current step `t`:
///
/// 1. Submitted actions are validated in submission order against the live
///    state and applied if accepted; capacity is consumed as they land.
/// 2. Every non-terminal task with deadline `<= t` becomes missed.
/// 3. Time advances to `t + 1` and, if still inside the horizon, the
///    events of `t + 1` are applied (arrivals, cancellations, capacity
///    changes).
/// 4. Tasks holding a slot at `t + 1` complete.
///
/// The trace holds one record per observed step inside the horizon.
#[derive(Debug, Default)]
pub struct QueueEnvironment {
    config: EnvironmentConfig,
    validator: ActionValidator,
    episode: Option<Episode>,
}

impl QueueEnvironment {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            config,
            validator: ActionValidator::new(),
            episode: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Live state of the current episode.
    pub fn state(&self) -> Option<&EpisodeState> {
        self.episode.as_ref().map(|episode| &episode.state)
    }

    pub fn time(&self) -> Step {
        self.state().map_or(Step::ZERO, EpisodeState::time)
    }

    pub fn is_done(&self) -> bool {
        self.episode.as_ref().is_some_and(|episode| episode.done)
    }

    pub fn violations(&self) -> &[Violation] {
        self.episode
            .as_ref()
            .map(|episode| episode.violations.as_slice())
            .unwrap_or_default()
    }

    pub fn trace(&self) -> &[StepRecord] {
        self.episode
            .as_ref()
            .map(|episode| episode.trace.as_slice())
            .unwrap_or_default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Episode lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Start a new episode from `scenario`, applying its step-0 events.
    pub fn reset(&mut self, scenario: ScenarioConfig) -> Result<Observation, EnvironmentError> {
        scenario.validate()?;

        info!(
            horizon = scenario.horizon,
            capacity = scenario.capacity_per_step,
            arrivals = scenario.arrival_count(),
            "Resetting episode"
        );

        let mut episode = Episode {
            state: EpisodeState::new(scenario.horizon, scenario.capacity_per_step),
            scenario,
            violations: Vec::new(),
            trace: Vec::new(),
            steps: 0,
            done: false,
        };

        let mut record = episode.apply_events();
        episode.fill_counts(&mut record);
        let observation = episode.observe(&record, &[]);
        episode.trace.push(record);

        self.episode = Some(episode);
        Ok(observation)
    }

    /// Apply the agent's actions for the current step and advance time by
    /// exactly one step.
    pub fn step(&mut self, actions: &[Action]) -> Result<StepOutcome, EnvironmentError> {
        let validator = self.validator;
        let stop_on_fatal = self.config.stop_on_fatal;
        let episode = self.episode.as_mut().ok_or(EnvironmentError::NotStarted)?;
        if episode.done {
            return Err(EnvironmentError::EpisodeFinished(episode.state.time().0));
        }

        let now = episode.state.time();
        let accepted = episode.apply_actions(&validator, actions);
        let missed = episode.expire_deadlines();

        if let Some(record) = episode.trace.last_mut() {
            record.actions = actions.to_vec();
            record.accepted = accepted as u32;
            record.missed = missed.clone();
        }

        let next = episode.state.advance();
        episode.steps += 1;

        let in_horizon = next.0 < episode.scenario.horizon;
        let mut record = if in_horizon {
            episode.apply_events()
        } else {
            StepRecord {
                time: next,
                capacity: episode.state.current_capacity(),
                ..Default::default()
            }
        };

        episode.complete(&mut record);
        episode.fill_counts(&mut record);
        let observation = episode.observe(&record, &missed);
        if in_horizon {
            episode.trace.push(record);
        }

        let fatal = stop_on_fatal && episode.violations.iter().any(Violation::is_fatal);
        episode.done = !in_horizon || fatal;

        debug!(
            step = now.0,
            accepted,
            rejected = actions.len() - accepted,
            missed = missed.len(),
            "Step complete"
        );
        if episode.done {
            info!(
                steps = episode.steps,
                violations = episode.violations.len(),
                stopped_early = in_horizon,
                "Episode finished"
            );
        }

        Ok(StepOutcome {
            observation,
            accepted,
            done: episode.done,
        })
    }

    /// Take the results of the current episode, finished or not.
    ///
    /// The engine returns to the unstarted state.
    pub fn take_outcome(&mut self) -> Result<EpisodeOutcome, EnvironmentError> {
        let episode = self.episode.take().ok_or(EnvironmentError::NotStarted)?;
        Ok(EpisodeOutcome {
            horizon: episode.scenario.horizon,
            steps: episode.steps,
            violations: episode.violations,
            trace: episode.trace,
            tasks: episode.state.into_tasks(),
        })
    }
}

impl Episode {
    fn record(&mut self, violation: Violation) {
        debug!(violation = %violation, "Violation recorded");
        self.violations.push(violation);
    }

    /// Apply the scripted events of the current step.
    fn apply_events(&mut self) -> StepRecord {
        let now = self.state.time();
        let mut record = StepRecord {
            time: now,
            ..Default::default()
        };

        let events: Vec<Event> = self
            .scenario
            .events_at(now)
            .into_iter()
            .cloned()
            .collect();

        for event in events {
            match event {
                Event::Arrival {
                    id,
                    priority,
                    deadline,
                } => {
                    if self.state.insert_task(id.clone(), priority, deadline) {
                        debug!(
                            step = now.0,
                            task = %id,
                            %priority,
                            deadline = deadline.0,
                            "Task arrived"
                        );
                        record.arrivals.push(id);
                    } else {
                        self.record(
                            Violation::new(
                                ViolationKind::DuplicateIdConflict,
                                now,
                                "arrival discarded, id already in use",
                            )
                            .with_task(id),
                        );
                    }
                }
                Event::Cancel { task_id } => {
                    let live = self
                        .state
                        .task(&task_id)
                        .is_some_and(|task| !task.is_terminal());
                    if live {
                        self.state.finish(&task_id, TaskStatus::Cancelled);
                        debug!(step = now.0, task = %task_id, "Task cancelled externally");
                        record.cancellations.push(task_id);
                    } else {
                        self.record(
                            Violation::new(
                                ViolationKind::StaleCancel,
                                now,
                                "cancel of unknown or finished task",
                            )
                            .with_task(task_id),
                        );
                    }
                }
                Event::CapacityChange { new_capacity } => {
                    debug!(step = now.0, capacity = new_capacity, "Capacity changed");
                    self.state.set_capacity(new_capacity);
                }
            }
        }

        record.capacity = self.state.current_capacity();
        record
    }

    /// Validate and apply actions in order. Returns how many were applied.
    fn apply_actions(&mut self, validator: &ActionValidator, actions: &[Action]) -> usize {
        let now = self.state.time();
        let mut accepted = 0;

        for action in actions {
            if let Err(reason) = validator.validate(&self.state, action) {
                debug!(step = now.0, %action, %reason, "Action rejected");
                let mut violation = Violation::invalid_action(now, reason, action.to_string());
                if let Some(task_id) = action.task_id() {
                    violation = violation.with_task(task_id.clone());
                }
                self.record(violation);
                continue;
            }

            let touched = match action {
                Action::Schedule { task_id, step } => self.state.assign(task_id, *step),
                Action::Reschedule { task_id, step } => {
                    self.state.reassign(task_id, *step).map(|_| *step)
                }
                Action::Reject { task_id } => {
                    self.state.finish(task_id, TaskStatus::Rejected);
                    None
                }
                Action::Cancel { task_id } => {
                    self.state.finish(task_id, TaskStatus::Cancelled);
                    None
                }
                Action::Noop => None,
            };
            accepted += 1;

            if let Some(step) = touched {
                if !self.state.slot_consistent(step) {
                    let mut violation = Violation::new(
                        ViolationKind::InvariantBreach,
                        now,
                        format!("slot {} inconsistent after {}", step, action),
                    );
                    if let Some(task_id) = action.task_id() {
                        violation = violation.with_task(task_id.clone());
                    }
                    self.record(violation);
                }
            }
        }

        accepted
    }

    /// Mark overdue tasks missed; urgent misses are fatal.
    fn expire_deadlines(&mut self) -> Vec<TaskId> {
        let now = self.state.time();
        let overdue = self.state.expire_overdue();

        let mut missed = Vec::with_capacity(overdue.len());
        for (id, priority) in overdue {
            if priority.is_urgent() {
                self.record(
                    Violation::new(
                        ViolationKind::DeadlineMiss,
                        now,
                        "urgent task missed its deadline",
                    )
                    .with_task(id.clone()),
                );
            } else {
                debug!(step = now.0, task = %id, "Routine task missed its deadline");
            }
            missed.push(id);
        }
        missed
    }

    /// Complete the tasks of the current step, checking the slot first.
    fn complete(&mut self, record: &mut StepRecord) {
        let now = self.state.time();
        let held = self.state.occupancy(now);
        let capacity = self.state.capacity_at(now);
        if held > capacity as usize {
            self.record(Violation::new(
                ViolationKind::CapacityOverrun,
                now,
                format!("{} tasks held a step with capacity {}", held, capacity),
            ));
        }

        record.completed = self.state.complete_current();
        record.slots_used = record.completed.len() as u32;
    }

    fn fill_counts(&self, record: &mut StepRecord) {
        record.slots_used = record.completed.len() as u32;
        record.pending = self.state.count(TaskStatus::Pending);
        record.scheduled = self.state.count(TaskStatus::Scheduled);
    }

    fn observe(&self, record: &StepRecord, missed: &[TaskId]) -> Observation {
        let tasks = self.state.tasks();
        Observation {
            time: self.state.time(),
            horizon: self.scenario.horizon,
            capacity_per_step: self.state.current_capacity(),
            arrivals: record
                .arrivals
                .iter()
                .filter_map(|id| tasks.get(id).cloned())
                .collect(),
            cancellations: record.cancellations.clone(),
            pending: self.state.pending().cloned().collect(),
            scheduled: self.state.scheduled().collect(),
            completed_this_step: record.completed.clone(),
            missed_this_step: missed.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::{Priority, RejectReason};
    use tracing_test::traced_test;

    fn start(scenario: ScenarioConfig) -> (QueueEnvironment, Observation) {
        let mut env = QueueEnvironment::new(EnvironmentConfig::default());
        let observation = env.reset(scenario).unwrap();
        (env, observation)
    }

    fn run_empty(env: &mut QueueEnvironment) {
        while !env.is_done() {
            env.step(&[]).unwrap();
        }
    }

    fn kinds(env: &QueueEnvironment) -> Vec<ViolationKind> {
        env.violations().iter().map(|v| v.kind).collect()
    }

    #[traced_test]
    #[test]
    fn test_reset_applies_step_zero_events() {
        let scenario = ScenarioConfig::new(5, 2)
            .with_event(0, Event::arrival("a", Priority::Routine, 3))
            .with_event(1, Event::arrival("b", Priority::Urgent, 4));
        let (env, observation) = start(scenario);

        assert_eq!(observation.time, Step(0));
        assert_eq!(observation.arrivals.len(), 1);
        assert_eq!(observation.pending.len(), 1);
        assert_eq!(observation.pending[0].id, TaskId::new("a"));
        assert_eq!(env.trace().len(), 1);
        assert_eq!(env.trace()[0].pending, 1);
    }

    #[traced_test]
    #[test]
    fn test_unscheduled_urgent_task_is_missed_at_deadline() {
        let scenario =
            ScenarioConfig::new(20, 3).with_event(0, Event::arrival("u1", Priority::Urgent, 12));
        let (mut env, _) = start(scenario);
        run_empty(&mut env);

        let outcome = env.take_outcome().unwrap();
        assert_eq!(outcome.steps, 20);
        assert_eq!(outcome.trace.len(), 20);
        assert_eq!(outcome.violations.len(), 1);
        let violation = &outcome.violations[0];
        assert_eq!(violation.kind, ViolationKind::DeadlineMiss);
        assert_eq!(violation.step, Step(12));
        assert_eq!(violation.task_id, Some(TaskId::new("u1")));
        assert_eq!(outcome.tasks[0].status, TaskStatus::Missed);
        assert_eq!(outcome.trace[12].missed, vec![TaskId::new("u1")]);
    }

    #[traced_test]
    #[test]
    fn test_task_scheduled_after_deadline_is_missed_not_completed() {
        let scenario =
            ScenarioConfig::new(10, 1).with_event(0, Event::arrival("u", Priority::Urgent, 3));
        let (mut env, _) = start(scenario);

        let outcome = env.step(&[Action::schedule("u", 6)]).unwrap();
        assert_eq!(outcome.accepted, 1);
        run_empty(&mut env);

        let outcome = env.take_outcome().unwrap();
        let task = &outcome.tasks[0];
        assert_eq!(task.status, TaskStatus::Missed);
        assert_eq!(task.completion_step, None);

        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].kind, ViolationKind::DeadlineMiss);
        assert_eq!(outcome.violations[0].step, Step(3));
        assert_eq!(outcome.trace[3].missed, vec![TaskId::new("u")]);
        assert_eq!(outcome.trace[6].slots_used, 0);
        assert!(outcome.trace[6].completed.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_duplicate_arrival_keeps_original() {
        let scenario = ScenarioConfig::new(10, 2)
            .with_event(0, Event::arrival("r1", Priority::Routine, 8))
            .with_event(3, Event::arrival("r1", Priority::Urgent, 5));
        let (mut env, _) = start(scenario);
        run_empty(&mut env);

        let outcome = env.take_outcome().unwrap();
        assert_eq!(outcome.tasks.len(), 1);
        let task = &outcome.tasks[0];
        assert_eq!(task.arrival_time, Step(0));
        assert_eq!(task.priority, Priority::Routine);

        let duplicates: Vec<_> = outcome
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::DuplicateIdConflict)
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].step, Step(3));
        assert!(outcome.violations.iter().all(|v| !v.is_fatal()));
    }

    #[traced_test]
    #[test]
    fn test_capacity_is_first_come_first_served() {
        let scenario = ScenarioConfig::new(10, 2)
            .with_event(0, Event::arrival("A", Priority::Routine, 8))
            .with_event(0, Event::arrival("B", Priority::Routine, 8))
            .with_event(0, Event::arrival("C", Priority::Routine, 8));
        let (mut env, _) = start(scenario);

        let outcome = env
            .step(&[
                Action::schedule("A", 5),
                Action::schedule("B", 5),
                Action::schedule("C", 5),
            ])
            .unwrap();

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.observation.scheduled_at(Step(5)), 2);
        assert_eq!(outcome.observation.pending.len(), 1);
        assert_eq!(
            kinds(&env),
            vec![ViolationKind::InvalidAction {
                reason: RejectReason::CapacityExceeded
            }]
        );
        assert_eq!(env.violations()[0].task_id, Some(TaskId::new("C")));
        assert_eq!(env.trace()[0].accepted, 2);
    }

    #[traced_test]
    #[test]
    fn test_scheduled_task_completes_on_entering_its_step() {
        let scenario =
            ScenarioConfig::new(10, 1).with_event(0, Event::arrival("a", Priority::Urgent, 3));
        let (mut env, _) = start(scenario);

        env.step(&[Action::schedule("a", 2)]).unwrap();
        let outcome = env.step(&[]).unwrap();
        assert_eq!(outcome.observation.time, Step(2));
        assert_eq!(outcome.observation.completed_this_step, vec![TaskId::new("a")]);
        assert_eq!(env.trace()[2].slots_used, 1);

        run_empty(&mut env);
        let outcome = env.take_outcome().unwrap();
        let task = &outcome.tasks[0];
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completion_step, Some(Step(2)));
        assert!(outcome.violations.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_capacity_drop_causes_overrun() {
        let scenario = ScenarioConfig::new(10, 2)
            .with_event(0, Event::arrival("a", Priority::Routine, 8))
            .with_event(0, Event::arrival("b", Priority::Routine, 8))
            .with_event(2, Event::capacity_change(1));
        let (mut env, _) = start(scenario);

        env.step(&[Action::schedule("a", 4), Action::schedule("b", 4)])
            .unwrap();
        run_empty(&mut env);

        let overruns: Vec<_> = env
            .violations()
            .iter()
            .filter(|v| v.kind == ViolationKind::CapacityOverrun)
            .collect();
        assert_eq!(overruns.len(), 1);
        assert_eq!(overruns[0].step, Step(4));
        assert_eq!(env.trace()[4].capacity, 1);
        assert_eq!(env.trace()[4].slots_used, 2);
    }

    #[traced_test]
    #[test]
    fn test_future_admission_uses_latest_capacity() {
        let scenario = ScenarioConfig::new(10, 1)
            .with_event(0, Event::arrival("a", Priority::Routine, 8))
            .with_event(0, Event::arrival("b", Priority::Routine, 8))
            .with_event(1, Event::capacity_change(2));
        let (mut env, _) = start(scenario);

        let first = env
            .step(&[Action::schedule("a", 5), Action::schedule("b", 5)])
            .unwrap();
        assert_eq!(first.accepted, 1);

        let second = env.step(&[Action::schedule("b", 5)]).unwrap();
        assert_eq!(second.accepted, 1);
        assert_eq!(second.observation.scheduled_at(Step(5)), 2);
    }

    #[traced_test]
    #[test]
    fn test_external_cancel_frees_slot_and_stale_cancel_is_logged() {
        let scenario = ScenarioConfig::new(10, 1)
            .with_event(0, Event::arrival("a", Priority::Urgent, 8))
            .with_event(0, Event::arrival("b", Priority::Routine, 8))
            .with_event(2, Event::cancel("a"))
            .with_event(3, Event::cancel("a"))
            .with_event(3, Event::cancel("ghost"));
        let (mut env, _) = start(scenario);

        env.step(&[Action::schedule("a", 5)]).unwrap();
        let outcome = env.step(&[]).unwrap();
        assert_eq!(outcome.observation.cancellations, vec![TaskId::new("a")]);
        assert_eq!(outcome.observation.scheduled_at(Step(5)), 0);

        let outcome = env.step(&[Action::schedule("b", 5)]).unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(
            kinds(&env),
            vec![ViolationKind::StaleCancel, ViolationKind::StaleCancel]
        );
    }

    #[traced_test]
    #[test]
    fn test_agent_actions() {
        let scenario = ScenarioConfig::new(10, 2)
            .with_event(0, Event::arrival("u", Priority::Urgent, 8))
            .with_event(0, Event::arrival("r", Priority::Routine, 8))
            .with_event(0, Event::arrival("s", Priority::Routine, 8));
        let (mut env, _) = start(scenario);

        let outcome = env
            .step(&[
                Action::reject("u"),
                Action::reject("r"),
                Action::schedule("s", 3),
                Action::reschedule("s", 4),
                Action::Noop,
            ])
            .unwrap();
        assert_eq!(outcome.accepted, 4);
        assert_eq!(outcome.observation.scheduled[0].step, Step(4));

        let outcome = env.step(&[Action::cancel("s")]).unwrap();
        assert_eq!(outcome.accepted, 1);
        assert!(outcome.observation.scheduled.is_empty());

        let state = env.state().unwrap();
        assert_eq!(state.count(TaskStatus::Rejected), 1);
        assert_eq!(state.count(TaskStatus::Cancelled), 1);
        assert_eq!(state.count(TaskStatus::Pending), 1);
        assert_eq!(
            kinds(&env),
            vec![ViolationKind::InvalidAction {
                reason: RejectReason::UrgentReject
            }]
        );
    }

    #[traced_test]
    #[test]
    fn test_step_after_done_is_an_error() {
        let (mut env, _) = start(ScenarioConfig::new(2, 1));
        assert!(!env.step(&[]).unwrap().done);
        assert!(env.step(&[]).unwrap().done);
        assert_eq!(env.step(&[]), Err(EnvironmentError::EpisodeFinished(2)));

        let mut fresh = QueueEnvironment::default();
        assert_eq!(fresh.step(&[]), Err(EnvironmentError::NotStarted));
    }

    #[traced_test]
    #[test]
    fn test_stop_on_fatal_ends_early() {
        let scenario =
            ScenarioConfig::new(20, 1).with_event(0, Event::arrival("u", Priority::Urgent, 2));
        let mut env = QueueEnvironment::new(EnvironmentConfig::new().with_stop_on_fatal(true));
        env.reset(scenario).unwrap();
        run_empty(&mut env);

        let outcome = env.take_outcome().unwrap();
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.violations[0].kind, ViolationKind::DeadlineMiss);
    }

    #[test]
    fn test_same_inputs_same_trace() {
        let scenario = ScenarioConfig::new(8, 1)
            .with_event(0, Event::arrival("a", Priority::Routine, 4))
            .with_event(1, Event::arrival("b", Priority::Urgent, 3))
            .with_event(2, Event::capacity_change(2));
        let script: Vec<Vec<Action>> = vec![
            vec![Action::schedule("a", 2)],
            vec![Action::schedule("b", 2), Action::schedule("b", 3)],
        ];

        let run = || {
            let (mut env, _) = start(scenario.clone());
            for step in 0..8 {
                let actions = script.get(step).cloned().unwrap_or_default();
                env.step(&actions).unwrap();
            }
            env.take_outcome().unwrap()
        };
        assert_eq!(run(), run());
    }
}
