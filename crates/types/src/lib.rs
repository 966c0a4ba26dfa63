//! Core types for QBench.
//!
//! Tasks, agent actions, scripted events, scenario configuration,
//! observations, violations and episode results. This crate holds data
//! only; the engine, validator and runners live in the other workspace
//! crates.

mod action;
mod capacity;
mod event;
mod identifiers;
mod observation;
mod result;
mod scenario;
mod task;
mod violation;

pub use action::{Action, ActionKind};
pub use capacity::CapacityTimeline;
pub use event::Event;
pub use identifiers::{Step, TaskId};
pub use observation::{Observation, ScheduledTask};
pub use result::{EpisodeResult, MetricsSnapshot, StepRecord, TaskSummary, Verdict};
pub use scenario::{ScenarioConfig, ScenarioConfigError};
pub use task::{Priority, Task, TaskStatus};
pub use violation::{RejectReason, Violation, ViolationKind};
