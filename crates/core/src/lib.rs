//! Core abstractions shared by the QBench engine and runners.
//!
//! - [`StateView`]: read-only view of a running episode, implemented by the
//!   engine and consumed by the validator
//! - [`Agent`]: in-process decision maker
//! - [`ActionBatch`], [`ResponseParser`]: the agent reply protocol
//! - [`ObservationFormatter`]: text and compact JSON renderings of an
//!   observation

mod agent;
mod batch;
mod formatter;
mod parser;
mod traits;

pub use agent::Agent;
pub use batch::{ActionBatch, Placement, TaskRef};
pub use formatter::{ObservationFormatter, TASK_PROMPT};
pub use parser::{ParseError, ResponseParser};
pub use traits::StateView;
