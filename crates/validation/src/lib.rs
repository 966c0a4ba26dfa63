//! Action validation and hard-constraint checking.
//!
//! - [`ActionValidator`]: pure legality check for a single agent action,
//!   consulted by the engine before anything is applied
//! - [`ConstraintChecker`]: derives the pass/fail verdict from a finished
//!   episode's violation log, task table and trace

mod checker;
mod validator;

pub use checker::{CheckReport, ConstraintChecker};
pub use qbench_types::RejectReason;
pub use validator::ActionValidator;
