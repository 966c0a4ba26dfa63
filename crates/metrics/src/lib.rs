//! Soft performance metrics.
//!
//! Metrics rank agents that already pass the hard constraints. They are
//! computed for failing episodes too, for diagnostics.

mod accumulator;

pub use accumulator::{average, compute, MetricsAccumulator};
