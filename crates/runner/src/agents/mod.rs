//! Built-in baseline agents.

mod greedy;
mod noop;
mod random;

pub use greedy::GreedyAgent;
pub use noop::NoopAgent;
pub use random::RandomAgent;

use qbench_core::Agent;

/// Names accepted by [`baseline`].
pub const BASELINE_AGENTS: [&str; 3] = ["noop", "greedy", "random"];

/// Build a baseline agent by name. `seed` only matters for `random`.
pub fn baseline(name: &str, seed: u64) -> Option<Box<dyn Agent>> {
    match name {
        "noop" => Some(Box::new(NoopAgent)),
        "greedy" => Some(Box::new(GreedyAgent::new())),
        "random" => Some(Box::new(RandomAgent::new(seed))),
        _ => None,
    }
}
