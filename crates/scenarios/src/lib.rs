//! Scenario sources for QBench.
//!
//! - [`ScenarioLoader`]: reads and writes `<root>/<scenario>/seed_<n>.json`
//! - [`ScenarioRegistry`]: name → seed → source map, built once per run
//! - [`ScenarioGenerator`]: seeded synthetic scenarios

mod catalog;
mod generator;
mod loader;

pub use catalog::{is_standard, ScenarioRegistry, ScenarioSource, SCENARIO_NAMES};
pub use generator::{GeneratorConfig, LoadPattern, ScenarioGenerator};
pub use loader::{load_file, LoadError, ScenarioLoader, SeedEvent, SeedFile, SeedTask};
