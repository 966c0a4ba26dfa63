//! Seed file reading and writing.
//!
//! A seed file is JSON with events keyed by step strings:
//!
//! ```json
//! {
//!   "horizon": 20,
//!   "capacity_per_step": 3,
//!   "events": {
//!     "0": [{"type": "arrival", "task": {"id": "u1", "priority": "urgent", "deadline": 12}}],
//!     "4": [{"type": "cancel", "task_id": "u1"}, {"type": "capacity_change", "new_capacity": 2}]
//!   }
//! }
//! ```
//!
//! Files live at `<root>/<scenario>/seed_<n>.json`.

use qbench_types::{Event, Priority, ScenarioConfig, ScenarioConfigError, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while locating, reading or checking seed files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Scenarios directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Seed file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed seed file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid event step key {key:?} in {path}")]
    InvalidStepKey { path: PathBuf, key: String },

    #[error("Invalid scenario in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ScenarioConfigError,
    },

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Scenario {scenario} has no seed {seed}")]
    UnknownSeed { scenario: String, seed: u64 },
}

/// Task payload of an arrival in the seed file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTask {
    pub id: String,
    pub priority: Priority,
    pub deadline: u64,
    /// Redundant with the event's step; kept for compatibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<u64>,
}

/// One event in the seed file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeedEvent {
    Arrival { task: SeedTask },
    Cancel { task_id: String },
    CapacityChange { new_capacity: u32 },
}

/// On-disk shape of a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFile {
    pub horizon: u64,
    pub capacity_per_step: u32,
    #[serde(default)]
    pub events: BTreeMap<String, Vec<SeedEvent>>,
}

impl SeedFile {
    /// Convert into a scenario, resolving step keys.
    ///
    /// Step keys must be non-negative integers. An arrival's own
    /// `arrival_time`, when present and different from its step, is ignored
    /// in favour of the step.
    pub fn into_scenario(self, path: &Path) -> Result<ScenarioConfig, LoadError> {
        let mut config = ScenarioConfig::new(self.horizon, self.capacity_per_step);

        for (key, events) in self.events {
            let step: u64 = key.trim().parse().map_err(|_| LoadError::InvalidStepKey {
                path: path.to_path_buf(),
                key: key.clone(),
            })?;

            for event in events {
                let event = match event {
                    SeedEvent::Arrival { task } => {
                        if task.arrival_time.is_some_and(|arrival| arrival != step) {
                            warn!(
                                path = %path.display(),
                                task = %task.id,
                                step,
                                arrival_time = ?task.arrival_time,
                                "Arrival time disagrees with event step, using step"
                            );
                        }
                        if task.deadline == step {
                            warn!(
                                path = %path.display(),
                                task = %task.id,
                                priority = %task.priority,
                                step,
                                "Deadline equals arrival step, task can never be scheduled"
                            );
                        }
                        Event::arrival(task.id, task.priority, task.deadline)
                    }
                    SeedEvent::Cancel { task_id } => Event::cancel(task_id),
                    SeedEvent::CapacityChange { new_capacity } => {
                        Event::capacity_change(new_capacity)
                    }
                };
                config.push_event(Step(step), event);
            }
        }

        config.validate().map_err(|source| LoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }
}

impl From<&ScenarioConfig> for SeedFile {
    fn from(config: &ScenarioConfig) -> Self {
        let events = config
            .events
            .iter()
            .map(|(step, events)| {
                let events = events
                    .iter()
                    .map(|event| match event {
                        Event::Arrival {
                            id,
                            priority,
                            deadline,
                        } => SeedEvent::Arrival {
                            task: SeedTask {
                                id: id.to_string(),
                                priority: *priority,
                                deadline: deadline.0,
                                arrival_time: Some(step.0),
                            },
                        },
                        Event::Cancel { task_id } => SeedEvent::Cancel {
                            task_id: task_id.to_string(),
                        },
                        Event::CapacityChange { new_capacity } => SeedEvent::CapacityChange {
                            new_capacity: *new_capacity,
                        },
                    })
                    .collect();
                (step.0.to_string(), events)
            })
            .collect();

        SeedFile {
            horizon: config.horizon,
            capacity_per_step: config.capacity_per_step,
            events,
        }
    }
}

/// Reads and writes seed files under a scenarios root directory.
#[derive(Debug, Clone)]
pub struct ScenarioLoader {
    root: PathBuf,
}

impl ScenarioLoader {
    /// Create a loader rooted at an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(LoadError::MissingDirectory(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a scenario seed file.
    pub fn seed_path(&self, scenario: &str, seed: u64) -> PathBuf {
        self.root.join(scenario).join(format!("seed_{}.json", seed))
    }

    /// Load a seed file. Relative paths resolve against the root.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ScenarioConfig, LoadError> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        load_file(&path)
    }

    /// Load `<root>/<scenario>/seed_<seed>.json`.
    pub fn load_seed(&self, scenario: &str, seed: u64) -> Result<ScenarioConfig, LoadError> {
        load_file(&self.seed_path(scenario, seed))
    }

    /// Scenario directories that contain at least one seed file, by name.
    pub fn scenario_dirs(&self) -> Result<Vec<String>, LoadError> {
        let mut names = Vec::new();
        for entry in read_dir(&self.root)? {
            let path = entry.path();
            if path.is_dir() && !seeds_in(&path)?.is_empty() {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Seed numbers available for a scenario, ascending.
    pub fn seeds(&self, scenario: &str) -> Result<Vec<u64>, LoadError> {
        let dir = self.root.join(scenario);
        if !dir.is_dir() {
            return Err(LoadError::UnknownScenario(scenario.to_string()));
        }
        seeds_in(&dir)
    }

    /// Write a scenario as `<root>/<scenario>/seed_<seed>.json`.
    pub fn save(
        &self,
        scenario: &str,
        seed: u64,
        config: &ScenarioConfig,
    ) -> Result<PathBuf, LoadError> {
        let path = self.seed_path(scenario, seed);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&SeedFile::from(config)).map_err(|source| {
            LoadError::Json {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, json).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Wrote seed file");
        Ok(path)
    }
}

/// Read, parse and validate one seed file.
pub fn load_file(path: &Path) -> Result<ScenarioConfig, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let seed: SeedFile = serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    seed.into_scenario(path)
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    entries
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

/// Seed numbers of `seed_<n>.json` files in `dir`.
fn seeds_in(dir: &Path) -> Result<Vec<u64>, LoadError> {
    let mut seeds: Vec<u64> = read_dir(dir)?
        .iter()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            name.strip_prefix("seed_")?
                .strip_suffix(".json")?
                .parse()
                .ok()
        })
        .collect();
    seeds.sort_unstable();
    Ok(seeds)
}
