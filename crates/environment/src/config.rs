//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`QueueEnvironment`](crate::QueueEnvironment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// End the episode at the first fatal violation instead of running to
    /// the horizon.
    ///
    /// Off by default so the trace always covers the whole episode.
    #[serde(default)]
    pub stop_on_fatal: bool,
}

impl EnvironmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the first fatal violation ends the episode.
    pub fn with_stop_on_fatal(mut self, stop_on_fatal: bool) -> Self {
        self.stop_on_fatal = stop_on_fatal;
        self
    }
}
