//! Result artifact.

use crate::benchmark::BenchmarkSummary;
use crate::error::RunnerError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// `qbench_results_<unix seconds>.json`.
pub fn default_artifact_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    format!("qbench_results_{}.json", secs)
}

/// Write `summary` as pretty JSON, creating parent directories as needed.
///
/// A directory `path` receives a file named by [`default_artifact_name`].
/// Returns the file written.
pub fn write_summary(path: &Path, summary: &BenchmarkSummary) -> Result<PathBuf, RunnerError> {
    let target = if path.is_dir() {
        path.join(default_artifact_name())
    } else {
        path.to_path_buf()
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| RunnerError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&target, json).map_err(|source| RunnerError::Io {
        path: target.clone(),
        source,
    })?;

    info!(
        path = %target.display(),
        episodes = summary.total_episodes,
        "Wrote benchmark results"
    );
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::{EpisodeResult, Step, Violation, ViolationKind};

    fn summary() -> BenchmarkSummary {
        BenchmarkSummary::from_results(vec![EpisodeResult::aborted(
            "steady",
            4,
            Violation::new(ViolationKind::Timeout, Step(3), "budget"),
        )])
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs/latest/results.json");

        let written = write_summary(&path, &summary()).unwrap();
        assert_eq!(written, path);

        let parsed: BenchmarkSummary =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, summary());
    }

    #[test]
    fn test_write_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_summary(dir.path(), &summary()).unwrap();

        let name = written.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("qbench_results_"));
        assert!(name.ends_with(".json"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["violations"][0]["kind"], "timeout");
    }
}
