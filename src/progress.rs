//! Test progress lookup.
//!
//! The agent tracks its work in `<project_dir>/feature_list.json`, an array
//! of feature objects each carrying a `passes` flag. Progress is the count of
//! passing features over the total. A missing or unreadable file means no
//! progress yet, reported as `(0, 0)`.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the feature list inside the project directory.
pub const FEATURE_LIST_FILE: &str = "feature_list.json";

/// Supplies `(passing, total)` test counts.
pub trait ProgressSource: Send + Sync {
    fn lookup(&self) -> (u32, u32);
}

/// Reads `feature_list.json` on every lookup.
#[derive(Debug, Clone)]
pub struct FeatureListProgress {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    passes: bool,
}

impl FeatureListProgress {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(FEATURE_LIST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressSource for FeatureListProgress {
    fn lookup(&self) -> (u32, u32) {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return (0, 0);
        };
        match serde_json::from_str::<Vec<Feature>>(&text) {
            Ok(features) => {
                let passing = features.iter().filter(|f| f.passes).count();
                (
                    u32::try_from(passing).unwrap_or(u32::MAX),
                    u32::try_from(features.len()).unwrap_or(u32::MAX),
                )
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Unreadable feature list");
                (0, 0)
            }
        }
    }
}

/// Used when no project directory is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSource for NoProgress {
    fn lookup(&self) -> (u32, u32) {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_passing_features() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(FEATURE_LIST_FILE),
            r#"[
                {"description": "login", "passes": true},
                {"description": "logout", "passes": false},
                {"description": "signup"},
                {"description": "reset", "passes": true}
            ]"#,
        )
        .unwrap();
        assert_eq!(FeatureListProgress::new(tmp.path()).lookup(), (2, 4));
    }

    #[test]
    fn missing_file_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(FeatureListProgress::new(tmp.path()).lookup(), (0, 0));
    }

    #[test]
    fn invalid_json_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(FEATURE_LIST_FILE), "[{").unwrap();
        assert_eq!(FeatureListProgress::new(tmp.path()).lookup(), (0, 0));
    }

    #[test]
    fn no_progress_is_zero() {
        assert_eq!(NoProgress.lookup(), (0, 0));
    }
}
