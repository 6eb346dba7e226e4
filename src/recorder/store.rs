//! File layout of one run directory.
//!
//! ```text
//! <log_dir>/run_YYYYmmdd_HHMMSS/
//!   timeline.jsonl      one TimelineEvent per line, appended as events happen
//!   session_001.json    pretty SessionRecord, written when the session ends
//!   run_summary.json    pretty RunRecord, written when the run ends
//! ```

use crate::model::{PersistenceError, RunId, RunRecord, SessionRecord, TimelineEvent};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const TIMELINE_FILE: &str = "timeline.jsonl";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// `session_NNN.json`, zero padded to three digits.
pub fn session_file_name(session_number: u32) -> String {
    format!("session_{session_number:03}.json")
}

/// Paths of one run directory plus the writes that go into it.
#[derive(Debug, Clone)]
pub struct RunStore {
    run_dir: PathBuf,
    detached: bool,
}

impl RunStore {
    /// Create `<base_dir>/<run_id>/` (and any missing parents).
    pub fn create(base_dir: &Path, run_id: &RunId) -> Result<Self, PersistenceError> {
        let run_dir = base_dir.join(run_id.as_str());
        fs::create_dir_all(&run_dir).map_err(|source| PersistenceError::CreateRunDir {
            path: run_dir.clone(),
            source,
        })?;
        Ok(Self {
            run_dir,
            detached: false,
        })
    }

    /// A store that never touches the disk. Every write fails with
    /// [`PersistenceError::Detached`].
    pub fn detached(base_dir: &Path, run_id: &RunId) -> Self {
        Self {
            run_dir: base_dir.join(run_id.as_str()),
            detached: true,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn attached(&self, path: PathBuf) -> Result<PathBuf, PersistenceError> {
        if self.detached {
            Err(PersistenceError::Detached { path })
        } else {
            Ok(path)
        }
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.run_dir.join(TIMELINE_FILE)
    }

    pub fn session_path(&self, session_number: u32) -> PathBuf {
        self.run_dir.join(session_file_name(session_number))
    }

    pub fn run_summary_path(&self) -> PathBuf {
        self.run_dir.join(RUN_SUMMARY_FILE)
    }

    /// Append one event as a single JSON line.
    pub fn append_timeline(&self, event: &TimelineEvent) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let path = self.attached(self.timeline_path())?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| PersistenceError::Timeline { path, source })
    }

    pub fn write_session(&self, record: &SessionRecord) -> Result<PathBuf, PersistenceError> {
        let path = self.attached(self.session_path(record.session_number))?;
        write_pretty(&path, record)?;
        Ok(path)
    }

    pub fn write_run_summary(&self, record: &RunRecord) -> Result<PathBuf, PersistenceError> {
        let path = self.attached(self.run_summary_path())?;
        write_pretty(&path, record)?;
        Ok(path)
    }
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimelineEventType;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn run_id() -> RunId {
        RunId::from_start_time(&Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())
    }

    #[test]
    fn session_file_names_are_zero_padded() {
        assert_eq!(session_file_name(1), "session_001.json");
        assert_eq!(session_file_name(42), "session_042.json");
        assert_eq!(session_file_name(1234), "session_1234.json");
    }

    #[test]
    fn create_makes_nested_run_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("logs").join("nested");
        let store = RunStore::create(&base, &run_id()).unwrap();
        assert!(store.run_dir().is_dir());
        assert!(store.run_dir().ends_with("run_20240501_093000"));
    }

    #[test]
    fn create_fails_when_base_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("not_a_dir");
        fs::write(&base, "x").unwrap();
        let err = RunStore::create(&base, &run_id()).unwrap_err();
        assert!(matches!(err, PersistenceError::CreateRunDir { .. }));
    }

    #[test]
    fn timeline_appends_one_line_per_event() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::create(tmp.path(), &run_id()).unwrap();
        for n in 0..3 {
            store
                .append_timeline(&TimelineEvent {
                    timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, n).unwrap(),
                    event_type: TimelineEventType::TokenUsage,
                    session_number: 1,
                    data: json!({"input_tokens": n}),
                })
                .unwrap();
        }
        let text = fs::read_to_string(store.timeline_path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: TimelineEvent = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.data["input_tokens"], 2);
    }

    #[test]
    fn timeline_failure_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::create(tmp.path(), &run_id()).unwrap();
        fs::create_dir(store.timeline_path()).unwrap();

        let err = store
            .append_timeline(&TimelineEvent {
                timestamp: Utc::now(),
                event_type: TimelineEventType::Progress,
                session_number: 1,
                data: json!({}),
            })
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Timeline { ref path, .. } if path.ends_with(TIMELINE_FILE)));
    }

    #[test]
    fn detached_store_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RunStore::detached(tmp.path(), &run_id());
        assert!(store.is_detached());
        assert!(!store.run_dir().exists());

        let err = store
            .append_timeline(&TimelineEvent {
                timestamp: Utc::now(),
                event_type: TimelineEventType::Progress,
                session_number: 1,
                data: json!({}),
            })
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Detached { ref path } if path.ends_with(TIMELINE_FILE)));
        assert!(!store.timeline_path().exists());
    }
}
