//! Post-hoc analysis of a run directory.
//!
//! Reads back `session_NNN.json`, `run_summary.json` and `timeline.jsonl`
//! and looks for the usual signs of a session going sideways: slow tools,
//! files edited over and over, long silences and repeated failures.

pub mod report;

pub use report::{comparison_report, session_report, timeline_report};

use crate::model::{RunRecord, SessionRecord, TimelineEvent, TokenUsage, ToolName};
use crate::recorder::{RUN_SUMMARY_FILE, TIMELINE_FILE};
use crate::sanitize::preview;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Slowest calls listed per session.
pub const SLOWEST_CALLS: usize = 10;
/// Most used tools listed per session.
pub const MOST_USED_TOOLS: usize = 10;
/// Operations on one file before it is listed as repeated.
pub const REPEATED_FILE_OPERATIONS: usize = 5;
/// Operations on one file before it counts as a stuck indicator.
pub const FILE_CHURN_OPERATIONS: usize = 20;
/// Failures of one tool before it counts as a stuck indicator.
pub const REPEATED_FAILURES: usize = 3;
/// Silence between two tool calls worth reporting.
pub const LONG_GAP_SECONDS: f64 = 60.0;
/// A single tool call longer than this counts as a stuck indicator.
pub const LONG_CALL_SECONDS: f64 = 30.0 * 60.0;

const INPUT_PREVIEW_CHARS: usize = 100;

/// Errors reading a run directory back.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Path does not exist.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// File could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File is not a valid record.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Directory holds no session files.
    #[error("No session files found in {dir}")]
    NoSessions { dir: PathBuf },
}

// ===== Session analysis =====

/// One of the slowest calls of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SlowCall {
    pub tool_name: ToolName,
    pub duration_seconds: f64,
    /// First characters of the (already redacted) input.
    pub input_preview: String,
}

/// A file touched many times in one session.
#[derive(Debug, Clone, PartialEq)]
pub struct FileActivity {
    pub path: String,
    pub operations: usize,
    /// Operation count per tool, in first-use order.
    pub tools: Vec<(ToolName, usize)>,
}

/// Silence between two consecutive tool calls.
#[derive(Debug, Clone, PartialEq)]
pub struct LongGap {
    pub after_tool: ToolName,
    pub before_tool: ToolName,
    pub gap_seconds: f64,
}

/// Something that suggests the agent was stuck.
#[derive(Debug, Clone, PartialEq)]
pub enum StuckIndicator {
    RepeatedFailures { tool_name: ToolName, count: usize },
    LongCall { tool_name: ToolName, duration_seconds: f64 },
    FileChurn { file_name: String, operations: usize },
}

impl fmt::Display for StuckIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StuckIndicator::RepeatedFailures { tool_name, count } => {
                write!(f, "Tool '{tool_name}' failed {count} times")
            }
            StuckIndicator::LongCall {
                tool_name,
                duration_seconds,
            } => write!(
                f,
                "Tool '{tool_name}' took {:.1} minutes",
                duration_seconds / 60.0
            ),
            StuckIndicator::FileChurn {
                file_name,
                operations,
            } => write!(f, "File '{file_name}' modified {operations} times"),
        }
    }
}

/// Findings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAnalysis {
    pub session_number: u32,
    pub duration_minutes: f64,
    pub total_tool_calls: usize,
    pub total_errors: usize,
    pub total_security_blocks: usize,
    pub token_usage: TokenUsage,
    pub slowest_calls: Vec<SlowCall>,
    pub most_used_tools: Vec<(ToolName, usize)>,
    pub repeated_files: Vec<FileActivity>,
    pub long_gaps: Vec<LongGap>,
    pub stuck_indicators: Vec<StuckIndicator>,
}

/// Analyze a finalized session.
pub fn analyze_session(session: &SessionRecord) -> SessionAnalysis {
    let calls = &session.tool_calls;

    // Stable sorts: equal keys keep recording order.
    let mut by_duration: Vec<_> = calls.iter().collect();
    by_duration.sort_by(|a, b| b.duration_seconds.total_cmp(&a.duration_seconds));
    let slowest_calls = by_duration
        .into_iter()
        .take(SLOWEST_CALLS)
        .map(|call| SlowCall {
            tool_name: call.tool_name.clone(),
            duration_seconds: call.duration_seconds,
            input_preview: preview(&call.input.to_string(), INPUT_PREVIEW_CHARS),
        })
        .collect();

    let mut most_used_tools = count_in_order(calls.iter().map(|c| &c.tool_name));
    most_used_tools.sort_by(|a, b| b.1.cmp(&a.1));
    most_used_tools.truncate(MOST_USED_TOOLS);

    let mut files: Vec<(String, Vec<&ToolName>)> = Vec::new();
    for call in calls {
        let Some(path) = call.tool_name.target_path(&call.input) else {
            continue;
        };
        match files.iter_mut().find(|(p, _)| *p == path) {
            Some((_, tools)) => tools.push(&call.tool_name),
            None => files.push((path, vec![&call.tool_name])),
        }
    }
    let mut repeated_files: Vec<FileActivity> = files
        .into_iter()
        .filter(|(_, tools)| tools.len() >= REPEATED_FILE_OPERATIONS)
        .map(|(path, tools)| FileActivity {
            operations: tools.len(),
            tools: count_in_order(tools.into_iter()),
            path,
        })
        .collect();
    repeated_files.sort_by(|a, b| b.operations.cmp(&a.operations));

    let long_gaps = calls
        .windows(2)
        .filter_map(|pair| {
            let gap_seconds =
                (pair[1].start_time - pair[0].end_time).num_milliseconds() as f64 / 1000.0;
            (gap_seconds > LONG_GAP_SECONDS).then(|| LongGap {
                after_tool: pair[0].tool_name.clone(),
                before_tool: pair[1].tool_name.clone(),
                gap_seconds,
            })
        })
        .collect();

    let mut stuck_indicators: Vec<StuckIndicator> =
        count_in_order(session.errors.iter().map(|e| &e.tool_name))
            .into_iter()
            .filter(|(_, count)| *count >= REPEATED_FAILURES)
            .map(|(tool_name, count)| StuckIndicator::RepeatedFailures { tool_name, count })
            .collect();
    stuck_indicators.extend(
        calls
            .iter()
            .filter(|c| c.duration_seconds > LONG_CALL_SECONDS)
            .map(|c| StuckIndicator::LongCall {
                tool_name: c.tool_name.clone(),
                duration_seconds: c.duration_seconds,
            }),
    );
    stuck_indicators.extend(
        repeated_files
            .iter()
            .filter(|f| f.operations > FILE_CHURN_OPERATIONS)
            .map(|f| StuckIndicator::FileChurn {
                file_name: file_name(&f.path),
                operations: f.operations,
            }),
    );

    SessionAnalysis {
        session_number: session.session_number,
        duration_minutes: session.duration_minutes,
        total_tool_calls: calls.len(),
        total_errors: session.errors.len(),
        total_security_blocks: session.security_blocks.len(),
        token_usage: session.token_usage,
        slowest_calls,
        most_used_tools,
        repeated_files,
        long_gaps,
        stuck_indicators,
    }
}

fn count_in_order<'a>(names: impl Iterator<Item = &'a ToolName>) -> Vec<(ToolName, usize)> {
    let mut counts: Vec<(ToolName, usize)> = Vec::new();
    for name in names {
        match counts.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name.clone(), 1)),
        }
    }
    counts
}

/// Last path component, or the whole path when it has none.
pub(crate) fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

// ===== Loading =====

/// Read one `session_NNN.json`.
pub fn load_session(path: &Path) -> Result<SessionRecord, AnalysisError> {
    let text = read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| AnalysisError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `run_summary.json` if the run got that far.
pub fn load_run_summary(run_dir: &Path) -> Result<Option<RunRecord>, AnalysisError> {
    let path = run_dir.join(RUN_SUMMARY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = read_to_string(&path)?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| AnalysisError::Parse { path, source })
}

/// `session_*.json` files of a run directory, sorted by name.
pub fn session_files(run_dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    let entries = fs::read_dir(run_dir).map_err(|source| AnalysisError::Read {
        path: run_dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("session_") && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_to_string(path: &Path) -> Result<String, AnalysisError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            AnalysisError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            AnalysisError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

// ===== Run comparison =====

/// One session of a run, side by side with the others.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub session_number: u32,
    pub duration_minutes: f64,
    pub tool_calls: usize,
    pub errors: usize,
    pub tokens: u64,
    /// `(passing, total)` when a feature list existed.
    pub progress: Option<(u32, u32)>,
    pub path: PathBuf,
}

/// All sessions of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunComparison {
    pub run_dir: PathBuf,
    /// Present once the run was finalized.
    pub summary: Option<RunRecord>,
    pub rows: Vec<SessionRow>,
}

impl RunComparison {
    /// Longest session; ties keep the earliest.
    pub fn longest(&self) -> Option<&SessionRow> {
        self.rows.iter().fold(None, |best: Option<&SessionRow>, row| match best {
            Some(b) if b.duration_minutes >= row.duration_minutes => Some(b),
            _ => Some(row),
        })
    }
}

/// Load every session of `run_dir` for comparison.
pub fn compare_run(run_dir: &Path) -> Result<RunComparison, AnalysisError> {
    if !run_dir.exists() {
        return Err(AnalysisError::NotFound {
            path: run_dir.to_path_buf(),
        });
    }
    let files = session_files(run_dir)?;
    if files.is_empty() {
        return Err(AnalysisError::NoSessions {
            dir: run_dir.to_path_buf(),
        });
    }

    let rows = files
        .into_iter()
        .map(|path| {
            let session = load_session(&path)?;
            Ok(SessionRow {
                session_number: session.session_number,
                duration_minutes: session.duration_minutes,
                tool_calls: session.tool_calls.len(),
                errors: session.errors.len(),
                tokens: session.token_usage.total(),
                progress: session
                    .progress
                    .filter(|p| p.total_tests > 0)
                    .map(|p| (p.passing_tests, p.total_tests)),
                path,
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    Ok(RunComparison {
        run_dir: run_dir.to_path_buf(),
        summary: load_run_summary(run_dir)?,
        rows,
    })
}

// ===== Timeline =====

/// Parsed `timeline.jsonl`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    /// Lines that were not timeline events.
    pub skipped: usize,
}

impl Timeline {
    /// Events of one session.
    pub fn for_session(&self, session_number: u32) -> impl Iterator<Item = &TimelineEvent> {
        self.events
            .iter()
            .filter(move |e| e.session_number == session_number)
    }
}

/// Read the timeline of a run directory (or a timeline file directly).
///
/// Malformed lines are skipped and counted.
pub fn read_timeline(path: &Path) -> Result<Timeline, AnalysisError> {
    let path = if path.is_dir() {
        path.join(TIMELINE_FILE)
    } else {
        path.to_path_buf()
    };
    let file = fs::File::open(&path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            AnalysisError::NotFound { path: path.clone() }
        } else {
            AnalysisError::Read {
                path: path.clone(),
                source,
            }
        }
    })?;

    let mut timeline = Timeline::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| AnalysisError::Read {
            path: path.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TimelineEvent>(&line) {
            Ok(event) => timeline.events.push(event),
            Err(e) => {
                debug!(line = index + 1, error = %e, "Skipping timeline line");
                timeline.skipped += 1;
            }
        }
    }
    Ok(timeline)
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod tests;
