//! Persisted session and run records.
//!
//! These are the shapes written to `session_NNN.json` and `run_summary.json`.
//! Records are built and mutated only by the recorders; once finalized they
//! are plain immutable data, also read back by the log analysis.

use crate::model::{RunId, TokenUsage, ToolAnomaly, ToolName, ToolUseId};
use crate::sanitize::Truncated;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ===== Tool calls =====

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    /// Refused by the security layer.
    Blocked,
    /// Sealed without a result because another invocation started.
    Superseded,
    /// A result that matched no invocation.
    Orphaned,
    /// Still open when the session ended.
    Unfinished,
}

/// One tool invocation and its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: ToolName,
    pub tool_use_id: Option<ToolUseId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Redacted tool input.
    pub input: serde_json::Value,
    /// Redacted and truncated result text; `None` when no result was seen.
    pub result: Option<Truncated>,
    pub is_error: bool,
    pub security_blocked: bool,
    pub status: ToolStatus,
}

/// A failed tool call, listed separately for quick inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub tool_name: ToolName,
    pub error: Truncated,
}

/// A tool call refused by the security layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityBlock {
    pub timestamp: DateTime<Utc>,
    pub tool_name: ToolName,
    /// Redacted command from the tool input, when the tool had one.
    pub command: Option<String>,
    /// Redacted block message returned to the agent.
    pub message: String,
    pub reason: String,
}

/// A recorded tool protocol anomaly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub anomaly: ToolAnomaly,
}

/// Point-in-time test progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub passing_tests: u32,
    pub total_tests: u32,
    pub percentage: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(passing_tests: u32, total_tests: u32, timestamp: DateTime<Utc>) -> Self {
        let percentage = if total_tests > 0 {
            f64::from(passing_tests) / f64::from(total_tests) * 100.0
        } else {
            0.0
        };
        Self {
            passing_tests,
            total_tests,
            percentage,
            timestamp,
        }
    }
}

// ===== Timeline =====

/// Kind of a timeline line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    AgentMessage,
    ToolStart,
    ToolEnd,
    SecurityBlock,
    TokenUsage,
    Progress,
    Anomaly,
}

impl TimelineEventType {
    /// Name as written to the timeline.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentMessage => "agent_message",
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::SecurityBlock => "security_block",
            Self::TokenUsage => "token_usage",
            Self::Progress => "progress",
            Self::Anomaly => "anomaly",
        }
    }
}

/// One line of `timeline.jsonl`.
///
/// `data` is already redacted when the event is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: TimelineEventType,
    pub session_number: u32,
    pub data: serde_json::Value,
}

// ===== Session =====

/// Slowest tool call of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowestToolCall {
    pub tool_name: ToolName,
    pub duration_seconds: f64,
}

/// Derived statistics computed when a session is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_tool_calls: usize,
    pub total_events: usize,
    pub total_errors: usize,
    pub total_security_blocks: usize,
    /// Distinct tool names in first-use order.
    pub tools_used: Vec<ToolName>,
    pub slowest_tool_call: Option<SlowestToolCall>,
    pub average_tool_duration: f64,
    /// Writes to the run directory that failed during the session.
    #[serde(default)]
    pub persistence_failures: usize,
}

/// The full record of one finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_number: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub duration_minutes: f64,
    pub tool_calls: Vec<ToolCallRecord>,
    pub errors: Vec<ErrorEntry>,
    pub security_blocks: Vec<SecurityBlock>,
    /// Anomalies are write-only: analysis never needs to read them back.
    #[serde(default, skip_deserializing)]
    pub anomalies: Vec<AnomalyEntry>,
    pub token_usage: TokenUsage,
    pub progress: Option<ProgressSnapshot>,
    pub total_events: usize,
    pub summary: SessionStatistics,
}

impl SessionRecord {
    /// Condensed view kept by the run record.
    pub fn summarize(&self) -> SessionSummary {
        SessionSummary {
            session_number: self.session_number,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_minutes: self.duration_minutes,
            tool_calls: self.summary.total_tool_calls,
            errors: self.summary.total_errors,
            security_blocks: self.summary.total_security_blocks,
            tokens_used: self.token_usage.total(),
            token_usage: self.token_usage,
            persistence_failures: self.summary.persistence_failures,
        }
    }
}

// ===== Run =====

/// Sealed, read-only summary of one session inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_number: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub tool_calls: usize,
    pub errors: usize,
    pub security_blocks: usize,
    pub tokens_used: u64,
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub persistence_failures: usize,
}

/// Longest session of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongestSession {
    pub session_number: u32,
    pub duration_minutes: f64,
}

/// Run-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_sessions: usize,
    pub total_tool_calls: usize,
    pub total_errors: usize,
    pub total_security_blocks: usize,
    pub total_tokens: u64,
    pub token_usage: TokenUsage,
    pub longest_session: Option<LongestSession>,
    /// Failed writes across all sessions, plus the run summary itself.
    #[serde(default)]
    pub persistence_failures: usize,
}

/// Descriptive metadata about a run, supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub project_dir: Option<PathBuf>,
    pub model: Option<String>,
    /// Name of the agent configuration the runtime was started with.
    pub config: Option<String>,
}

/// The full record of one finalized run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    #[serde(flatten)]
    pub metadata: RunMetadata,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub duration_minutes: f64,
    pub sessions: Vec<SessionSummary>,
    pub summary: RunStatistics,
}
