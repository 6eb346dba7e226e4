//! Session recorder: the authoritative record of one agent session.
//!
//! Every domain event is turned into record updates and a redacted timeline
//! line. Timeline and session-file writes happen inline; a failed write is
//! logged, counted in `persistence_failures`, and otherwise ignored so the
//! in-memory record stays complete.
//!
//! # Tool call protocol
//!
//! At most one call is open at a time. A result seals the open call. Two
//! situations break the protocol and are recorded as [`ToolAnomaly`]s:
//!
//! - an invocation while a call is open seals the open call as
//!   [`ToolStatus::Superseded`]
//! - a result with no matching open call becomes a zero-duration record for
//!   the `unknown` tool with [`ToolStatus::Orphaned`]
//!
//! A call still open at [`SessionRecorder::finalize`] is sealed as
//! [`ToolStatus::Unfinished`].

use super::clock::{elapsed_seconds, Clock};
use super::store::RunStore;
use crate::model::{
    AnomalyEntry, DomainEvent, ErrorEntry, PersistenceError, ProgressSnapshot, SecurityBlock,
    SessionRecord, SessionStatistics, SlowestToolCall, TimelineEvent, TimelineEventType,
    TokenAccountant, TokenUsage, ToolAnomaly, ToolCallRecord, ToolName, ToolStatus, ToolUseId,
};
use crate::sanitize::{redact, truncate, RedactionPolicy, MAX_MESSAGE_CHARS, MAX_RESULT_CHARS};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason recorded on every security block.
pub const SECURITY_BLOCK_REASON: &str = "Security hook blocked command";

/// Redaction and size limits applied before anything is stored.
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub policy: RedactionPolicy,
    pub max_result_chars: usize,
    pub max_message_chars: usize,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            policy: RedactionPolicy::default(),
            max_result_chars: MAX_RESULT_CHARS,
            max_message_chars: MAX_MESSAGE_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenCall {
    tool_name: ToolName,
    tool_use_id: Option<ToolUseId>,
    start_time: DateTime<Utc>,
    input: Value,
}

/// Owns one in-progress session record.
pub struct SessionRecorder {
    session_number: u32,
    start_time: DateTime<Utc>,
    store: Arc<RunStore>,
    clock: Arc<dyn Clock>,
    options: RecorderOptions,
    open_call: Option<OpenCall>,
    tool_calls: Vec<ToolCallRecord>,
    errors: Vec<ErrorEntry>,
    security_blocks: Vec<SecurityBlock>,
    anomalies: Vec<AnomalyEntry>,
    tokens: TokenAccountant,
    progress: Option<ProgressSnapshot>,
    total_events: usize,
    persistence_failures: usize,
}

impl std::fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecorder")
            .field("session_number", &self.session_number)
            .field("start_time", &self.start_time)
            .field("tool_calls", &self.tool_calls.len())
            .field("open_call", &self.open_call.as_ref().map(|c| &c.tool_name))
            .finish_non_exhaustive()
    }
}

impl SessionRecorder {
    /// Begin recording session `session_number` now.
    pub fn start(
        session_number: u32,
        store: Arc<RunStore>,
        clock: Arc<dyn Clock>,
        options: RecorderOptions,
    ) -> Self {
        let start_time = clock.now();
        info!(session_number, "Session started");
        Self {
            session_number,
            start_time,
            store,
            clock,
            options,
            open_call: None,
            tool_calls: Vec::new(),
            errors: Vec::new(),
            security_blocks: Vec::new(),
            anomalies: Vec::new(),
            tokens: TokenAccountant::new(),
            progress: None,
            total_events: 0,
            persistence_failures: 0,
        }
    }

    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.tokens.totals()
    }

    /// Sealed tool calls so far.
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn open_tool(&self) -> Option<&ToolName> {
        self.open_call.as_ref().map(|c| &c.tool_name)
    }

    pub fn persistence_failures(&self) -> usize {
        self.persistence_failures
    }

    /// Apply one domain event.
    pub fn record(&mut self, event: &DomainEvent) {
        debug!(session_number = self.session_number, kind = event.kind(), "Recording event");
        match event {
            DomainEvent::TextDelta { text } => {
                if event.is_substantive_text() {
                    let text = truncate(
                        &self.options.policy.redact_str(text),
                        self.options.max_message_chars,
                    );
                    self.log(TimelineEventType::AgentMessage, json!({ "text": text }));
                }
            }
            DomainEvent::ToolInvocation {
                tool_name,
                tool_use_id,
                input,
            } => self.begin_tool(tool_name, tool_use_id.as_ref(), input),
            DomainEvent::ToolResult {
                tool_use_id,
                content,
                is_error,
                security_blocked,
            } => self.end_tool(tool_use_id.as_ref(), content, *is_error, *security_blocked),
            DomainEvent::UsageReport {
                input_tokens,
                output_tokens,
            } => {
                if self.tokens.record(*input_tokens, *output_tokens) {
                    let cumulative_total = self.tokens.totals().total();
                    self.log(
                        TimelineEventType::TokenUsage,
                        json!({
                            "input_tokens": input_tokens,
                            "output_tokens": output_tokens,
                            "cumulative_total": cumulative_total,
                        }),
                    );
                }
            }
        }
    }

    /// Record the current test progress.
    pub fn snapshot_progress(&mut self, passing_tests: u32, total_tests: u32) {
        let snapshot = ProgressSnapshot::new(passing_tests, total_tests, self.clock.now());
        self.progress = Some(snapshot);
        self.log(TimelineEventType::Progress, json!(snapshot));
    }

    /// Record a tool protocol anomaly.
    pub fn record_anomaly(&mut self, anomaly: ToolAnomaly) {
        warn!(session_number = self.session_number, %anomaly, "Tool protocol anomaly");
        let entry = AnomalyEntry {
            timestamp: self.clock.now(),
            anomaly,
        };
        self.log(TimelineEventType::Anomaly, json!(entry.anomaly));
        self.anomalies.push(entry);
    }

    fn begin_tool(&mut self, tool_name: &ToolName, tool_use_id: Option<&ToolUseId>, input: &Value) {
        let now = self.clock.now();
        if let Some(previous) = self.open_call.take() {
            let previous_tool = previous.tool_name.to_string();
            self.seal_without_result(previous, now, ToolStatus::Superseded);
            self.record_anomaly(ToolAnomaly::Superseded {
                previous_tool,
                next_tool: tool_name.to_string(),
            });
        }

        let input = redact(input, &self.options.policy);
        self.log(
            TimelineEventType::ToolStart,
            json!({
                "tool_name": tool_name,
                "tool_use_id": tool_use_id,
                "input": input,
            }),
        );
        self.open_call = Some(OpenCall {
            tool_name: tool_name.clone(),
            tool_use_id: tool_use_id.cloned(),
            start_time: now,
            input,
        });
    }

    fn end_tool(
        &mut self,
        tool_use_id: Option<&ToolUseId>,
        content: &str,
        is_error: bool,
        security_blocked: bool,
    ) {
        let now = self.clock.now();
        let matches_open = self.open_call.as_ref().is_some_and(|open| {
            match (&open.tool_use_id, tool_use_id) {
                (Some(open_id), Some(result_id)) => open_id == result_id,
                _ => true,
            }
        });

        let redacted = self.options.policy.redact_str(content);
        let result = truncate(&redacted, self.options.max_result_chars);
        let status = if security_blocked {
            ToolStatus::Blocked
        } else if is_error {
            ToolStatus::Error
        } else {
            ToolStatus::Success
        };

        // A result for a different id leaves the open call open.
        let matched = if matches_open {
            self.open_call.take()
        } else {
            None
        };
        let (call, status) = match matched {
            Some(open) => (open, status),
            None => {
                self.record_anomaly(ToolAnomaly::Orphaned {
                    tool_use_id: tool_use_id.map(|id| id.to_string()),
                });
                let orphan = OpenCall {
                    tool_name: ToolName::unknown(),
                    tool_use_id: tool_use_id.cloned(),
                    start_time: now,
                    input: Value::Null,
                };
                (orphan, ToolStatus::Orphaned)
            }
        };

        let duration_seconds = elapsed_seconds(call.start_time, now);
        self.log(
            TimelineEventType::ToolEnd,
            json!({
                "tool_name": call.tool_name,
                "tool_use_id": call.tool_use_id,
                "duration_seconds": duration_seconds,
                "is_error": is_error,
                "status": status,
                "result_size": result.original_size,
            }),
        );

        if is_error && !security_blocked {
            self.errors.push(ErrorEntry {
                timestamp: now,
                tool_name: call.tool_name.clone(),
                error: result.clone(),
            });
        }
        if security_blocked {
            let block = SecurityBlock {
                timestamp: now,
                tool_name: call.tool_name.clone(),
                command: call
                    .input
                    .get("command")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                message: truncate(&redacted, self.options.max_message_chars).content,
                reason: SECURITY_BLOCK_REASON.to_string(),
            };
            warn!(
                session_number = self.session_number,
                tool = %block.tool_name,
                "Tool call blocked by security hook"
            );
            self.log(TimelineEventType::SecurityBlock, json!(block));
            self.security_blocks.push(block);
        }

        self.tool_calls.push(ToolCallRecord {
            tool_name: call.tool_name,
            tool_use_id: call.tool_use_id,
            start_time: call.start_time,
            end_time: now,
            duration_seconds,
            input: call.input,
            result: Some(result),
            is_error,
            security_blocked,
            status,
        });
    }

    fn seal_without_result(&mut self, call: OpenCall, now: DateTime<Utc>, status: ToolStatus) {
        self.tool_calls.push(ToolCallRecord {
            duration_seconds: elapsed_seconds(call.start_time, now),
            tool_name: call.tool_name,
            tool_use_id: call.tool_use_id,
            start_time: call.start_time,
            end_time: now,
            input: call.input,
            result: None,
            is_error: false,
            security_blocked: false,
            status,
        });
    }

    fn log(&mut self, event_type: TimelineEventType, data: Value) {
        self.total_events += 1;
        let event = TimelineEvent {
            timestamp: self.clock.now(),
            event_type,
            session_number: self.session_number,
            data,
        };
        match self.store.append_timeline(&event) {
            Ok(()) => {}
            Err(PersistenceError::Detached { .. }) => self.persistence_failures += 1,
            Err(e) => {
                self.persistence_failures += 1;
                warn!(session_number = self.session_number, error = %e, "Timeline write failed");
            }
        }
    }

    /// Seal the session, write `session_NNN.json` and return the record.
    pub fn finalize(mut self) -> SessionRecord {
        let end_time = self.clock.now();
        if let Some(open) = self.open_call.take() {
            let tool_name = open.tool_name.to_string();
            self.seal_without_result(open, end_time, ToolStatus::Unfinished);
            self.record_anomaly(ToolAnomaly::Unfinished { tool_name });
        }

        let duration_seconds = elapsed_seconds(self.start_time, end_time);
        let summary = self.statistics();
        let mut record = SessionRecord {
            session_number: self.session_number,
            start_time: self.start_time,
            end_time,
            duration_seconds,
            duration_minutes: duration_seconds / 60.0,
            tool_calls: self.tool_calls,
            errors: self.errors,
            security_blocks: self.security_blocks,
            anomalies: self.anomalies,
            token_usage: self.tokens.totals(),
            progress: self.progress,
            total_events: self.total_events,
            summary,
        };

        match self.store.write_session(&record) {
            Ok(path) => info!(
                session_number = record.session_number,
                path = %path.display(),
                tool_calls = record.summary.total_tool_calls,
                "Session finalized"
            ),
            Err(e) => {
                record.summary.persistence_failures += 1;
                warn!(session_number = record.session_number, error = %e, "Session file write failed");
            }
        }
        record
    }

    fn statistics(&self) -> SessionStatistics {
        let mut tools_used: Vec<ToolName> = Vec::new();
        for call in &self.tool_calls {
            if !tools_used.contains(&call.tool_name) {
                tools_used.push(call.tool_name.clone());
            }
        }

        // Ties keep the earliest call.
        let slowest_tool_call = self
            .tool_calls
            .iter()
            .fold(None::<&ToolCallRecord>, |best, call| match best {
                Some(b) if b.duration_seconds >= call.duration_seconds => Some(b),
                _ => Some(call),
            })
            .map(|call| SlowestToolCall {
                tool_name: call.tool_name.clone(),
                duration_seconds: call.duration_seconds,
            });

        let average_tool_duration = if self.tool_calls.is_empty() {
            0.0
        } else {
            self.tool_calls
                .iter()
                .map(|c| c.duration_seconds)
                .sum::<f64>()
                / self.tool_calls.len() as f64
        };

        SessionStatistics {
            total_tool_calls: self.tool_calls.len(),
            total_events: self.total_events,
            total_errors: self.errors.len(),
            total_security_blocks: self.security_blocks.len(),
            tools_used,
            slowest_tool_call,
            average_tool_duration,
            persistence_failures: self.persistence_failures,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
