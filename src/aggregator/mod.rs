//! Tool batch aggregator.
//!
//! Groups consecutive tool invocations that are not interrupted by narrative
//! text into a [`ToolBatch`], for display and rollup only. The authoritative
//! per-call records live in the session recorder; nothing here feeds them.
//!
//! # State machine
//!
//! ```text
//! Idle      --ToolInvocation-->     BatchOpen   (new batch, entry pending)
//! BatchOpen --ToolInvocation-->     BatchOpen   (entry appended, pending)
//! BatchOpen --ToolResult-->         BatchOpen   (latest pending entry sealed)
//! BatchOpen --TextDelta(non-blank)--> Idle      (emits BatchSummary)
//! BatchOpen --stream end-->         Idle        (emits BatchSummary)
//! Idle      --ToolResult-->         Idle        (ignored)
//! ```

use crate::model::{DomainEvent, ToolName};
use crate::sanitize::{preview, redact, RedactionPolicy};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Characters of tool output kept in an entry preview.
pub const OUTPUT_PREVIEW_CHARS: usize = 100;

/// Tool groups shown in a batch summary before the overflow count.
pub const MAX_SUMMARY_GROUPS: usize = 5;

/// Outcome of one entry in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Success,
    Error,
    Blocked,
}

/// One tool call as seen by the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub tool_name: ToolName,
    /// Redacted path, pattern or command.
    pub details: Option<String>,
    pub status: EntryStatus,
    /// Redacted first characters of the output.
    pub output_preview: Option<String>,
}

/// Consecutive tool calls with no narrative in between.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolBatch {
    entries: Vec<BatchEntry>,
    start_time: DateTime<Utc>,
}

impl ToolBatch {
    fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            entries: Vec::new(),
            start_time,
        }
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    /// Entries that received a result.
    pub fn completed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status != EntryStatus::Pending)
            .count()
    }

    /// Most recent entry, typically the one still running.
    pub fn latest(&self) -> Option<&BatchEntry> {
        self.entries.last()
    }

    fn count_status(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Collapse runs of identical tool names and count everything up.
    pub fn summarize(&self, now: DateTime<Utc>) -> BatchSummary {
        let mut runs: Vec<(ToolName, usize)> = Vec::new();
        for entry in &self.entries {
            match runs.last_mut() {
                Some((name, count)) if *name == entry.tool_name => *count += 1,
                _ => runs.push((entry.tool_name.clone(), 1)),
            }
        }
        let overflow = runs.len().saturating_sub(MAX_SUMMARY_GROUPS);
        runs.truncate(MAX_SUMMARY_GROUPS);

        BatchSummary {
            groups: runs,
            overflow,
            total: self.total_count(),
            completed: self.completed_count(),
            errors: self.count_status(EntryStatus::Error),
            blocked: self.count_status(EntryStatus::Blocked),
            elapsed: (now - self.start_time).to_std().unwrap_or_default(),
        }
    }
}

/// Condensed description of a closed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    /// Runs of identical tool names, at most [`MAX_SUMMARY_GROUPS`].
    pub groups: Vec<(ToolName, usize)>,
    /// Runs left out of `groups`.
    pub overflow: usize,
    pub total: usize,
    pub completed: usize,
    pub errors: usize,
    pub blocked: usize,
    pub elapsed: Duration,
}

impl fmt::Display for BatchSummary {
    /// Renders `Read (2x), Bash, +3 more`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, count)) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if *count > 1 {
                write!(f, "{name} ({count}x)")?;
            } else {
                write!(f, "{name}")?;
            }
        }
        if self.overflow > 0 {
            write!(f, ", +{} more", self.overflow)?;
        }
        Ok(())
    }
}

/// Aggregator state.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchState {
    Idle,
    BatchOpen(ToolBatch),
}

/// Drives the batch state machine from domain events.
#[derive(Debug, Clone)]
pub struct ToolBatchAggregator {
    state: BatchState,
    policy: RedactionPolicy,
}

impl Default for ToolBatchAggregator {
    fn default() -> Self {
        Self::new(RedactionPolicy::default())
    }
}

impl ToolBatchAggregator {
    pub fn new(policy: RedactionPolicy) -> Self {
        Self {
            state: BatchState::Idle,
            policy,
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn current_batch(&self) -> Option<&ToolBatch> {
        match &self.state {
            BatchState::BatchOpen(batch) => Some(batch),
            BatchState::Idle => None,
        }
    }

    /// Feed one event. Returns a summary when the event closes a batch.
    pub fn on_event(&mut self, event: &DomainEvent, now: DateTime<Utc>) -> Option<BatchSummary> {
        match event {
            DomainEvent::ToolInvocation {
                tool_name, input, ..
            } => {
                let details = tool_name
                    .details(&redact(input, &self.policy))
                    .map(|d| self.policy.redact_str(&d));
                let entry = BatchEntry {
                    tool_name: tool_name.clone(),
                    details,
                    status: EntryStatus::Pending,
                    output_preview: None,
                };
                match &mut self.state {
                    BatchState::BatchOpen(batch) => batch.entries.push(entry),
                    BatchState::Idle => {
                        let mut batch = ToolBatch::new(now);
                        batch.entries.push(entry);
                        self.state = BatchState::BatchOpen(batch);
                    }
                }
                None
            }
            DomainEvent::ToolResult {
                content,
                is_error,
                security_blocked,
                ..
            } => {
                if let BatchState::BatchOpen(batch) = &mut self.state {
                    let pending = batch
                        .entries
                        .iter_mut()
                        .rev()
                        .find(|e| e.status == EntryStatus::Pending);
                    if let Some(entry) = pending {
                        entry.status = if *security_blocked {
                            EntryStatus::Blocked
                        } else if *is_error {
                            EntryStatus::Error
                        } else {
                            EntryStatus::Success
                        };
                        entry.output_preview = Some(
                            self.policy
                                .redact_str(&preview(content, OUTPUT_PREVIEW_CHARS)),
                        );
                    }
                }
                None
            }
            DomainEvent::TextDelta { .. } if event.is_substantive_text() => self.finish(now),
            DomainEvent::TextDelta { .. } | DomainEvent::UsageReport { .. } => None,
        }
    }

    /// Close the open batch at stream end.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Option<BatchSummary> {
        match std::mem::replace(&mut self.state, BatchState::Idle) {
            BatchState::BatchOpen(batch) => Some(batch.summarize(now)),
            BatchState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, secs).unwrap()
    }

    fn invoke(name: &str) -> DomainEvent {
        DomainEvent::ToolInvocation {
            tool_name: ToolName::parse(name),
            tool_use_id: None,
            input: json!({}),
        }
    }

    fn result(is_error: bool) -> DomainEvent {
        DomainEvent::ToolResult {
            tool_use_id: None,
            content: "done".into(),
            is_error,
            security_blocked: false,
        }
    }

    fn text(s: &str) -> DomainEvent {
        DomainEvent::TextDelta { text: s.into() }
    }

    #[test]
    fn starts_idle() {
        let agg = ToolBatchAggregator::default();
        assert_eq!(agg.state(), &BatchState::Idle);
        assert!(agg.current_batch().is_none());
    }

    #[test]
    fn invocation_opens_batch_and_text_closes_it() {
        let mut agg = ToolBatchAggregator::default();
        assert!(agg.on_event(&invoke("Read"), t(0)).is_none());
        assert!(agg.on_event(&result(false), t(1)).is_none());
        assert_eq!(agg.current_batch().unwrap().completed_count(), 1);

        let summary = agg.on_event(&text("Now editing"), t(3)).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.elapsed, Duration::from_secs(3));
        assert_eq!(agg.state(), &BatchState::Idle);
    }

    #[test]
    fn blank_text_does_not_close_batch() {
        let mut agg = ToolBatchAggregator::default();
        agg.on_event(&invoke("Bash"), t(0));
        assert!(agg.on_event(&text("  \n"), t(1)).is_none());
        assert!(agg.current_batch().is_some());
    }

    #[test]
    fn result_while_idle_is_ignored() {
        let mut agg = ToolBatchAggregator::default();
        assert!(agg.on_event(&result(true), t(0)).is_none());
        assert_eq!(agg.state(), &BatchState::Idle);
    }

    #[test]
    fn result_marks_most_recent_pending_entry() {
        let mut agg = ToolBatchAggregator::default();
        agg.on_event(&invoke("Read"), t(0));
        agg.on_event(&invoke("Grep"), t(0));
        agg.on_event(&result(true), t(1));

        let entries = agg.current_batch().unwrap().entries();
        assert_eq!(entries[0].status, EntryStatus::Pending);
        assert_eq!(entries[1].status, EntryStatus::Error);
        assert_eq!(entries[1].output_preview.as_deref(), Some("done"));
    }

    #[test]
    fn blocked_result_wins_over_error_flag() {
        let mut agg = ToolBatchAggregator::default();
        agg.on_event(&invoke("Bash"), t(0));
        agg.on_event(
            &DomainEvent::ToolResult {
                tool_use_id: None,
                content: "Command blocked".into(),
                is_error: true,
                security_blocked: true,
            },
            t(1),
        );
        let summary = agg.finish(t(2)).unwrap();
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn consecutive_identical_tools_collapse() {
        let mut agg = ToolBatchAggregator::default();
        let stream = [
            invoke("A"),
            result(false),
            invoke("A"),
            result(false),
            text("x"),
            invoke("B"),
            result(true),
        ];
        let mut summaries: Vec<_> = stream
            .iter()
            .filter_map(|e| agg.on_event(e, t(0)))
            .collect();
        summaries.extend(agg.finish(t(0)));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].to_string(), "A (2x)");
        assert_eq!(summaries[1].to_string(), "B");
        assert_eq!(summaries[1].errors, 1);
    }

    #[test]
    fn non_adjacent_repeats_form_separate_groups() {
        let mut agg = ToolBatchAggregator::default();
        for name in ["Read", "Read", "Edit", "Read"] {
            agg.on_event(&invoke(name), t(0));
        }
        let summary = agg.finish(t(0)).unwrap();
        insta::assert_snapshot!(summary.to_string(), @"Read (2x), Edit, Read");
    }

    #[test]
    fn summary_keeps_five_groups_and_counts_overflow() {
        let mut agg = ToolBatchAggregator::default();
        for name in ["A", "B", "C", "D", "E", "F", "G"] {
            agg.on_event(&invoke(name), t(0));
        }
        let summary = agg.finish(t(0)).unwrap();
        assert_eq!(summary.groups.len(), 5);
        assert_eq!(summary.overflow, 2);
        assert_eq!(summary.total, 7);
        insta::assert_snapshot!(summary.to_string(), @"A, B, C, D, E, +2 more");
    }

    #[test]
    fn finish_when_idle_returns_none() {
        let mut agg = ToolBatchAggregator::default();
        assert!(agg.finish(t(0)).is_none());
    }

    #[test]
    fn details_are_redacted() {
        let mut agg = ToolBatchAggregator::default();
        agg.on_event(
            &DomainEvent::ToolInvocation {
                tool_name: ToolName::Bash,
                tool_use_id: None,
                input: json!({"command": "deploy --token=abc123"}),
            },
            t(0),
        );
        let entry = agg.current_batch().unwrap().latest().unwrap();
        assert_eq!(entry.details.as_deref(), Some("deploy --token=[REDACTED]"));
    }
}
