//! Tests for the session recorder.

use super::*;
use crate::model::RunId;
use crate::recorder::clock::ManualClock;
use chrono::TimeZone;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    store: Arc<RunStore>,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let store = RunStore::create(tmp.path(), &RunId::from_start_time(&start)).unwrap();
    Fixture {
        _tmp: tmp,
        store: Arc::new(store),
        clock: ManualClock::new(start),
    }
}

impl Fixture {
    fn recorder(&self, n: u32) -> SessionRecorder {
        SessionRecorder::start(
            n,
            Arc::clone(&self.store),
            Arc::new(self.clock.clone()),
            RecorderOptions::default(),
        )
    }

    fn timeline(&self) -> Vec<TimelineEvent> {
        fs::read_to_string(self.store.timeline_path())
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

fn invoke(name: &str, id: &str, input: Value) -> DomainEvent {
    DomainEvent::ToolInvocation {
        tool_name: ToolName::parse(name),
        tool_use_id: Some(ToolUseId::new(id).unwrap()),
        input,
    }
}

fn result(id: &str, content: &str, is_error: bool) -> DomainEvent {
    DomainEvent::ToolResult {
        tool_use_id: Some(ToolUseId::new(id).unwrap()),
        content: content.to_string(),
        is_error,
        security_blocked: crate::normalizer::is_security_block(content),
    }
}

// ===== Tool calls =====

#[test]
fn invocation_and_result_seal_one_call_with_duration() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Read", "t1", json!({"file_path": "src/lib.rs"})));
    assert_eq!(rec.open_tool(), Some(&ToolName::Read));
    fx.clock.advance_secs(3);
    rec.record(&result("t1", "contents", false));

    let record = rec.finalize();
    assert_eq!(record.tool_calls.len(), 1);
    let call = &record.tool_calls[0];
    assert_eq!(call.status, ToolStatus::Success);
    assert_eq!(call.duration_seconds, 3.0);
    assert_eq!(call.result.as_ref().unwrap().content, "contents");
    assert!(record.errors.is_empty());
}

#[test]
fn tool_input_and_result_are_redacted() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke(
        "Bash",
        "t1",
        json!({"command": "export ANTHROPIC_API_KEY=sk-123 && ./run.sh"}),
    ));
    rec.record(&result("t1", "password=hunter2", false));
    let record = rec.finalize();

    let call = &record.tool_calls[0];
    assert_eq!(
        call.input["command"],
        "export ANTHROPIC_API_KEY=[REDACTED] && ./run.sh"
    );
    assert_eq!(call.result.as_ref().unwrap().content, "password=[REDACTED]");

    let persisted = fs::read_to_string(fx.store.session_path(1)).unwrap();
    assert!(!persisted.contains("sk-123"));
    assert!(!persisted.contains("hunter2"));
}

#[test]
fn large_result_is_truncated() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Read", "t1", json!({})));
    rec.record(&result("t1", &"x".repeat(12_000), false));
    let record = rec.finalize();

    let stored = record.tool_calls[0].result.as_ref().unwrap();
    assert!(stored.truncated);
    assert_eq!(stored.original_size, 12_000);
    assert!(stored.content.ends_with("[truncated 2000 chars]"));
}

#[test]
fn error_result_goes_to_errors_list() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Bash", "t1", json!({"command": "cargo test"})));
    rec.record(&result("t1", "test failed", true));
    let record = rec.finalize();

    assert_eq!(record.tool_calls[0].status, ToolStatus::Error);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].tool_name, ToolName::Bash);
    assert_eq!(record.errors[0].error.content, "test failed");
}

#[test]
fn security_block_is_not_an_error() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Bash", "t1", json!({"command": "rm -rf /"})));
    rec.record(&result("t1", "Command blocked: rm is not allowed", true));
    let record = rec.finalize();

    assert!(record.errors.is_empty());
    assert_eq!(record.security_blocks.len(), 1);
    let block = &record.security_blocks[0];
    assert_eq!(block.command.as_deref(), Some("rm -rf /"));
    assert_eq!(block.reason, SECURITY_BLOCK_REASON);
    assert_eq!(record.tool_calls[0].status, ToolStatus::Blocked);
    assert!(fx
        .timeline()
        .iter()
        .any(|e| e.event_type == TimelineEventType::SecurityBlock));
}

// ===== Anomalies =====

#[test]
fn second_invocation_supersedes_open_call() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Read", "t1", json!({})));
    fx.clock.advance_secs(2);
    rec.record(&invoke("Edit", "t2", json!({})));
    rec.record(&result("t2", "ok", false));
    let record = rec.finalize();

    assert_eq!(record.tool_calls.len(), 2);
    assert_eq!(record.tool_calls[0].status, ToolStatus::Superseded);
    assert_eq!(record.tool_calls[0].duration_seconds, 2.0);
    assert!(record.tool_calls[0].result.is_none());
    assert_eq!(record.tool_calls[1].status, ToolStatus::Success);
    assert_eq!(
        record.anomalies[0].anomaly,
        ToolAnomaly::Superseded {
            previous_tool: "Read".into(),
            next_tool: "Edit".into()
        }
    );
}

#[test]
fn unmatched_result_is_orphaned() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&result("ghost", "output", false));
    let record = rec.finalize();

    assert_eq!(record.tool_calls.len(), 1);
    let call = &record.tool_calls[0];
    assert_eq!(call.tool_name, ToolName::unknown());
    assert_eq!(call.status, ToolStatus::Orphaned);
    assert_eq!(call.duration_seconds, 0.0);
    assert!(matches!(
        &record.anomalies[0].anomaly,
        ToolAnomaly::Orphaned { tool_use_id: Some(id) } if id == "ghost"
    ));
}

#[test]
fn result_for_other_id_keeps_open_call_open() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Grep", "t1", json!({})));
    rec.record(&result("t9", "stray", false));
    assert_eq!(rec.open_tool(), Some(&ToolName::Grep));
    rec.record(&result("t1", "match", false));
    let record = rec.finalize();

    let statuses: Vec<_> = record.tool_calls.iter().map(|c| c.status).collect();
    assert_eq!(statuses, vec![ToolStatus::Orphaned, ToolStatus::Success]);
}

#[test]
fn open_call_at_finalize_is_unfinished() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&invoke("Bash", "t1", json!({"command": "sleep 100"})));
    fx.clock.advance_secs(5);
    let record = rec.finalize();

    assert_eq!(record.tool_calls[0].status, ToolStatus::Unfinished);
    assert_eq!(record.tool_calls[0].duration_seconds, 5.0);
    assert!(matches!(
        record.anomalies[0].anomaly,
        ToolAnomaly::Unfinished { .. }
    ));
}

// ===== Tokens, messages, progress =====

#[test]
fn usage_reports_accumulate_and_zero_reports_are_skipped() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&DomainEvent::UsageReport {
        input_tokens: 100,
        output_tokens: 20,
    });
    rec.record(&DomainEvent::UsageReport {
        input_tokens: 0,
        output_tokens: 0,
    });
    rec.record(&DomainEvent::UsageReport {
        input_tokens: 50,
        output_tokens: 5,
    });
    let record = rec.finalize();

    assert_eq!(record.token_usage, TokenUsage::new(150, 25));
    let usage_lines: Vec<_> = fx
        .timeline()
        .into_iter()
        .filter(|e| e.event_type == TimelineEventType::TokenUsage)
        .collect();
    assert_eq!(usage_lines.len(), 2);
    assert_eq!(usage_lines[1].data["cumulative_total"], 175);
}

#[test]
fn blank_text_is_not_logged() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.record(&DomainEvent::TextDelta { text: "\n".into() });
    rec.record(&DomainEvent::TextDelta {
        text: "Implementing login".into(),
    });
    let record = rec.finalize();

    assert_eq!(record.total_events, 1);
    let timeline = fx.timeline();
    assert_eq!(timeline[0].event_type, TimelineEventType::AgentMessage);
    assert_eq!(timeline[0].data["text"]["content"], "Implementing login");
}

#[test]
fn progress_snapshot_is_kept() {
    let fx = fixture();
    let mut rec = fx.recorder(1);
    rec.snapshot_progress(45, 200);
    let record = rec.finalize();
    let progress = record.progress.unwrap();
    assert_eq!(progress.passing_tests, 45);
    assert_eq!(progress.percentage, 22.5);
}

// ===== Summary =====

#[test]
fn summary_statistics() {
    let fx = fixture();
    let mut rec = fx.recorder(3);
    for (i, (name, secs)) in [("Read", 2), ("Bash", 5), ("Read", 5), ("Edit", 0)]
        .into_iter()
        .enumerate()
    {
        let id = format!("t{i}");
        rec.record(&invoke(name, &id, json!({})));
        fx.clock.advance_secs(secs);
        rec.record(&result(&id, "ok", false));
    }
    fx.clock.advance_secs(48);
    let record = rec.finalize();

    assert_eq!(record.session_number, 3);
    assert_eq!(record.duration_seconds, 60.0);
    assert_eq!(record.duration_minutes, 1.0);
    let summary = &record.summary;
    assert_eq!(summary.total_tool_calls, 4);
    assert_eq!(
        summary.tools_used,
        vec![ToolName::Read, ToolName::Bash, ToolName::Edit]
    );
    let slowest = summary.slowest_tool_call.as_ref().unwrap();
    assert_eq!(slowest.tool_name, ToolName::Bash, "ties keep the first call");
    assert_eq!(slowest.duration_seconds, 5.0);
    assert_eq!(summary.average_tool_duration, 3.0);
    assert_eq!(summary.persistence_failures, 0);
}

#[test]
fn empty_session_summary() {
    let fx = fixture();
    let record = fx.recorder(1).finalize();
    assert_eq!(record.summary.total_tool_calls, 0);
    assert_eq!(record.summary.average_tool_duration, 0.0);
    assert!(record.summary.slowest_tool_call.is_none());
    assert!(fx.store.session_path(1).exists());
}

#[test]
fn session_file_round_trips() {
    let fx = fixture();
    let mut rec = fx.recorder(2);
    rec.record(&invoke("Glob", "t1", json!({"pattern": "**/*.rs"})));
    rec.record(&result("t1", "a.rs", false));
    let record = rec.finalize();

    let text = fs::read_to_string(fx.store.session_path(2)).unwrap();
    let back: SessionRecord = serde_json::from_str(&text).unwrap();
    assert_eq!(back.tool_calls, record.tool_calls);
    assert_eq!(back.summary, record.summary);
    assert_eq!(back.token_usage, record.token_usage);
}

// ===== Persistence failures =====

#[test]
fn timeline_failure_is_counted_and_session_continues() {
    let fx = fixture();
    // A directory in place of the timeline makes every append fail.
    fs::create_dir(fx.store.timeline_path()).unwrap();

    let mut rec = fx.recorder(1);
    rec.record(&invoke("Read", "t1", json!({})));
    rec.record(&result("t1", "ok", false));
    assert_eq!(rec.persistence_failures(), 2);

    let record = rec.finalize();
    assert_eq!(record.tool_calls.len(), 1);
    assert_eq!(record.summary.persistence_failures, 2);
    assert!(fx.store.session_path(1).exists(), "session file still written");
}

#[test]
fn session_file_failure_still_returns_record() {
    let fx = fixture();
    fs::create_dir(fx.store.session_path(1)).unwrap();

    let mut rec = fx.recorder(1);
    rec.record(&invoke("Bash", "t1", json!({"command": "make"})));
    rec.record(&result("t1", "built", false));
    let record = rec.finalize();

    assert_eq!(record.tool_calls.len(), 1);
    assert_eq!(record.summary.persistence_failures, 1);
    assert_eq!(record.summarize().persistence_failures, 1);
    assert_eq!(fx.timeline().len(), 2, "timeline unaffected");
}
