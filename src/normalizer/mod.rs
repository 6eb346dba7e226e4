//! Event normalizer: raw stream messages to domain events.
//!
//! This is the only module that knows the agent runtime's wire shape. Every
//! function here is pure and total: a line that cannot be understood yields
//! diagnostics instead of an error, so one bad line never stops the stream.
//!
//! # Classification
//!
//! - `assistant`: `text` blocks become [`DomainEvent::TextDelta`], `tool_use`
//!   blocks become [`DomainEvent::ToolInvocation`], thinking is ignored.
//! - `user`: `tool_result` blocks become [`DomainEvent::ToolResult`].
//! - `system` with subtype `init`: [`StreamSignal::SessionInit`].
//! - `result`: [`StreamSignal::SessionResult`]. Its usage is cumulative for
//!   the whole conversation and is not reported again.
//!
//! Usage on assistant and user lines is emitted last, after the content
//! events of the same line.

pub mod raw;

use crate::model::{DomainEvent, NormalizeError, ToolName, ToolUseId};
use raw::{
    has_flat_usage, RawContentBlock, RawMessage, RawMessageContent, MESSAGE_TYPE_ASSISTANT,
    MESSAGE_TYPE_RESULT, MESSAGE_TYPE_SYSTEM, MESSAGE_TYPE_USER, SYSTEM_SUBTYPE_INIT,
};
use serde_json::Value;

pub use raw::{RawStreamMessage, UsagePayload};

/// Substring (matched case-insensitively) that marks a tool result as refused
/// by the security layer.
pub const BLOCKED_MARKER: &str = "blocked";

/// Stream-level lifecycle information that is not a domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// The runtime started a conversation.
    SessionInit {
        session_id: Option<String>,
        model: Option<String>,
    },
    /// The runtime finished a conversation.
    SessionResult {
        is_error: bool,
        num_turns: Option<u32>,
        duration_ms: Option<u64>,
        total_cost_usd: Option<f64>,
    },
}

/// Everything extracted from one stream message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Domain events in block order.
    pub events: Vec<DomainEvent>,
    pub signal: Option<StreamSignal>,
    /// Problems found while classifying; never fatal.
    pub diagnostics: Vec<NormalizeError>,
}

impl Normalized {
    fn malformed(reason: impl Into<String>) -> Self {
        Self {
            diagnostics: vec![NormalizeError::malformed(reason)],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.signal.is_none() && self.diagnostics.is_empty()
    }
}

/// Normalize one JSONL line.
///
/// Blank lines yield nothing. Invalid JSON yields a single
/// [`NormalizeError::MalformedEvent`] diagnostic.
pub fn normalize_line(line: &str) -> Normalized {
    let line = line.trim();
    if line.is_empty() {
        return Normalized::default();
    }

    match serde_json::from_str::<RawStreamMessage>(line) {
        Ok(raw) => normalize(raw),
        Err(e) => Normalized::malformed(format!("invalid JSON: {e}")),
    }
}

/// Normalize one decoded stream message.
pub fn normalize(raw: RawStreamMessage) -> Normalized {
    match raw.message_type.as_str() {
        MESSAGE_TYPE_ASSISTANT | MESSAGE_TYPE_USER => normalize_conversation(raw),
        MESSAGE_TYPE_SYSTEM => {
            let signal = (raw.subtype.as_deref() == Some(SYSTEM_SUBTYPE_INIT)).then(|| {
                StreamSignal::SessionInit {
                    session_id: raw.session_id,
                    model: raw.model,
                }
            });
            Normalized {
                signal,
                ..Normalized::default()
            }
        }
        MESSAGE_TYPE_RESULT => Normalized {
            signal: Some(StreamSignal::SessionResult {
                is_error: raw.is_error.unwrap_or(false),
                num_turns: raw.num_turns,
                duration_ms: raw.duration_ms,
                total_cost_usd: raw.total_cost_usd,
            }),
            ..Normalized::default()
        },
        other => Normalized::malformed(format!("unknown message type {other:?}")),
    }
}

fn normalize_conversation(raw: RawStreamMessage) -> Normalized {
    let mut out = Normalized::default();
    let is_assistant = raw.message_type == MESSAGE_TYPE_ASSISTANT;

    let usage = find_usage(&raw);

    match raw.message {
        Some(RawMessage { content, .. }) => match content {
            RawMessageContent::Text(text) => {
                // A plain-string user message is the prompt echo, not an event.
                if is_assistant {
                    out.events.push(DomainEvent::TextDelta { text });
                }
            }
            RawMessageContent::Blocks(blocks) => {
                for block in blocks {
                    normalize_block(block, &mut out);
                }
            }
        },
        None if usage.is_none() => {
            out.diagnostics.push(NormalizeError::malformed(format!(
                "{} message without a message body",
                raw.message_type
            )));
        }
        None => {}
    }

    match usage.map(serde_json::from_value::<UsagePayload>) {
        Some(Ok(payload)) => {
            let (input_tokens, output_tokens) = payload.tokens();
            if input_tokens > 0 || output_tokens > 0 {
                out.events.push(DomainEvent::UsageReport {
                    input_tokens,
                    output_tokens,
                });
            }
        }
        Some(Err(e)) => out.diagnostics.push(NormalizeError::UsageExtraction {
            reason: e.to_string(),
        }),
        None => {}
    }

    out
}

/// Locate the usage payload: nested `message.usage`, then a top-level
/// `usage` object, then flat counters on the message or the line itself.
fn find_usage(raw: &RawStreamMessage) -> Option<Value> {
    if let Some(message) = &raw.message {
        if let Some(usage) = message.usage.as_ref().filter(|u| !u.is_null()) {
            return Some(usage.clone());
        }
    }
    if let Some(usage) = raw.usage.as_ref().filter(|u| !u.is_null()) {
        return Some(usage.clone());
    }
    if let Some(message) = raw.message.as_ref().filter(|m| has_flat_usage(&m.extra)) {
        return Some(Value::Object(message.extra.clone()));
    }
    has_flat_usage(&raw.extra).then(|| Value::Object(raw.extra.clone()))
}

fn normalize_block(block: Value, out: &mut Normalized) {
    let block_type = block
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string();

    let block = match serde_json::from_value::<RawContentBlock>(block) {
        Ok(block) => block,
        Err(e) => {
            out.diagnostics.push(NormalizeError::malformed(format!(
                "unrecognized content block {block_type:?}: {e}"
            )));
            return;
        }
    };

    match block {
        RawContentBlock::Text { text } => out.events.push(DomainEvent::TextDelta { text }),
        RawContentBlock::ToolUse { id, name, input } => {
            out.events.push(DomainEvent::ToolInvocation {
                tool_name: ToolName::parse(&name),
                tool_use_id: id.and_then(|id| ToolUseId::new(id).ok()),
                input,
            })
        }
        RawContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let content = content.into_text();
            out.events.push(DomainEvent::ToolResult {
                tool_use_id: tool_use_id.and_then(|id| ToolUseId::new(id).ok()),
                security_blocked: is_security_block(&content),
                content,
                is_error,
            })
        }
        RawContentBlock::Thinking {} | RawContentBlock::RedactedThinking {} => {}
    }
}

/// Whether tool result text reports a security refusal.
pub fn is_security_block(content: &str) -> bool {
    content.to_lowercase().contains(BLOCKED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(line: &str) -> Vec<DomainEvent> {
        let normalized = normalize_line(line);
        assert!(
            normalized.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            normalized.diagnostics
        );
        normalized.events
    }

    // ===== Assistant messages =====

    #[test]
    fn assistant_text_block_becomes_text_delta() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Reading the spec"}]}}"#;
        assert_eq!(
            events(line),
            vec![DomainEvent::TextDelta {
                text: "Reading the spec".into()
            }]
        );
    }

    #[test]
    fn assistant_tool_use_becomes_invocation() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_1","name":"Read","input":{"file_path":"app_spec.txt"}}]}}"#;
        let events = events(line);
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::ToolInvocation {
                tool_name,
                tool_use_id,
                input,
            } => {
                assert_eq!(*tool_name, ToolName::Read);
                assert_eq!(tool_use_id.as_ref().map(|id| id.as_str()), Some("toolu_1"));
                assert_eq!(input["file_path"], "app_spec.txt");
            }
            other => panic!("expected ToolInvocation, got {other:?}"),
        }
    }

    #[test]
    fn assistant_events_keep_block_order_and_usage_comes_last() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"Let me check"},
            {"type":"tool_use","id":"a","name":"Glob","input":{"pattern":"*.rs"}},
            {"type":"tool_use","id":"b","name":"Bash","input":{"command":"ls"}}
        ],"usage":{"input_tokens":10,"output_tokens":2}}}"#
            .replace('\n', "");
        let kinds: Vec<_> = events(&line).iter().map(DomainEvent::kind).collect();
        assert_eq!(
            kinds,
            vec!["text_delta", "tool_invocation", "tool_invocation", "usage_report"]
        );
    }

    #[test]
    fn thinking_blocks_are_ignored() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm","signature":"x"}]}}"#;
        let normalized = normalize_line(line);
        assert!(normalized.is_empty());
    }

    #[test]
    fn unknown_block_is_diagnosed_but_siblings_survive() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"hologram"},{"type":"text","text":"still here"}]}}"#;
        let normalized = normalize_line(line);
        assert_eq!(normalized.events.len(), 1);
        assert_eq!(normalized.diagnostics.len(), 1);
        assert!(matches!(
            &normalized.diagnostics[0],
            NormalizeError::MalformedEvent { reason } if reason.contains("hologram")
        ));
    }

    #[test]
    fn empty_tool_use_id_becomes_none() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"","name":"Task","input":{}}]}}"#;
        assert!(matches!(
            &events(line)[0],
            DomainEvent::ToolInvocation { tool_use_id: None, .. }
        ));
    }

    // ===== Tool results =====

    #[test]
    fn user_tool_result_with_string_content() {
        let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"file contents","is_error":false}]}}"#;
        assert_eq!(
            events(line),
            vec![DomainEvent::ToolResult {
                tool_use_id: Some(ToolUseId::new("toolu_1").unwrap()),
                content: "file contents".into(),
                is_error: false,
                security_blocked: false,
            }]
        );
    }

    #[test]
    fn tool_result_with_part_list_content() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t","content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}]}}"#;
        match &events(line)[0] {
            DomainEvent::ToolResult {
                content, is_error, ..
            } => {
                assert_eq!(content, "a\nb");
                assert!(!is_error);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }

    #[test]
    fn blocked_result_is_reclassified_even_without_error_flag() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t","content":"Command BLOCKED by security hook: rm not allowed"}]}}"#;
        assert!(matches!(
            &events(line)[0],
            DomainEvent::ToolResult {
                is_error: false,
                security_blocked: true,
                ..
            }
        ));
    }

    #[test]
    fn blocked_error_result_keeps_both_flags() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t","content":"blocked","is_error":true}]}}"#;
        assert!(matches!(
            &events(line)[0],
            DomainEvent::ToolResult {
                is_error: true,
                security_blocked: true,
                ..
            }
        ));
    }

    #[test]
    fn plain_user_prompt_is_not_an_event() {
        let line = r#"{"type":"user","message":{"role":"user","content":"Continue building"}}"#;
        assert!(normalize_line(line).is_empty());
    }

    // ===== Usage =====

    #[test]
    fn usage_adds_cache_tokens() {
        let line = r#"{"type":"assistant","message":{"content":[],"usage":{"input_tokens":100,"output_tokens":20,"cache_creation_input_tokens":5,"cache_read_input_tokens":15}}}"#;
        assert_eq!(
            events(line),
            vec![DomainEvent::UsageReport {
                input_tokens: 120,
                output_tokens: 20
            }]
        );
    }

    #[test]
    fn top_level_openai_usage() {
        let line = r#"{"type":"assistant","message":{"content":[]},"usage":{"prompt_tokens":8,"completion_tokens":4}}"#;
        assert_eq!(
            events(line),
            vec![DomainEvent::UsageReport {
                input_tokens: 8,
                output_tokens: 4
            }]
        );
    }

    #[test]
    fn flat_usage_keys_on_line() {
        let line = r#"{"type":"assistant","input_tokens":3,"output_tokens":1}"#;
        assert_eq!(
            events(line),
            vec![DomainEvent::UsageReport {
                input_tokens: 3,
                output_tokens: 1
            }]
        );
    }

    #[test]
    fn zero_usage_emits_nothing() {
        let line = r#"{"type":"assistant","message":{"content":[],"usage":{"input_tokens":0,"output_tokens":0}}}"#;
        assert!(normalize_line(line).is_empty());
    }

    #[test]
    fn malformed_usage_is_diagnosed_without_event() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}],"usage":{"input_tokens":"many"}}}"#;
        let normalized = normalize_line(line);
        assert_eq!(normalized.events.len(), 1, "text survives");
        assert!(matches!(
            normalized.diagnostics.as_slice(),
            [NormalizeError::UsageExtraction { .. }]
        ));
    }

    // ===== Signals and malformed input =====

    #[test]
    fn system_init_becomes_signal() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc","model":"claude-sonnet-4-5","tools":["Read"]}"#;
        let normalized = normalize_line(line);
        assert_eq!(
            normalized.signal,
            Some(StreamSignal::SessionInit {
                session_id: Some("abc".into()),
                model: Some("claude-sonnet-4-5".into()),
            })
        );
        assert!(normalized.events.is_empty());
    }

    #[test]
    fn other_system_subtypes_are_ignored() {
        let line = r#"{"type":"system","subtype":"hook_response"}"#;
        assert!(normalize_line(line).is_empty());
    }

    #[test]
    fn result_signal_does_not_recount_usage() {
        let line = r#"{"type":"result","subtype":"success","is_error":false,"num_turns":12,"duration_ms":64000,"total_cost_usd":0.42,"usage":{"input_tokens":9000,"output_tokens":800}}"#;
        let normalized = normalize_line(line);
        assert!(normalized.events.is_empty());
        assert_eq!(
            normalized.signal,
            Some(StreamSignal::SessionResult {
                is_error: false,
                num_turns: Some(12),
                duration_ms: Some(64000),
                total_cost_usd: Some(0.42),
            })
        );
    }

    #[test]
    fn unknown_type_is_malformed() {
        let normalized = normalize_line(r#"{"type":"telemetry","x":1}"#);
        assert!(normalized.events.is_empty());
        assert!(matches!(
            normalized.diagnostics.as_slice(),
            [NormalizeError::MalformedEvent { reason }] if reason.contains("telemetry")
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let normalized = normalize_line("{not json");
        assert_eq!(normalized.diagnostics.len(), 1);
        assert!(normalized.events.is_empty());
    }

    #[test]
    fn blank_lines_yield_nothing() {
        assert!(normalize_line("   ").is_empty());
    }

    #[test]
    fn assistant_without_body_is_malformed() {
        let normalized = normalize_line(r#"{"type":"assistant"}"#);
        assert_eq!(normalized.diagnostics.len(), 1);
    }
}
