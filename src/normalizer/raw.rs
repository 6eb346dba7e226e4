//! Wire shapes of the agent runtime's `stream-json` output.
//!
//! These types mirror the JSON exactly and carry no validation. The rest of
//! the crate never sees them: [`super::normalize`] turns them into
//! [`crate::model::DomainEvent`]s.

use serde::Deserialize;
use serde_json::{Map, Value};

// Message type string constants
pub(super) const MESSAGE_TYPE_ASSISTANT: &str = "assistant";
pub(super) const MESSAGE_TYPE_USER: &str = "user";
pub(super) const MESSAGE_TYPE_SYSTEM: &str = "system";
pub(super) const MESSAGE_TYPE_RESULT: &str = "result";

pub(super) const SYSTEM_SUBTYPE_INIT: &str = "init";

/// One line of the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStreamMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    #[serde(default)]
    pub usage: Option<Value>,
    // System init fields
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    // Result fields
    #[serde(default)]
    pub is_error: Option<bool>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    /// Everything else, including flat usage keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The nested `message` object of assistant and user lines.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub content: RawMessageContent,
    #[serde(default)]
    pub usage: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content is either plain text or a list of blocks.
///
/// Blocks stay as JSON values here so one unknown block does not reject the
/// whole message; each is decoded into [`RawContentBlock`] on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl Default for RawMessageContent {
    fn default() -> Self {
        Self::Blocks(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum RawContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: RawToolResultContent,
        #[serde(default)]
        is_error: bool,
    },
    Thinking {},
    RedactedThinking {},
}

/// Tool result content: a string or a list of typed parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum RawToolResultContent {
    Text(String),
    Parts(Vec<RawResultPart>),
    Empty(Option<()>),
}

impl Default for RawToolResultContent {
    fn default() -> Self {
        Self::Empty(None)
    }
}

impl RawToolResultContent {
    /// Text parts joined by newlines; non-text parts are dropped.
    pub(super) fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .into_iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Empty(_) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RawResultPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

// ===== Usage =====

/// Usage payload shapes accepted at the stream boundary.
///
/// Anthropic-style reports may carry prompt cache counters, which are folded
/// into input tokens. OpenAI-style reports use prompt/completion names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UsagePayload {
    Anthropic {
        input_tokens: u64,
        #[serde(default)]
        output_tokens: u64,
        #[serde(default)]
        cache_creation_input_tokens: Option<u64>,
        #[serde(default)]
        cache_read_input_tokens: Option<u64>,
    },
    OpenAi {
        prompt_tokens: u64,
        #[serde(default)]
        completion_tokens: u64,
    },
}

impl UsagePayload {
    /// `(input_tokens, output_tokens)` with cache tokens counted as input.
    pub fn tokens(&self) -> (u64, u64) {
        match *self {
            Self::Anthropic {
                input_tokens,
                output_tokens,
                cache_creation_input_tokens,
                cache_read_input_tokens,
            } => (
                input_tokens
                    .saturating_add(cache_creation_input_tokens.unwrap_or(0))
                    .saturating_add(cache_read_input_tokens.unwrap_or(0)),
                output_tokens,
            ),
            Self::OpenAi {
                prompt_tokens,
                completion_tokens,
            } => (prompt_tokens, completion_tokens),
        }
    }
}

/// Keys whose presence marks an object as carrying flat usage counters.
pub(super) const FLAT_USAGE_KEYS: &[&str] = &[
    "input_tokens",
    "output_tokens",
    "prompt_tokens",
    "completion_tokens",
];

pub(super) fn has_flat_usage(map: &Map<String, Value>) -> bool {
    FLAT_USAGE_KEYS.iter().any(|key| map.contains_key(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anthropic_usage_adds_cache_tokens_to_input() {
        let payload: UsagePayload = serde_json::from_value(json!({
            "input_tokens": 100,
            "output_tokens": 20,
            "cache_creation_input_tokens": 30,
            "cache_read_input_tokens": 5
        }))
        .unwrap();
        assert_eq!(payload.tokens(), (135, 20));
    }

    #[test]
    fn anthropic_usage_tolerates_null_cache_fields() {
        let payload: UsagePayload = serde_json::from_value(json!({
            "input_tokens": 7,
            "output_tokens": 1,
            "cache_read_input_tokens": null
        }))
        .unwrap();
        assert_eq!(payload.tokens(), (7, 1));
    }

    #[test]
    fn huge_cache_counters_saturate() {
        let payload: UsagePayload = serde_json::from_value(json!({
            "input_tokens": u64::MAX,
            "output_tokens": 1,
            "cache_creation_input_tokens": 10,
            "cache_read_input_tokens": 10
        }))
        .unwrap();
        assert_eq!(payload.tokens(), (u64::MAX, 1));
    }

    #[test]
    fn openai_usage_names_are_accepted() {
        let payload: UsagePayload =
            serde_json::from_value(json!({"prompt_tokens": 12, "completion_tokens": 3})).unwrap();
        assert!(matches!(payload, UsagePayload::OpenAi { .. }));
        assert_eq!(payload.tokens(), (12, 3));
    }

    #[test]
    fn usage_without_known_keys_is_rejected() {
        let result = serde_json::from_value::<UsagePayload>(json!({"tokens": 5}));
        assert!(result.is_err());
    }

    #[test]
    fn tool_result_parts_join_text_only() {
        let content: RawToolResultContent = serde_json::from_value(json!([
            {"type": "text", "text": "line one"},
            {"type": "image", "source": {}},
            {"type": "text", "text": "line two"}
        ]))
        .unwrap();
        assert_eq!(content.into_text(), "line one\nline two");
    }

    #[test]
    fn tool_result_null_content_is_empty() {
        let content: RawToolResultContent = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(content.into_text(), "");
    }

    #[test]
    fn stream_message_keeps_unknown_keys() {
        let raw: RawStreamMessage = serde_json::from_value(json!({
            "type": "assistant",
            "input_tokens": 4,
            "uuid": "u-1"
        }))
        .unwrap();
        assert!(has_flat_usage(&raw.extra));
        assert_eq!(raw.extra["uuid"], "u-1");
    }
}
