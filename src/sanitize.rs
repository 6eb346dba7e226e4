//! Redaction and truncation of values before they are persisted or shown.
//!
//! Both operations are pure. Everything that reaches `timeline.jsonl`, a
//! session file, or the verbose display passes through [`redact`] first and,
//! for large payloads, [`truncate`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Default limit for tool results kept in session records.
pub const MAX_RESULT_CHARS: usize = 10_000;

/// Default limit for agent messages kept in the timeline.
pub const MAX_MESSAGE_CHARS: usize = 5_000;

/// Key patterns whose values are redacted, in precedence order.
pub const DEFAULT_PATTERNS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "AZURE_FOUNDRY_API_KEY",
    r"api[_-]?key",
    "token",
    "secret",
    "password",
    r"bearer\s+\w+",
];

static DEFAULT_POLICY: LazyLock<RedactionPolicy> = LazyLock::new(|| {
    RedactionPolicy::new(DEFAULT_PATTERNS.iter().copied()).expect("default patterns are valid")
});

/// Ordered, case-insensitive key patterns compiled into one matcher.
///
/// A string fragment `<key> [=:] <value>` becomes `<key>=[REDACTED]`; the
/// value runs up to the next whitespace, `,` or `}`. Alternatives are tried
/// in the order given, so earlier patterns win at the same position.
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    patterns: Vec<String>,
    matcher: Regex,
}

impl RedactionPolicy {
    /// Compile a policy from key patterns (regex syntax).
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let alternation = patterns
            .iter()
            .map(|p| format!("(?:{p})"))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&format!(r"(?i)(?P<key>{alternation})\s*[=:]\s*[^\s,}}]+"))?;
        Ok(Self { patterns, matcher })
    }

    /// Default policy extended with extra patterns (appended, lowest precedence).
    pub fn with_extra_patterns<I, S>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(extra.into_iter().map(Into::into));
        Self::new(patterns)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Redact a single string.
    pub fn redact_str(&self, text: &str) -> String {
        self.matcher
            .replace_all(text, format!("${{key}}={REDACTED}").as_str())
            .into_owned()
    }
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        DEFAULT_POLICY.clone()
    }
}

/// Recursively redact a JSON value.
///
/// Objects and arrays are walked, strings rewritten, everything else passes
/// through unchanged. Object keys are kept as-is. Idempotent.
pub fn redact(value: &Value, policy: &RedactionPolicy) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact(v, policy)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, policy)).collect()),
        Value::String(s) => Value::String(policy.redact_str(s)),
        other => other.clone(),
    }
}

/// A possibly shortened string with its original size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncated {
    pub content: String,
    pub truncated: bool,
    /// Length of the input in characters.
    pub original_size: usize,
}

/// Keep at most `max_chars` characters of `text`.
///
/// Lengths are counted in characters, so multi-byte text is never split.
/// When shortened, a marker stating how many characters were dropped is
/// appended to the kept prefix.
pub fn truncate(text: &str, max_chars: usize) -> Truncated {
    let original_size = text.chars().count();
    if original_size <= max_chars {
        return Truncated {
            content: text.to_string(),
            truncated: false,
            original_size,
        };
    }

    let kept: String = text.chars().take(max_chars).collect();
    Truncated {
        content: format!(
            "{kept}\n... [truncated {} chars]",
            original_size - max_chars
        ),
        truncated: true,
        original_size,
    }
}

/// Single-line preview: first `max_chars` characters plus `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
