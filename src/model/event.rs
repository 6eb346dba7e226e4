//! Normalized domain events.
//!
//! Every raw stream message is reduced to zero or more [`DomainEvent`]s by the
//! normalizer. Events are immutable once built, and every consumer sees them
//! in stream arrival order.

use crate::model::{ToolName, ToolUseId};

/// A normalized, stream-ordered unit of observation.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Assistant narrative text.
    TextDelta {
        text: String,
    },
    /// The assistant invoked a tool.
    ToolInvocation {
        tool_name: ToolName,
        tool_use_id: Option<ToolUseId>,
        /// Raw tool input; redacted by consumers before persisting or display.
        input: serde_json::Value,
    },
    /// A tool returned.
    ToolResult {
        tool_use_id: Option<ToolUseId>,
        content: String,
        is_error: bool,
        /// The security layer refused to run the tool.
        ///
        /// Distinct from `is_error`: a blocked call is a successfully
        /// classified outcome, not a generic failure.
        security_blocked: bool,
    },
    /// Incremental token usage.
    UsageReport {
        input_tokens: u64,
        output_tokens: u64,
    },
}

impl DomainEvent {
    /// Short kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TextDelta { .. } => "text_delta",
            DomainEvent::ToolInvocation { .. } => "tool_invocation",
            DomainEvent::ToolResult { .. } => "tool_result",
            DomainEvent::UsageReport { .. } => "usage_report",
        }
    }

    /// Text deltas that only contain whitespace do not count as narrative.
    pub fn is_substantive_text(&self) -> bool {
        matches!(self, DomainEvent::TextDelta { text } if !text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        let text = DomainEvent::TextDelta { text: "hi".into() };
        let usage = DomainEvent::UsageReport {
            input_tokens: 1,
            output_tokens: 1,
        };
        assert_eq!(text.kind(), "text_delta");
        assert_eq!(usage.kind(), "usage_report");
    }

    #[test]
    fn blank_text_is_not_substantive() {
        assert!(!DomainEvent::TextDelta { text: "  \n".into() }.is_substantive_text());
        assert!(DomainEvent::TextDelta { text: "x".into() }.is_substantive_text());
    }
}
