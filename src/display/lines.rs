//! Printable lines, gated by verbosity.

use super::{format_tokens, Verbosity};
use crate::model::ToolName;
use crate::sanitize::preview;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use std::time::Duration;

/// Tool input shown in verbose mode.
pub const VERBOSE_INPUT_CHARS: usize = 200;
/// Tool output shown in verbose mode.
pub const VERBOSE_OUTPUT_CHARS: usize = 300;
/// Tool error text shown in verbose mode.
pub const VERBOSE_ERROR_CHARS: usize = 500;

/// Thoughts longer than this are cut to their first sentence in normal mode.
const LONG_THOUGHT_CHARS: usize = 100;
const CONDENSED_THOUGHT_CHARS: usize = 150;

/// One line printed above (or instead of) the live frame.
///
/// All text is redacted before a line is built.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayLine {
    /// Session and run lifecycle.
    Phase(String),
    /// Failures of the watcher itself.
    Error(String),
    /// Agent narrative.
    Thought(String),
    /// A closed tool batch.
    BatchSummary {
        tools: String,
        total: usize,
        errors: usize,
        blocked: usize,
        elapsed: Duration,
    },
    ToolStart {
        tool_name: ToolName,
        input: String,
    },
    ToolDone {
        output: String,
    },
    ToolFailed {
        message: String,
    },
    ToolBlocked {
        message: String,
    },
    /// One token usage report.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
    /// A stream line the normalizer could not fully use.
    Diagnostic(String),
}

impl DisplayLine {
    /// Verbose tool start line with the input cut to 200 characters.
    pub fn tool_start(tool_name: &ToolName, redacted_input: &serde_json::Value) -> Self {
        Self::ToolStart {
            tool_name: tool_name.clone(),
            input: preview(&redacted_input.to_string(), VERBOSE_INPUT_CHARS),
        }
    }

    /// Verbose tool result line.
    pub fn tool_result(redacted_content: &str, is_error: bool, security_blocked: bool) -> Self {
        if security_blocked {
            Self::ToolBlocked {
                message: preview(redacted_content, VERBOSE_ERROR_CHARS),
            }
        } else if is_error {
            Self::ToolFailed {
                message: preview(redacted_content, VERBOSE_ERROR_CHARS),
            }
        } else {
            Self::ToolDone {
                output: preview(redacted_content, VERBOSE_OUTPUT_CHARS),
            }
        }
    }

    /// Whether the line prints at `verbosity`.
    pub fn visible_at(&self, verbosity: Verbosity) -> bool {
        match self {
            DisplayLine::Phase(_) | DisplayLine::Error(_) => true,
            DisplayLine::Thought(_) => verbosity != Verbosity::Quiet,
            DisplayLine::BatchSummary { .. } => verbosity == Verbosity::Normal,
            DisplayLine::ToolStart { .. }
            | DisplayLine::ToolDone { .. }
            | DisplayLine::ToolFailed { .. }
            | DisplayLine::ToolBlocked { .. }
            | DisplayLine::Usage { .. }
            | DisplayLine::Diagnostic(_) => verbosity == Verbosity::Verbose,
        }
    }

    /// Styled rendering for the inline terminal.
    pub fn to_line(&self) -> Line<'static> {
        let dim = Style::default().add_modifier(Modifier::DIM);
        match self {
            DisplayLine::Phase(text) => Line::from(vec![Span::styled(
                format!("▶ {text}"),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )]),
            DisplayLine::Error(text) => Line::from(vec![Span::styled(
                format!("✗ {text}"),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )]),
            DisplayLine::Thought(text) => Line::from(vec![Span::styled(
                format!("💭 {text}"),
                Style::default().fg(Color::Magenta),
            )]),
            DisplayLine::BatchSummary { errors, blocked, .. } => {
                let color = if *errors + *blocked > 0 {
                    Color::Yellow
                } else {
                    Color::Green
                };
                Line::from(vec![Span::styled(self.to_plain(), Style::default().fg(color))])
            }
            DisplayLine::ToolStart { tool_name, input } => Line::from(vec![
                Span::styled("🔧 Tool: ", Style::default().fg(Color::Cyan)),
                Span::styled(tool_name.to_string(), Style::default().fg(Color::Yellow)),
                Span::styled(format!("  Input: {input}"), dim),
            ]),
            DisplayLine::ToolDone { .. } => Line::from(vec![
                Span::styled("   ✓ Done", Style::default().fg(Color::Green)),
                Span::styled(self.to_plain().trim_start_matches("   ✓ Done").to_string(), dim),
            ]),
            DisplayLine::ToolFailed { message } => Line::from(vec![
                Span::styled("   ✗ Error: ", Style::default().fg(Color::Red)),
                Span::styled(message.clone(), dim),
            ]),
            DisplayLine::ToolBlocked { message } => Line::from(vec![
                Span::styled(
                    "   🚫 BLOCKED ",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ),
                Span::styled(message.clone(), dim),
            ]),
            DisplayLine::Usage { .. } => Line::from(vec![Span::styled(self.to_plain(), dim)]),
            DisplayLine::Diagnostic(_) => Line::from(vec![Span::styled(
                self.to_plain(),
                Style::default().fg(Color::Yellow),
            )]),
        }
    }

    /// Unstyled rendering for plain output.
    pub fn to_plain(&self) -> String {
        match self {
            DisplayLine::Phase(text) => format!("▶ {text}"),
            DisplayLine::Error(text) => format!("✗ {text}"),
            DisplayLine::Thought(text) => format!("💭 {text}"),
            DisplayLine::BatchSummary {
                tools,
                total,
                errors,
                blocked,
                elapsed,
            } => {
                let noun = if *total == 1 { "tool" } else { "tools" };
                let mut out = format!(
                    "  ✓ {total} {noun}: {tools} ({:.1}s)",
                    elapsed.as_secs_f64()
                );
                if *errors > 0 {
                    out.push_str(&format!(", {errors} failed"));
                }
                if *blocked > 0 {
                    out.push_str(&format!(", {blocked} blocked"));
                }
                out
            }
            DisplayLine::ToolStart { tool_name, input } => {
                format!("🔧 Tool: {tool_name}  Input: {input}")
            }
            DisplayLine::ToolDone { output } if output.is_empty() => "   ✓ Done".to_string(),
            DisplayLine::ToolDone { output } => format!("   ✓ Done: {output}"),
            DisplayLine::ToolFailed { message } => format!("   ✗ Error: {message}"),
            DisplayLine::ToolBlocked { message } => format!("   🚫 BLOCKED {message}"),
            DisplayLine::Usage {
                input_tokens,
                output_tokens,
            } => format!(
                "   📊 Tokens: +{}↑ +{}↓",
                format_tokens(*input_tokens),
                format_tokens(*output_tokens)
            ),
            DisplayLine::Diagnostic(text) => format!("⚠ {text}"),
        }
    }
}

/// Normal-mode thought: long text is cut to its first sentence.
pub fn condense_thought(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= LONG_THOUGHT_CHARS {
        return text.to_string();
    }
    let first_sentence = text.split('.').next().unwrap_or(text);
    format!("{first_sentence}...")
        .chars()
        .take(CONDENSED_THOUGHT_CHARS)
        .collect()
}
