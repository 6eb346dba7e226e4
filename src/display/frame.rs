//! Live status frame.
//!
//! [`render_frame`] is pure: it turns a [`LiveSnapshot`] plus the current
//! time and test progress into pre-formatted lines. The widget impl only
//! lays those lines out.

use super::lines::condense_thought;
use super::snapshot::LiveSnapshot;
use crate::sanitize::preview;
use chrono::{DateTime, Utc};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Widget};

/// Rows taken by the frame, borders included.
pub const FRAME_HEIGHT: u16 = 7;

/// Cells in the progress bar.
pub const PROGRESS_BAR_WIDTH: usize = 50;

/// Most recent batch entries shown on the tools row.
const BATCH_ENTRIES_SHOWN: usize = 4;
const DETAILS_CHARS: usize = 40;
const THOUGHT_CHARS: usize = 90;

/// One paint of the live frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveFrame {
    pub status_line: String,
    pub usage_line: String,
    pub tools_line: String,
    pub thought_line: String,
    pub progress_line: String,
    /// Whether the status reads as a failure.
    pub failed: bool,
}

impl LiveFrame {
    pub fn lines(&self) -> [&str; 5] {
        [
            &self.status_line,
            &self.usage_line,
            &self.tools_line,
            &self.thought_line,
            &self.progress_line,
        ]
    }
}

/// Build the frame for `snapshot` as of `now`.
pub fn render_frame(
    snapshot: &LiveSnapshot,
    now: DateTime<Utc>,
    (passing, total): (u32, u32),
) -> LiveFrame {
    let elapsed = snapshot
        .session_started
        .map(|start| (now - start).num_seconds().max(0) as u64)
        .unwrap_or(0);
    let iteration = match snapshot.max_iterations {
        Some(max) => format!("{}/{max}", snapshot.iteration),
        None => snapshot.iteration.to_string(),
    };

    let tools_line = if snapshot.batch.is_empty() {
        "Tools: idle".to_string()
    } else {
        let skip = snapshot.batch.len().saturating_sub(BATCH_ENTRIES_SHOWN);
        let shown: Vec<String> = snapshot.batch[skip..]
            .iter()
            .map(|tool| match &tool.details {
                Some(details) => format!(
                    "{} {} {}",
                    tool.state.icon(),
                    tool.tool_name,
                    preview(details, DETAILS_CHARS)
                ),
                None => format!("{} {}", tool.state.icon(), tool.tool_name),
            })
            .collect();
        let prefix = if skip > 0 { format!("+{skip} … ") } else { String::new() };
        format!("Tools: {prefix}{}", shown.join("  "))
    };

    let thought_line = match &snapshot.last_thought {
        Some(text) => format!("Thought: {}", preview(&condense_thought(text), THOUGHT_CHARS)),
        None => "Thought: -".to_string(),
    };

    let progress_line = if total == 0 {
        "Progress: no feature list yet".to_string()
    } else {
        format!(
            "Progress: [{}] {passing}/{total} ({:.1}%)",
            progress_bar(passing, total),
            f64::from(passing) / f64::from(total) * 100.0
        )
    };

    LiveFrame {
        status_line: format!(
            "Status: {} │ Elapsed: {} │ Iteration: {iteration}",
            snapshot.status,
            format_elapsed(elapsed)
        ),
        usage_line: format!(
            "Tokens: {} │ Tools Called: {}",
            format_tokens(snapshot.token_usage.total()),
            snapshot.tools_called
        ),
        tools_line,
        thought_line,
        progress_line,
        failed: snapshot.status.to_ascii_lowercase().contains("error"),
    }
}

impl Widget for &LiveFrame {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let status_style = if self.failed {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        };
        let lines = vec![
            Line::from(Span::styled(self.status_line.clone(), status_style)),
            Line::from(self.usage_line.clone()),
            Line::from(Span::styled(
                self.tools_line.clone(),
                Style::default().fg(Color::Yellow),
            )),
            Line::from(Span::styled(
                self.thought_line.clone(),
                Style::default().fg(Color::Magenta),
            )),
            Line::from(Span::styled(
                self.progress_line.clone(),
                Style::default().fg(Color::Green),
            )),
        ];
        Paragraph::new(lines)
            .block(Block::bordered().title(" agent-watch "))
            .render(area, buf);
    }
}

/// Elapsed seconds as `MM:SS`; minutes keep counting past an hour.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format a token count with thousands separators.
///
/// Examples:
/// - `format_tokens(0)` → "0"
/// - `format_tokens(1234)` → "1,234"
/// - `format_tokens(1234567)` → "1,234,567"
pub fn format_tokens(tokens: u64) -> String {
    let s = tokens.to_string();
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(chars.len() + chars.len() / 3);

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Fixed-width bar of `█` (passing) and `░` (remaining).
pub fn progress_bar(passing: u32, total: u32) -> String {
    let filled = if total == 0 {
        0
    } else {
        (u64::from(passing.min(total)) * PROGRESS_BAR_WIDTH as u64 / u64::from(total)) as usize
    };
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}
