//! Plain-text reports for the `analyze` command.

use super::{file_name, RunComparison, SessionAnalysis};
use crate::display::format_tokens;
use crate::model::{SessionRecord, TimelineEvent, TimelineEventType};
use crate::sanitize::preview;
use std::fmt::Write;
use unicode_width::UnicodeWidthStr;

/// Sessions longer than this are called out in a run comparison.
const LONG_SESSION_MINUTES: f64 = 60.0;
const REPEATED_FILES_SHOWN: usize = 15;
const GAPS_SHOWN: usize = 10;
const ERRORS_SHOWN: usize = 10;
const ERROR_PREVIEW_CHARS: usize = 80;
const SLOW_INPUT_CHARS: usize = 60;
const MESSAGE_PREVIEW_CHARS: usize = 60;

// ===== Tables =====

#[derive(Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Column-aligned text table; widths count terminal cells.
struct TextTable {
    columns: Vec<(&'static str, Align)>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    fn new(columns: &[(&'static str, Align)]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn render(&self, out: &mut String) {
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (title, _))| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.width())
                    .chain(std::iter::once(title.width()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self.columns.iter().map(|(t, _)| t.to_string()).collect();
        self.render_row(out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
        self.render_row(out, &rule, &widths);
        for row in &self.rows {
            self.render_row(out, row, &widths);
        }
    }

    fn render_row(&self, out: &mut String, cells: &[String], widths: &[usize]) {
        let mut line = String::new();
        for (i, ((_, align), width)) in self.columns.iter().zip(widths).enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let pad = " ".repeat(width.saturating_sub(cell.width()));
            match align {
                Align::Left => {
                    line.push_str(cell);
                    line.push_str(&pad);
                }
                Align::Right => {
                    line.push_str(&pad);
                    line.push_str(cell);
                }
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

// ===== Session =====

/// Full report for one session file.
pub fn session_report(name: &str, session: &SessionRecord, analysis: &SessionAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analyzing Session: {name}\n");

    let mut overview = TextTable::new(&[("Metric", Align::Left), ("Value", Align::Left)]);
    let tokens = analysis.token_usage;
    for (metric, value) in [
        ("Session Number", analysis.session_number.to_string()),
        ("Duration", format!("{:.1} minutes", analysis.duration_minutes)),
        ("Tool Calls", analysis.total_tool_calls.to_string()),
        ("Errors", analysis.total_errors.to_string()),
        ("Security Blocks", analysis.total_security_blocks.to_string()),
        ("Input Tokens", format_tokens(tokens.input_tokens)),
        ("Output Tokens", format_tokens(tokens.output_tokens)),
        ("Total Tokens", format_tokens(tokens.total())),
    ] {
        overview.row(vec![metric.to_string(), value]);
    }
    overview.render(&mut out);

    if !analysis.slowest_calls.is_empty() {
        let _ = writeln!(out, "\nSlowest Tool Calls\n");
        let mut table = TextTable::new(&[
            ("Tool", Align::Left),
            ("Duration", Align::Right),
            ("Input Preview", Align::Left),
        ]);
        for call in &analysis.slowest_calls {
            table.row(vec![
                call.tool_name.to_string(),
                format!("{:.1}m", call.duration_seconds / 60.0),
                preview(&call.input_preview, SLOW_INPUT_CHARS),
            ]);
        }
        table.render(&mut out);
    }

    if !analysis.most_used_tools.is_empty() {
        let _ = writeln!(out, "\nMost Used Tools\n");
        let mut table = TextTable::new(&[("Tool", Align::Left), ("Count", Align::Right)]);
        for (tool, count) in &analysis.most_used_tools {
            table.row(vec![tool.to_string(), count.to_string()]);
        }
        table.render(&mut out);
    }

    if !analysis.repeated_files.is_empty() {
        let _ = writeln!(out, "\nRepeated File Operations\n");
        let mut table = TextTable::new(&[
            ("File", Align::Left),
            ("Operations", Align::Right),
            ("Tools Used", Align::Left),
        ]);
        for file in analysis.repeated_files.iter().take(REPEATED_FILES_SHOWN) {
            let tools: Vec<String> = file
                .tools
                .iter()
                .map(|(tool, count)| format!("{tool}({count})"))
                .collect();
            table.row(vec![
                file_name(&file.path),
                file.operations.to_string(),
                tools.join(", "),
            ]);
        }
        table.render(&mut out);
    }

    if !analysis.long_gaps.is_empty() {
        let _ = writeln!(out, "\nLong Gaps Between Tool Calls\n");
        let mut gaps: Vec<_> = analysis.long_gaps.iter().collect();
        gaps.sort_by(|a, b| b.gap_seconds.total_cmp(&a.gap_seconds));
        let mut table = TextTable::new(&[
            ("After Tool", Align::Left),
            ("Before Tool", Align::Left),
            ("Gap", Align::Right),
        ]);
        for gap in gaps.into_iter().take(GAPS_SHOWN) {
            table.row(vec![
                gap.after_tool.to_string(),
                gap.before_tool.to_string(),
                format!("{:.1}m", gap.gap_seconds / 60.0),
            ]);
        }
        table.render(&mut out);
    }

    if !analysis.stuck_indicators.is_empty() {
        let _ = writeln!(out, "\nPotential Issues\n");
        for indicator in &analysis.stuck_indicators {
            let _ = writeln!(out, "  • {indicator}");
        }
    }

    if !session.errors.is_empty() {
        let _ = writeln!(out, "\nErrors\n");
        let mut table = TextTable::new(&[("Tool", Align::Left), ("Error Preview", Align::Left)]);
        for error in session.errors.iter().take(ERRORS_SHOWN) {
            table.row(vec![
                error.tool_name.to_string(),
                preview(&error.error.content.replace('\n', " "), ERROR_PREVIEW_CHARS),
            ]);
        }
        table.render(&mut out);
    }

    if let Some(progress) = session.progress {
        let _ = writeln!(
            out,
            "\nTests: {}/{} ({:.1}%)",
            progress.passing_tests, progress.total_tests, progress.percentage
        );
    }

    out
}

// ===== Run =====

/// Side-by-side table of every session in a run.
pub fn comparison_report(comparison: &RunComparison) -> String {
    let mut out = String::new();
    let dir_name = comparison
        .run_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| comparison.run_dir.display().to_string());
    let _ = writeln!(out, "Run Comparison: {dir_name}\n");

    if let Some(summary) = &comparison.summary {
        let _ = writeln!(out, "Run ID: {}", summary.run_id);
        let _ = writeln!(
            out,
            "Model: {}",
            summary.metadata.model.as_deref().unwrap_or("unknown")
        );
        let _ = writeln!(
            out,
            "Total Duration: {:.1} minutes\n",
            summary.duration_minutes
        );
    }

    let mut table = TextTable::new(&[
        ("Session", Align::Right),
        ("Duration", Align::Right),
        ("Tools", Align::Right),
        ("Errors", Align::Right),
        ("Tokens", Align::Right),
        ("Progress", Align::Left),
    ]);
    for row in &comparison.rows {
        table.row(vec![
            row.session_number.to_string(),
            format!("{:.1}m", row.duration_minutes),
            row.tool_calls.to_string(),
            row.errors.to_string(),
            format_tokens(row.tokens),
            row.progress
                .map(|(passing, total)| format!("{passing}/{total}"))
                .unwrap_or_else(|| "N/A".to_string()),
        ]);
    }
    table.render(&mut out);

    if let Some(longest) = comparison
        .longest()
        .filter(|row| row.duration_minutes > LONG_SESSION_MINUTES)
    {
        let _ = writeln!(
            out,
            "\nLongest session: Session {} ({:.1} minutes)\n  Analyze with: agent-watch analyze {}",
            longest.session_number,
            longest.duration_minutes,
            longest.path.display()
        );
    }

    out
}

// ===== Timeline =====

/// One line per event, at most `limit` events.
pub fn timeline_report<'a>(
    events: impl IntoIterator<Item = &'a TimelineEvent>,
    limit: usize,
) -> String {
    let events: Vec<&TimelineEvent> = events.into_iter().collect();
    let total = events.len();
    let mut out = String::from("Event Timeline\n\n");
    for event in events.into_iter().take(limit) {
        let _ = write!(
            out,
            "{} [{}]",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type.as_str()
        );
        if let Some(detail) = event_detail(event) {
            let _ = write!(out, " {detail}");
        }
        out.push('\n');
    }
    if total > limit {
        let _ = writeln!(out, "\n... and {} more events", total - limit);
    }
    out
}

fn event_detail(event: &TimelineEvent) -> Option<String> {
    let data = &event.data;
    let text = |key: &str| data.get(key).and_then(|v| v.as_str()).map(str::to_string);
    match event.event_type {
        TimelineEventType::ToolStart => text("tool_name"),
        TimelineEventType::ToolEnd => {
            let tool = text("tool_name")?;
            let duration = data.get("duration_seconds").and_then(|v| v.as_f64())?;
            let status = text("status").unwrap_or_default();
            Some(format!("{tool} {duration:.1}s {status}").trim_end().to_string())
        }
        TimelineEventType::AgentMessage => data
            .pointer("/text/content")
            .and_then(|v| v.as_str())
            .map(|t| preview(&t.replace('\n', " "), MESSAGE_PREVIEW_CHARS)),
        TimelineEventType::SecurityBlock => text("tool_name"),
        TimelineEventType::TokenUsage => {
            let total = data.get("cumulative_total").and_then(|v| v.as_u64())?;
            Some(format!("{} total", format_tokens(total)))
        }
        TimelineEventType::Progress => {
            let passing = data.get("passing_tests").and_then(|v| v.as_u64())?;
            let total = data.get("total_tests").and_then(|v| v.as_u64())?;
            Some(format!("{passing}/{total}"))
        }
        TimelineEventType::Anomaly => text("kind"),
    }
}
