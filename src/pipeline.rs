//! Event path.
//!
//! One thread reads the stream a line at a time and pushes every normalized
//! event through the consumers in order: tool batch aggregator, session
//! recorder, display feed. Session boundaries come from the runtime's `init`
//! and `result` messages; events before any `init` open a session
//! implicitly. This is the only module that knows both the recorder and the
//! display.

use crate::aggregator::{BatchSummary, EntryStatus, ToolBatchAggregator};
use crate::display::{DisplayFeed, DisplayLine, ToolLine, ToolLineState};
use crate::model::{DomainEvent, InputError, RunRecord, SessionSummary};
use crate::normalizer::{normalize_line, Normalized, StreamSignal};
use crate::progress::ProgressSource;
use crate::recorder::{Clock, RunRecorder};
use crate::display::lines::VERBOSE_ERROR_CHARS;
use crate::sanitize::{preview, redact, truncate, RedactionPolicy, MAX_MESSAGE_CHARS};
use crate::source::LineSource;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why the event path stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stream ended.
    EndOfStream,
    /// SIGINT seen at a session boundary.
    Interrupted,
    /// The configured number of sessions completed.
    MaxIterations,
    /// Every feature in the feature list passes.
    ProjectComplete,
    /// The source failed; what was recorded so far is kept.
    SourceFailed,
}

/// Result of [`Monitor::process`] for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop(StopReason),
}

/// Line and event counters for the end-of-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines: usize,
    pub events: usize,
    pub diagnostics: usize,
}

/// Everything the run produced.
#[derive(Debug)]
pub struct Outcome {
    pub record: RunRecord,
    pub stop: StopReason,
    pub stats: PipelineStats,
    pub source_error: Option<InputError>,
}

/// Wires the consumers together for one run.
pub struct Monitor {
    run: RunRecorder,
    aggregator: ToolBatchAggregator,
    feed: DisplayFeed,
    progress: Arc<dyn ProgressSource>,
    clock: Arc<dyn Clock>,
    policy: RedactionPolicy,
    max_message_chars: usize,
    max_iterations: Option<u32>,
    interrupt: Arc<AtomicBool>,
    sessions_started: u32,
    stats: PipelineStats,
}

impl Monitor {
    pub fn new(
        run: RunRecorder,
        feed: DisplayFeed,
        progress: Arc<dyn ProgressSource>,
        clock: Arc<dyn Clock>,
        policy: RedactionPolicy,
    ) -> Self {
        Self {
            aggregator: ToolBatchAggregator::new(policy.clone()),
            run,
            feed,
            progress,
            clock,
            policy,
            max_message_chars: MAX_MESSAGE_CHARS,
            max_iterations: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            sessions_started: 0,
            stats: PipelineStats::default(),
        }
    }

    /// Stop after this many completed sessions.
    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self.feed.update(|s| s.max_iterations = max_iterations);
        self
    }

    /// Cap on narrative text handed to the display.
    pub fn with_max_message_chars(mut self, max_message_chars: usize) -> Self {
        self.max_message_chars = max_message_chars;
        self
    }

    /// Checked at session boundaries.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn run_recorder(&self) -> &RunRecorder {
        &self.run
    }

    /// Normalize and apply one stream line.
    pub fn process(&mut self, line: &str) -> Flow {
        self.stats.lines += 1;
        let normalized = normalize_line(line);
        self.apply(normalized)
    }

    /// Apply an already normalized message.
    pub fn apply(&mut self, normalized: Normalized) -> Flow {
        for diagnostic in &normalized.diagnostics {
            self.stats.diagnostics += 1;
            warn!(line = self.stats.lines, %diagnostic, "Stream diagnostic");
            let text = self.policy.redact_str(&diagnostic.to_string());
            self.feed.print(DisplayLine::Diagnostic(preview(
                &text,
                VERBOSE_ERROR_CHARS,
            )));
        }

        if let Some(StreamSignal::SessionInit { session_id, model }) = &normalized.signal {
            if let Flow::Stop(reason) = self.on_session_init(session_id.as_deref(), model.as_deref())
            {
                return Flow::Stop(reason);
            }
        }

        for event in &normalized.events {
            self.on_event(event);
        }

        match normalized.signal {
            Some(StreamSignal::SessionResult {
                is_error,
                num_turns,
                total_cost_usd,
                ..
            }) => {
                debug!(?num_turns, ?total_cost_usd, "Session result");
                self.on_session_end(is_error)
            }
            _ => Flow::Continue,
        }
    }

    /// End any open session, write the run summary and say goodbye.
    pub fn finish(mut self, stop: StopReason) -> RunRecord {
        if self.run.current_session().is_some() {
            self.close_session(false);
        }
        self.feed.update(|s| {
            s.status = "Finished".to_string();
            s.batch.clear();
        });

        let logs = if self.run.is_detached() {
            "Logs not written".to_string()
        } else {
            format!("Logs in {}", self.run.run_dir().display())
        };
        let record = self.run.finalize();
        info!(
            ?stop,
            lines = self.stats.lines,
            events = self.stats.events,
            diagnostics = self.stats.diagnostics,
            "Event path finished"
        );
        self.feed.phase(format!(
            "Run {} complete: {} session(s), {} tool call(s), {} tokens. {logs}",
            record.run_id,
            record.summary.total_sessions,
            record.summary.total_tool_calls,
            crate::display::format_tokens(record.summary.total_tokens),
        ));
        record
    }

    // ===== Session boundaries =====

    fn on_session_init(&mut self, session_id: Option<&str>, model: Option<&str>) -> Flow {
        if self.run.current_session().is_some() {
            self.close_session(false);
        }
        if let Some(reason) = self.boundary_stop() {
            return Flow::Stop(reason);
        }
        debug!(?session_id, ?model, "Runtime session init");
        self.open_session();
        Flow::Continue
    }

    fn on_session_end(&mut self, is_error: bool) -> Flow {
        if self.run.current_session().is_none() {
            // A result with nothing before it still counts as a session.
            self.open_session();
        }
        let (passing, total) = self.close_session(is_error);

        if total > 0 && passing == total {
            self.feed
                .phase(format!("Project complete: all {total} features passing"));
            return Flow::Stop(StopReason::ProjectComplete);
        }
        match self.boundary_stop() {
            Some(reason) => Flow::Stop(reason),
            None => Flow::Continue,
        }
    }

    fn boundary_stop(&self) -> Option<StopReason> {
        if self.interrupt.load(Ordering::SeqCst) {
            info!("Interrupt seen at session boundary");
            return Some(StopReason::Interrupted);
        }
        match self.max_iterations {
            Some(max) if self.sessions_started >= max => {
                self.feed.phase(format!("Reached max iterations ({max})"));
                Some(StopReason::MaxIterations)
            }
            _ => None,
        }
    }

    fn open_session(&mut self) -> u32 {
        self.sessions_started += 1;
        let session_number = self.sessions_started;
        let started = self.run.start_session(session_number).start_time();

        let kind = if session_number == 1 {
            "initializer"
        } else {
            "coding agent"
        };
        self.feed.update(|s| {
            s.status = "Running".to_string();
            s.iteration = session_number;
            s.session_started = Some(started);
            s.batch.clear();
            s.last_thought = None;
        });
        self.feed
            .phase(format!("Session {session_number} started ({kind})"));
        session_number
    }

    /// Flush the batch, snapshot progress and seal the session.
    fn close_session(&mut self, is_error: bool) -> (u32, u32) {
        let now = self.clock.now();
        if let Some(summary) = self.aggregator.finish(now) {
            self.print_summary(&summary);
        }

        let (passing, total) = self.progress.lookup();
        if let Some(session) = self.run.current_session() {
            session.snapshot_progress(passing, total);
        }

        if let Some(summary) = self.run.end_session() {
            let line = session_line(summary, passing, total);
            if is_error {
                self.feed
                    .error(format!("Session {} ended with an error", summary.session_number));
            }
            self.feed.phase(line);
        }

        let tokens = self.run.token_usage();
        self.feed.update(|s| {
            s.status = if is_error { "Session error" } else { "Waiting" }.to_string();
            s.token_usage = tokens;
            s.batch.clear();
        });
        (passing, total)
    }

    // ===== Events =====

    fn on_event(&mut self, event: &DomainEvent) {
        self.stats.events += 1;
        if self.run.current_session().is_none() {
            self.open_session();
        }
        let now = self.clock.now();

        if let Some(summary) = self.aggregator.on_event(event, now) {
            self.print_summary(&summary);
        }

        let Some(session) = self.run.current_session() else {
            return;
        };
        session.record(event);
        let session_tokens = session.token_usage();
        let run_tokens = self.run.token_usage();

        match event {
            DomainEvent::TextDelta { text } if event.is_substantive_text() => {
                let redacted = self.policy.redact_str(text);
                self.feed
                    .thought(&truncate(&redacted, self.max_message_chars).content);
                self.feed.update(|s| s.status = "Thinking".to_string());
            }
            DomainEvent::TextDelta { .. } => {}
            DomainEvent::ToolInvocation {
                tool_name, input, ..
            } => {
                self.feed
                    .print(DisplayLine::tool_start(tool_name, &redact(input, &self.policy)));
                let status = format!("Running {tool_name}");
                self.feed.update(|s| {
                    s.tools_called += 1;
                    s.status = status;
                });
            }
            DomainEvent::ToolResult {
                content,
                is_error,
                security_blocked,
                ..
            } => {
                self.feed.print(DisplayLine::tool_result(
                    &self.policy.redact_str(content),
                    *is_error,
                    *security_blocked,
                ));
                self.feed.update(|s| s.status = "Working".to_string());
            }
            DomainEvent::UsageReport {
                input_tokens,
                output_tokens,
            } => {
                self.feed.print(DisplayLine::Usage {
                    input_tokens: *input_tokens,
                    output_tokens: *output_tokens,
                });
                let mut total = run_tokens;
                total += session_tokens;
                self.feed.update(|s| s.token_usage = total);
            }
        }

        let batch = self.batch_lines();
        self.feed.update(|s| s.batch = batch);
    }

    fn batch_lines(&self) -> Vec<ToolLine> {
        self.aggregator
            .current_batch()
            .map(|batch| {
                batch
                    .entries()
                    .iter()
                    .map(|entry| ToolLine {
                        tool_name: entry.tool_name.clone(),
                        details: entry.details.clone(),
                        state: match entry.status {
                            EntryStatus::Pending => ToolLineState::Running,
                            EntryStatus::Success => ToolLineState::Done,
                            EntryStatus::Error => ToolLineState::Failed,
                            EntryStatus::Blocked => ToolLineState::Blocked,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn print_summary(&self, summary: &BatchSummary) {
        self.feed.print(DisplayLine::BatchSummary {
            tools: summary.to_string(),
            total: summary.total,
            errors: summary.errors,
            blocked: summary.blocked,
            elapsed: summary.elapsed,
        });
    }
}

fn session_line(summary: &SessionSummary, passing: u32, total: u32) -> String {
    let mut line = format!(
        "Session {} finished in {:.1} min: {} tool call(s), {} error(s), {} blocked",
        summary.session_number,
        summary.duration_minutes,
        summary.tool_calls,
        summary.errors,
        summary.security_blocks
    );
    if total > 0 {
        line.push_str(&format!(
            ", {passing}/{total} features passing ({:.1}%)",
            f64::from(passing) / f64::from(total) * 100.0
        ));
    }
    line
}

/// Read `source` to the end (or a stop condition) and finalize the run.
///
/// A failing source ends the run early; the session and run are still
/// finalized and the error is handed back in the outcome.
pub fn drive<S: LineSource + ?Sized>(source: &mut S, mut monitor: Monitor) -> Outcome {
    let mut source_error = None;
    let stop = loop {
        match source.next_line() {
            Ok(Some(line)) => {
                if let Flow::Stop(reason) = monitor.process(&line) {
                    break reason;
                }
            }
            Ok(None) => break StopReason::EndOfStream,
            Err(e) => {
                error!(line = source.line_number(), error = %e, "Input stream failed");
                monitor.feed.error(format!("Input stream failed: {e}"));
                source_error = Some(e);
                break StopReason::SourceFailed;
            }
        }
    };

    let stats = monitor.stats();
    let record = monitor.finish(stop);
    Outcome {
        record,
        stop,
        stats,
        source_error,
    }
}

/// Route SIGINT into a flag checked at session boundaries.
///
/// A second SIGINT while the flag is already set exits the process with
/// status 130.
pub fn install_interrupt_handler() -> io::Result<Arc<AtomicBool>> {
    use signal_hook::consts::SIGINT;
    use signal_hook::flag;

    let interrupted = Arc::new(AtomicBool::new(false));
    // Order matters: the conditional exit must see the flag before it is set.
    flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&interrupted))?;
    flag::register(SIGINT, Arc::clone(&interrupted))?;
    Ok(interrupted)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
