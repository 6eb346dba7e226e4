//! Run recorder: one run directory, many sessions.

use super::clock::{elapsed_seconds, Clock};
use super::session::{RecorderOptions, SessionRecorder};
use super::store::RunStore;
use crate::model::{
    LongestSession, PersistenceError, RunId, RunMetadata, RunRecord, RunStatistics,
    SessionSummary, TokenAccountant,
};
use chrono::{DateTime, Local, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the run record and at most one live session.
///
/// Past sessions are kept only as sealed [`SessionSummary`] values.
#[derive(Debug)]
pub struct RunRecorder {
    run_id: RunId,
    metadata: RunMetadata,
    start_time: DateTime<Utc>,
    store: Arc<RunStore>,
    clock: Arc<dyn Clock>,
    options: RecorderOptions,
    current: Option<SessionRecorder>,
    sessions: Vec<SessionSummary>,
    tokens: TokenAccountant,
}

impl RunRecorder {
    /// Start a run now and create `<base_dir>/run_YYYYmmdd_HHMMSS/`.
    ///
    /// The run id uses local time, like the directory names people browse.
    pub fn create(
        base_dir: &Path,
        metadata: RunMetadata,
        clock: Arc<dyn Clock>,
        options: RecorderOptions,
    ) -> Result<Self, PersistenceError> {
        let start_time = clock.now();
        let run_id = RunId::from_start_time(&start_time.with_timezone(&Local));
        let store = RunStore::create(base_dir, &run_id)?;
        info!(run_id = %run_id, dir = %store.run_dir().display(), "Run started");
        Ok(Self::with_store(run_id, store, metadata, start_time, clock, options))
    }

    /// Start a run that keeps every record in memory and writes nothing.
    ///
    /// Each attempted write is counted as a persistence failure.
    pub fn detached(
        base_dir: &Path,
        metadata: RunMetadata,
        clock: Arc<dyn Clock>,
        options: RecorderOptions,
    ) -> Self {
        let start_time = clock.now();
        let run_id = RunId::from_start_time(&start_time.with_timezone(&Local));
        let store = RunStore::detached(base_dir, &run_id);
        warn!(run_id = %run_id, "Run started without a run directory");
        Self::with_store(run_id, store, metadata, start_time, clock, options)
    }

    fn with_store(
        run_id: RunId,
        store: RunStore,
        metadata: RunMetadata,
        start_time: DateTime<Utc>,
        clock: Arc<dyn Clock>,
        options: RecorderOptions,
    ) -> Self {
        Self {
            run_id,
            metadata,
            start_time,
            store: Arc::new(store),
            clock,
            options,
            current: None,
            sessions: Vec::new(),
            tokens: TokenAccountant::new(),
        }
    }

    /// Whether records reach the disk.
    pub fn is_detached(&self) -> bool {
        self.store.is_detached()
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        self.store.run_dir()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Sealed summaries of the sessions ended so far.
    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    /// Run-wide token totals of ended sessions.
    pub fn token_usage(&self) -> crate::model::TokenUsage {
        self.tokens.totals()
    }

    /// Begin session `session_number`, ending the current one first.
    pub fn start_session(&mut self, session_number: u32) -> &mut SessionRecorder {
        self.end_session();
        self.current.insert(SessionRecorder::start(
            session_number,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.options.clone(),
        ))
    }

    pub fn current_session(&mut self) -> Option<&mut SessionRecorder> {
        self.current.as_mut()
    }

    /// Finalize the current session and keep its summary.
    ///
    /// Returns `None` when no session is running.
    pub fn end_session(&mut self) -> Option<&SessionSummary> {
        let session = self.current.take()?;
        let record = session.finalize();
        self.tokens.absorb(record.token_usage);
        self.sessions.push(record.summarize());
        self.sessions.last()
    }

    /// End any current session, aggregate, and write `run_summary.json`.
    pub fn finalize(mut self) -> RunRecord {
        self.end_session();
        let end_time = self.clock.now();
        let duration_seconds = elapsed_seconds(self.start_time, end_time);

        // Ties keep the earliest session.
        let longest_session = self
            .sessions
            .iter()
            .fold(None::<&SessionSummary>, |best, s| match best {
                Some(b) if b.duration_minutes >= s.duration_minutes => Some(b),
                _ => Some(s),
            })
            .map(|s| LongestSession {
                session_number: s.session_number,
                duration_minutes: s.duration_minutes,
            });

        let token_usage = self.tokens.totals();
        let summary = RunStatistics {
            total_sessions: self.sessions.len(),
            total_tool_calls: self.sessions.iter().map(|s| s.tool_calls).sum(),
            total_errors: self.sessions.iter().map(|s| s.errors).sum(),
            total_security_blocks: self.sessions.iter().map(|s| s.security_blocks).sum(),
            total_tokens: token_usage.total(),
            token_usage,
            longest_session,
            persistence_failures: self.sessions.iter().map(|s| s.persistence_failures).sum(),
        };

        let mut record = RunRecord {
            run_id: self.run_id,
            metadata: self.metadata,
            start_time: self.start_time,
            end_time,
            duration_seconds,
            duration_minutes: duration_seconds / 60.0,
            sessions: self.sessions,
            summary,
        };

        match self.store.write_run_summary(&record) {
            Ok(path) => info!(
                run_id = %record.run_id,
                path = %path.display(),
                sessions = record.summary.total_sessions,
                "Run finalized"
            ),
            Err(e) => {
                record.summary.persistence_failures += 1;
                warn!(run_id = %record.run_id, error = %e, "Run summary write failed");
            }
        }
        record
    }
}
