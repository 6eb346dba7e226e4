//! Error types for agent-watch.
//!
//! This module defines the error taxonomy using `thiserror`. Errors compose via
//! `?` and `From` conversions into [`AppError`].
//!
//! # Error Hierarchy
//!
//! - [`AppError`] - Top-level application error
//!   - [`InputError`] - Stream source failures (file not found, no input, IO)
//!   - [`PersistenceError`] - Run directory writes (timeline, session, run summary)
//!   - `std::io::Error` - Terminal failures
//! - [`NormalizeError`] - Diagnostics produced while classifying stream messages
//! - [`ToolAnomaly`] - Tool protocol violations recorded on the session
//!
//! # Recovery Strategy
//!
//! Only input errors are fatal, and only to the stream: the pipeline still
//! finalizes the current session and the run before returning them.
//! Normalizer diagnostics, tool anomalies and persistence failures are logged
//! and processing continues with the in-memory state intact.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to read the agent message stream.
    #[error("Failed to read input: {0}")]
    InputRead(#[from] InputError),

    /// Failed to set up the run directory.
    ///
    /// Later write failures are non-fatal; only the initial directory
    /// creation aborts the run.
    #[error("Failed to persist run logs: {0}")]
    Persistence(#[from] PersistenceError),

    /// Terminal error from the display layer.
    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Errors encountered when reading the message stream.
#[derive(Debug, Error)]
pub enum InputError {
    /// The stream file does not exist.
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use agent_watch::model::error::InputError;
    ///
    /// let err = InputError::FileNotFound { path: PathBuf::from("/tmp/missing.jsonl") };
    /// assert!(err.to_string().contains("/tmp/missing.jsonl"));
    /// ```
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
    },

    /// No file path given and stdin is an interactive terminal.
    #[error("No input source: provide a file path or pipe the agent stream to stdin")]
    NoInput,

    /// Generic I/O error while reading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic produced by the event normalizer.
///
/// These are never raised to callers; the normalizer returns them alongside
/// whatever events it could still extract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Unknown message type, unknown content block, or invalid JSON.
    #[error("Malformed stream message: {reason}")]
    MalformedEvent {
        /// What was wrong with the message.
        reason: String,
    },

    /// A usage payload was present but had an unexpected shape.
    #[error("Could not extract token usage: {reason}")]
    UsageExtraction {
        /// Deserialization failure detail.
        reason: String,
    },
}

impl NormalizeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }
}

/// Tool protocol violation observed by the session recorder.
///
/// Recorded on the session (never dropped) and logged as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolAnomaly {
    /// A tool invocation arrived while another call was still open.
    #[error("{previous_tool} was still open when {next_tool} started")]
    Superseded {
        /// Tool whose call was sealed without a result.
        previous_tool: String,
        /// Tool whose invocation caused the seal.
        next_tool: String,
    },

    /// A tool result arrived with no matching open call.
    #[error("tool result {} has no matching invocation", .tool_use_id.as_deref().unwrap_or("<no id>"))]
    Orphaned {
        /// Id carried by the result, if any.
        tool_use_id: Option<String>,
    },

    /// A tool call was still open when its session ended.
    #[error("{tool_name} was still running when the session ended")]
    Unfinished {
        /// Tool whose call never returned.
        tool_name: String,
    },
}

/// Errors writing the run directory.
///
/// Apart from [`PersistenceError::CreateRunDir`], these are caught by the
/// recorders, logged, and counted; the session keeps going.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The run directory could not be created.
    #[error("Failed to create run directory {path:?}: {source}")]
    CreateRunDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending to the timeline failed.
    #[error("Failed to append to timeline {path:?}: {source}")]
    Timeline {
        /// Timeline file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a summary file failed.
    #[error("Failed to write {path:?}: {source}")]
    Write {
        /// Summary file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialized.
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The run has no directory; nothing is written.
    #[error("Run directory {path:?} is unavailable")]
    Detached {
        /// Path the write was meant for.
        path: PathBuf,
    },
}
