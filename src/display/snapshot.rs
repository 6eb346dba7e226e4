//! Read-only view of the run published for the display thread.

use crate::model::{TokenUsage, ToolName};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

/// Snapshot shared between the event path (writer) and the display thread
/// (reader).
pub type SharedSnapshot = Arc<RwLock<LiveSnapshot>>;

/// State of one tool in the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLineState {
    Running,
    Done,
    Failed,
    Blocked,
}

impl ToolLineState {
    pub fn icon(self) -> &'static str {
        match self {
            ToolLineState::Running => "⋯",
            ToolLineState::Done => "✓",
            ToolLineState::Failed => "✗",
            ToolLineState::Blocked => "⊘",
        }
    }
}

/// One tool of the current batch as the display shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolLine {
    pub tool_name: ToolName,
    /// Already redacted.
    pub details: Option<String>,
    pub state: ToolLineState,
}

/// Everything the live frame needs, copied out of the event path.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    pub status: String,
    /// Current session number.
    pub iteration: u32,
    pub max_iterations: Option<u32>,
    /// Start of the current session; elapsed time counts from here.
    pub session_started: Option<DateTime<Utc>>,
    /// Run-wide tokens including the current session.
    pub token_usage: TokenUsage,
    pub tools_called: usize,
    pub batch: Vec<ToolLine>,
    pub last_thought: Option<String>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        Self {
            status: "Starting".to_string(),
            iteration: 0,
            max_iterations: None,
            session_started: None,
            token_usage: TokenUsage::default(),
            tools_called: 0,
            batch: Vec::new(),
            last_thought: None,
        }
    }
}

impl LiveSnapshot {
    pub fn shared() -> SharedSnapshot {
        Arc::new(RwLock::new(Self::default()))
    }
}
