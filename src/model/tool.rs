//! Tool names and display details.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool names recognized in agent streams.
///
/// Enumerates the runtime's built-in tools with a fallback variant for MCP
/// or future tools. Used for grouping, detail extraction and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolName {
    /// Read files from filesystem
    Read,
    /// Write files to filesystem
    Write,
    /// Edit existing files (string replacement)
    Edit,
    /// Apply multiple edits atomically
    MultiEdit,
    /// Execute bash commands
    Bash,
    /// Search file contents with regex
    Grep,
    /// Find files by glob pattern
    Glob,
    /// Create or manage subagent tasks
    Task,
    /// Search the web
    WebSearch,
    /// Fetch web resources
    WebFetch,
    /// Unknown or custom tool
    Other(String),
}

/// Name recorded for tool results that match no invocation.
pub const UNKNOWN_TOOL: &str = "unknown";

impl ToolName {
    /// Parse a tool name from the stream.
    ///
    /// Recognizes standard tools, wrapping unknown names in `Other`.
    pub fn parse(name: &str) -> Self {
        match name {
            "Read" => Self::Read,
            "Write" => Self::Write,
            "Edit" => Self::Edit,
            "MultiEdit" => Self::MultiEdit,
            "Bash" => Self::Bash,
            "Grep" => Self::Grep,
            "Glob" => Self::Glob,
            "Task" => Self::Task,
            "WebSearch" => Self::WebSearch,
            "WebFetch" => Self::WebFetch,
            other => Self::Other(other.to_string()),
        }
    }

    /// Placeholder for calls whose invocation was never seen.
    pub fn unknown() -> Self {
        Self::Other(UNKNOWN_TOOL.to_string())
    }

    /// Get the canonical string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Edit => "Edit",
            Self::MultiEdit => "MultiEdit",
            Self::Bash => "Bash",
            Self::Grep => "Grep",
            Self::Glob => "Glob",
            Self::Task => "Task",
            Self::WebSearch => "WebSearch",
            Self::WebFetch => "WebFetch",
            Self::Other(s) => s,
        }
    }

    /// Tools that touch a single file, used by repeated-operation analysis.
    pub fn is_file_edit_or_read(&self) -> bool {
        matches!(self, Self::Read | Self::Write | Self::Edit | Self::MultiEdit)
    }

    /// Short, human-readable detail for a tool input.
    ///
    /// File tools show their path or pattern; Bash shows the command cut to
    /// 60 characters. Other tools have no detail.
    pub fn details(&self, input: &serde_json::Value) -> Option<String> {
        const MAX_COMMAND_CHARS: usize = 60;

        match self {
            Self::Read | Self::Write | Self::Edit | Self::MultiEdit | Self::Glob | Self::Grep => {
                ["path", "file_path", "pattern", "file", "filePath"]
                    .iter()
                    .find_map(|key| input.get(*key))
                    .map(value_to_text)
            }
            Self::Bash => {
                let command = input.get("command").map(value_to_text)?;
                if command.chars().count() <= MAX_COMMAND_CHARS {
                    Some(command)
                } else {
                    let head: String = command.chars().take(MAX_COMMAND_CHARS - 3).collect();
                    Some(format!("{head}..."))
                }
            }
            _ => None,
        }
    }

    /// File path targeted by a file tool call, if any.
    pub fn target_path(&self, input: &serde_json::Value) -> Option<String> {
        if !self.is_file_edit_or_read() {
            return None;
        }
        ["file_path", "path", "filePath"]
            .iter()
            .find_map(|key| input.get(*key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<String> for ToolName {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ToolName> for String {
    fn from(name: ToolName) -> Self {
        name.as_str().to_string()
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
