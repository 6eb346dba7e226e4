//! Core identifier newtypes with smart constructors.
//!
//! Identifiers validate their input at construction time.
//! Raw constructors are never exported - use smart constructors only.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool invocation identifier for linking tool_use to tool_result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolUseId(String);

impl ToolUseId {
    /// Smart constructor: validates non-empty tool use ID
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidToolUseId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidToolUseId::Empty);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ToolUseId {
    type Error = InvalidToolUseId;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ToolUseId> for String {
    fn from(id: ToolUseId) -> Self {
        id.0
    }
}

impl fmt::Display for ToolUseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one run, also used as the run directory name.
///
/// Derived from the run's start time as `run_YYYYmmdd_HHMMSS`, so run
/// directories sort chronologically. Generated once per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    const PREFIX: &'static str = "run_";
    const TIMESTAMP_FORMAT: &'static str = "%Y%m%d_%H%M%S";

    /// Build the id for a run started at `started_at`.
    pub fn from_start_time<Tz>(started_at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self(format!(
            "{}{}",
            Self::PREFIX,
            started_at.format(Self::TIMESTAMP_FORMAT)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ===== Error Types =====

#[derive(Debug, Clone, thiserror::Error)]
pub enum InvalidToolUseId {
    #[error("Tool Use ID cannot be empty")]
    Empty,
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn tool_use_id_accepts_valid_string() {
        let id = ToolUseId::new("toolu_01ABC");
        assert!(id.is_ok());
        assert_eq!(id.unwrap().as_str(), "toolu_01ABC");
    }

    #[test]
    fn tool_use_id_rejects_empty_string() {
        assert!(matches!(ToolUseId::new(""), Err(InvalidToolUseId::Empty)));
    }

    #[test]
    fn tool_use_id_display_matches_inner() {
        let id = ToolUseId::new("toolu_xyz").unwrap();
        assert_eq!(id.to_string(), "toolu_xyz");
    }

    #[test]
    fn tool_use_id_serializes_as_plain_string() {
        let id = ToolUseId::new("toolu_1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"toolu_1\"");
    }

    #[test]
    fn tool_use_id_deserialize_rejects_empty() {
        assert!(serde_json::from_str::<ToolUseId>("\"\"").is_err());
        let id: ToolUseId = serde_json::from_str("\"toolu_2\"").unwrap();
        assert_eq!(id.as_str(), "toolu_2");
    }

    #[test]
    fn run_id_uses_sortable_timestamp() {
        let started = Utc.with_ymd_and_hms(2023, 12, 19, 10, 30, 45).unwrap();
        let id = RunId::from_start_time(&started);
        assert_eq!(id.as_str(), "run_20231219_103045");
    }

    #[test]
    fn run_id_formats_in_the_given_timezone() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let started = offset.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(RunId::from_start_time(&started).as_str(), "run_20240102_030405");
    }

    #[test]
    fn run_ids_sort_chronologically() {
        let earlier = RunId::from_start_time(&Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap());
        let later = RunId::from_start_time(&Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap());
        assert!(earlier.as_str() < later.as_str());
    }
}
