//! Domain model types (pure).
//!
//! All types in this module are pure data with smart constructors. Nothing
//! here performs I/O; the recorders and the display layer both depend on this
//! module and on nothing else in common.

pub mod error;
pub mod event;
pub mod identifiers;
pub mod records;
pub mod tool;
pub mod usage;

// Re-export for convenience
pub use error::{AppError, InputError, NormalizeError, PersistenceError, ToolAnomaly};
pub use event::DomainEvent;
pub use identifiers::{InvalidToolUseId, RunId, ToolUseId};
pub use records::{
    AnomalyEntry, ErrorEntry, LongestSession, ProgressSnapshot, RunMetadata, RunRecord,
    RunStatistics, SecurityBlock, SessionRecord, SessionStatistics, SessionSummary,
    SlowestToolCall, TimelineEvent, TimelineEventType, ToolCallRecord, ToolStatus,
};
pub use tool::{ToolName, UNKNOWN_TOOL};
pub use usage::{TokenAccountant, TokenUsage};
