//! Durable recording of runs and sessions.
//!
//! [`RunRecorder`] owns a run directory and the current [`SessionRecorder`];
//! the session recorder owns the record of one session and appends to the
//! shared timeline. Nothing in here depends on the display layer.

pub mod clock;
pub mod run;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use run::RunRecorder;
pub use session::{RecorderOptions, SessionRecorder, SECURITY_BLOCK_REASON};
pub use store::{session_file_name, RunStore, RUN_SUMMARY_FILE, TIMELINE_FILE};
