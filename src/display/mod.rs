//! Live terminal display (impure shell).
//!
//! The event path publishes into a [`DisplayFeed`]: it replaces the shared
//! [`LiveSnapshot`] and queues printable [`DisplayLine`]s. A separate
//! [`LiveDisplay`] thread repaints on a fixed timer, so elapsed time keeps
//! ticking while the agent is quiet. The display only reads the snapshot;
//! it never touches recorder state.

pub mod driver;
pub mod frame;
pub mod lines;
pub mod snapshot;

pub use driver::{DisplayConfig, DisplayFeed, LiveDisplay, Surface, DEFAULT_REFRESH_INTERVAL};
pub use frame::{format_elapsed, format_tokens, progress_bar, render_frame, LiveFrame, FRAME_HEIGHT};
pub use lines::{condense_thought, DisplayLine};
pub use snapshot::{LiveSnapshot, SharedSnapshot, ToolLine, ToolLineState};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How much the display shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Phase and error lines only; no live frame.
    Quiet,
    /// Live frame plus thoughts and batch summaries.
    #[default]
    Normal,
    /// Every event printed inline with details; no live frame.
    Verbose,
}

impl Verbosity {
    /// Whether this level draws the live frame.
    pub fn shows_frame(self) -> bool {
        self == Verbosity::Normal
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
        })
    }
}

/// Errors from the display thread.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// IO error during terminal operations
    #[error("Terminal IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The display thread panicked.
    #[error("Display thread panicked")]
    ThreadPanicked,
}
