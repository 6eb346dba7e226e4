//! agent-watch
//!
//! Live monitor and structured run logger for autonomous coding agents.
//! Reads the agent runtime's JSONL message stream, shows a live terminal
//! view, and writes a per-run directory of session records and a timeline.
//!
//! Data flows one way: [`source`] → [`normalizer`] → [`pipeline`], which
//! feeds the [`aggregator`], the [`recorder`] and the [`display`].
//! [`analysis`] reads finished run directories back.

pub mod aggregator;
pub mod analysis;
pub mod config;
pub mod display;
pub mod logging;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod progress;
pub mod recorder;
pub mod sanitize;
pub mod source;
