//! agent-watch - Entry Point

use agent_watch::analysis::{self, AnalysisError};
use agent_watch::config::{self, CliOverrides, ResolvedConfig};
use agent_watch::display::{LiveDisplay, Surface, Verbosity};
use agent_watch::model::{AppError, PersistenceError, RunMetadata, RunRecord};
use agent_watch::pipeline::{self, Monitor, Outcome, StopReason};
use agent_watch::progress::{FeatureListProgress, NoProgress, ProgressSource};
use agent_watch::recorder::{Clock, RecorderOptions, RunRecorder, SystemClock};
use agent_watch::source::detect_input_source;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_TIMELINE_LIMIT: usize = 50;

/// Live monitor and structured run logger for autonomous coding agents
#[derive(Parser, Debug)]
#[command(name = "agent-watch")]
#[command(version)]
#[command(about = "Watch an agent's streaming output and record every session")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Monitor a JSONL agent stream and write run logs
    Watch(WatchArgs),
    /// Summarize a recorded session file or run directory
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// JSONL stream file (reads from stdin if not provided)
    pub file: Option<PathBuf>,

    /// Project the agent works on; progress is read from its feature_list.json
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Directory for run_* log directories (default: <project-dir>/logs)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub verbosity: Option<Verbosity>,

    /// Stop after this many sessions
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_iterations: Option<u32>,

    /// Model name recorded in the run summary
    #[arg(long)]
    pub model: Option<String>,

    /// Agent configuration name recorded in the run summary
    #[arg(long)]
    pub agent_config: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Session file (session_NNN.json) or run directory
    pub path: PathBuf,

    /// Compare every session of a run directory
    #[arg(long, conflicts_with = "timeline")]
    pub compare: bool,

    /// Print the event timeline of a run directory
    #[arg(long)]
    pub timeline: bool,

    /// Restrict the timeline to one session
    #[arg(long, requires = "timeline")]
    pub session: Option<u32>,

    /// Maximum timeline events to print
    #[arg(long, default_value_t = DEFAULT_TIMELINE_LIMIT)]
    pub limit: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Watch(args) => watch(args),
        Command::Analyze(args) => {
            print!("{}", analyze(&args)?);
            Ok(())
        }
    }
}

// ===== watch =====

fn watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Defaults → Config File → Env Vars → CLI Args
    let config = config::resolve(
        args.config.clone(),
        CliOverrides {
            verbosity: args.verbosity,
            log_dir: args.log_dir.clone(),
            project_dir: args.project_dir.clone(),
            max_iterations: args.max_iterations,
        },
    )?;

    agent_watch::logging::init(&config.log_file_path)?;
    info!(config = ?config, "Configuration loaded and resolved");

    let mut source = detect_input_source(args.file.clone()).map_err(AppError::from)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metadata = RunMetadata {
        project_dir: config.project_dir.clone(),
        model: args.model.clone(),
        config: args.agent_config.clone(),
    };
    let (run, open_error) = open_run(
        &config.run_log_dir(),
        metadata,
        Arc::clone(&clock),
        config.recorder_options()?,
    );
    let run_dir = (!run.is_detached()).then(|| run.run_dir().to_path_buf());

    let progress = progress_source(&config);
    let surface = Surface::stdout(config.verbosity).map_err(AppError::from)?;
    let (display, feed) = LiveDisplay::spawn(surface, Arc::clone(&progress), config.display_config());
    if let Some(e) = open_error {
        feed.error(format!("Run logs disabled, display only: {e}"));
    }
    feed.phase(format!("Watching {}", source.describe()));

    let monitor = Monitor::new(run, feed, progress, clock, config.redaction_policy()?)
        .with_max_message_chars(config.max_message_chars)
        .with_max_iterations(config.max_iterations)
        .with_interrupt(pipeline::install_interrupt_handler().map_err(AppError::from)?);

    let outcome = pipeline::drive(&mut source, monitor);
    display.shutdown()?;

    println!("{}", run_summary_line(&outcome, run_dir.as_deref()));
    match outcome.source_error {
        Some(e) => Err(AppError::from(e).into()),
        None => Ok(()),
    }
}

/// Create the run directory, or fall back to a run that writes nothing.
fn open_run(
    base_dir: &Path,
    metadata: RunMetadata,
    clock: Arc<dyn Clock>,
    options: RecorderOptions,
) -> (RunRecorder, Option<PersistenceError>) {
    match RunRecorder::create(base_dir, metadata.clone(), Arc::clone(&clock), options.clone()) {
        Ok(run) => (run, None),
        Err(e) => {
            warn!(error = %e, "Run directory unavailable, continuing without run logs");
            (RunRecorder::detached(base_dir, metadata, clock, options), Some(e))
        }
    }
}

fn progress_source(config: &ResolvedConfig) -> Arc<dyn ProgressSource> {
    match &config.project_dir {
        Some(dir) => Arc::new(FeatureListProgress::new(dir)),
        None => Arc::new(NoProgress),
    }
}

fn run_summary_line(outcome: &Outcome, run_dir: Option<&Path>) -> String {
    let RunRecord {
        summary,
        duration_minutes,
        ..
    } = &outcome.record;
    let reason = match outcome.stop {
        StopReason::EndOfStream => "stream ended",
        StopReason::Interrupted => "interrupted",
        StopReason::MaxIterations => "max iterations reached",
        StopReason::ProjectComplete => "all features passing",
        StopReason::SourceFailed => "input failed",
    };
    let logs = match run_dir {
        Some(dir) => dir.display().to_string(),
        None => "not written".to_string(),
    };
    format!(
        "Run finished ({reason}): {} sessions, {} tool calls, {} errors, {:.1} minutes. Logs: {logs}",
        summary.total_sessions,
        summary.total_tool_calls,
        summary.total_errors,
        duration_minutes,
    )
}

// ===== analyze =====

fn analyze(args: &AnalyzeArgs) -> Result<String, AnalysisError> {
    let path = args.path.as_path();
    if args.timeline {
        let timeline = analysis::read_timeline(path)?;
        let mut report = match args.session {
            Some(n) => analysis::timeline_report(timeline.for_session(n), args.limit),
            None => analysis::timeline_report(&timeline.events, args.limit),
        };
        if timeline.skipped > 0 {
            report.push_str(&format!("\n{} malformed lines skipped\n", timeline.skipped));
        }
        return Ok(report);
    }

    if args.compare || path.is_dir() {
        return Ok(analysis::comparison_report(&analysis::compare_run(path)?));
    }

    let session = analysis::load_session(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(analysis::session_report(
        &name,
        &session,
        &analysis::analyze_session(&session),
    ))
}
