//! Configuration file loading with precedence handling.
//!
//! Precedence (lowest to highest): built-in defaults, the TOML config file,
//! `AGENT_WATCH_*` environment variables, command-line flags.

use crate::display::{DisplayConfig, Verbosity};
use crate::recorder::RecorderOptions;
use crate::sanitize::{RedactionPolicy, MAX_MESSAGE_CHARS, MAX_RESULT_CHARS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Env var naming an explicit config file.
pub const ENV_CONFIG: &str = "AGENT_WATCH_CONFIG";
/// Env var overriding the display verbosity.
pub const ENV_VERBOSITY: &str = "AGENT_WATCH_VERBOSITY";
/// Env var overriding the run log directory.
pub const ENV_LOG_DIR: &str = "AGENT_WATCH_LOG_DIR";
/// Env var overriding the project directory.
pub const ENV_PROJECT_DIR: &str = "AGENT_WATCH_PROJECT_DIR";

/// Run directories go here, under the project, unless configured otherwise.
pub const DEFAULT_LOG_SUBDIR: &str = "logs";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 250;

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to read config file (file may not exist or have permission issues).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML syntax or unknown keys.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },

    /// An environment variable holds a value that cannot be used.
    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },

    /// A redaction pattern is not a valid regex.
    #[error("Invalid redaction pattern: {reason}")]
    InvalidPattern { reason: String },

    /// A numeric setting is out of range.
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/agent-watch/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Display verbosity: "quiet", "normal" or "verbose".
    #[serde(default)]
    pub verbosity: Option<Verbosity>,

    /// Directory that receives `run_*` directories.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Project the agent works on; holds `feature_list.json`.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,

    /// Live frame repaint interval.
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,

    /// Stop after this many sessions.
    #[serde(default)]
    pub max_iterations: Option<u32>,

    /// Stored tool result limit in characters.
    #[serde(default)]
    pub max_result_chars: Option<usize>,

    /// Stored agent message limit in characters.
    #[serde(default)]
    pub max_message_chars: Option<usize>,

    #[serde(default)]
    pub redaction: Option<RedactionSection>,
}

/// Redaction section from TOML.
///
/// ```toml
/// [redaction]
/// extra_patterns = ["GITHUB_TOKEN", "private[_-]?key"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RedactionSection {
    /// Key patterns redacted in addition to the built-in ones.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

/// Resolved configuration after applying precedence rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub verbosity: Verbosity,
    /// Explicit run log directory; `None` means `<project_dir>/logs`.
    pub log_dir: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
    pub refresh_interval_ms: u64,
    pub max_iterations: Option<u32>,
    pub max_result_chars: usize,
    pub max_message_chars: usize,
    pub extra_redaction_patterns: Vec<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            log_dir: None,
            project_dir: None,
            log_file_path: default_log_path(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            max_iterations: None,
            max_result_chars: MAX_RESULT_CHARS,
            max_message_chars: MAX_MESSAGE_CHARS,
            extra_redaction_patterns: Vec::new(),
        }
    }
}

impl ResolvedConfig {
    /// Where run directories are created.
    pub fn run_log_dir(&self) -> PathBuf {
        match (&self.log_dir, &self.project_dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(project)) => project.join(DEFAULT_LOG_SUBDIR),
            (None, None) => PathBuf::from(DEFAULT_LOG_SUBDIR),
        }
    }

    /// Built-in redaction patterns plus the configured extras.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if an extra pattern is not a
    /// valid regex.
    pub fn redaction_policy(&self) -> Result<RedactionPolicy, ConfigError> {
        RedactionPolicy::with_extra_patterns(&self.extra_redaction_patterns).map_err(|e| {
            ConfigError::InvalidPattern {
                reason: e.to_string(),
            }
        })
    }

    /// Redaction and size limits for the recorders.
    pub fn recorder_options(&self) -> Result<RecorderOptions, ConfigError> {
        Ok(RecorderOptions {
            policy: self.redaction_policy()?,
            max_result_chars: self.max_result_chars,
            max_message_chars: self.max_message_chars,
        })
    }

    pub fn display_config(&self) -> DisplayConfig {
        DisplayConfig {
            verbosity: self.verbosity,
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
        }
    }

    /// Reject settings that would break the run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("refresh_interval_ms", self.refresh_interval_ms as usize),
            ("max_result_chars", self.max_result_chars),
            ("max_message_chars", self.max_message_chars),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }
        self.redaction_policy().map(|_| ())
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/agent-watch/agent-watch.log` on Linux, or the
/// platform's state directory elsewhere. Falls back to the current
/// directory when no state directory exists.
pub fn default_log_path() -> PathBuf {
    match dirs::state_dir() {
        Some(state_dir) => state_dir.join("agent-watch").join("agent-watch.log"),
        None => PathBuf::from("agent-watch.log"),
    }
}

/// Resolve default config file path.
///
/// Returns `~/.config/agent-watch/config.toml` on Unix, appropriate path on
/// other platforms. Returns `None` if no config directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agent-watch").join("config.toml"))
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (CLI `--config`)
/// 2. `AGENT_WATCH_CONFIG` environment variable
/// 3. Default path `~/.config/agent-watch/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG) {
        return load_config_file(PathBuf::from(env_path));
    }

    match default_config_path() {
        Some(default_path) => load_config_file(default_path),
        None => Ok(None),
    }
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return defaults;
    };

    ResolvedConfig {
        verbosity: config.verbosity.unwrap_or(defaults.verbosity),
        log_dir: config.log_dir.or(defaults.log_dir),
        project_dir: config.project_dir.or(defaults.project_dir),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
        refresh_interval_ms: config
            .refresh_interval_ms
            .unwrap_or(defaults.refresh_interval_ms),
        max_iterations: config.max_iterations.or(defaults.max_iterations),
        max_result_chars: config.max_result_chars.unwrap_or(defaults.max_result_chars),
        max_message_chars: config
            .max_message_chars
            .unwrap_or(defaults.max_message_chars),
        extra_redaction_patterns: config
            .redaction
            .map(|r| r.extra_patterns)
            .unwrap_or(defaults.extra_redaction_patterns),
    }
}

/// Apply environment variable overrides to resolved config.
///
/// Checks `AGENT_WATCH_VERBOSITY`, `AGENT_WATCH_LOG_DIR` and
/// `AGENT_WATCH_PROJECT_DIR`. Empty values are ignored.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnv` for an unknown verbosity.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> Result<ResolvedConfig, ConfigError> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    if let Some(value) = var(ENV_VERBOSITY) {
        config.verbosity = parse_verbosity(&value).ok_or_else(|| ConfigError::InvalidEnv {
            var: ENV_VERBOSITY.to_string(),
            value,
        })?;
    }
    if let Some(dir) = var(ENV_LOG_DIR) {
        config.log_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = var(ENV_PROJECT_DIR) {
        config.project_dir = Some(PathBuf::from(dir));
    }

    Ok(config)
}

fn parse_verbosity(value: &str) -> Option<Verbosity> {
    match value.trim().to_ascii_lowercase().as_str() {
        "quiet" => Some(Verbosity::Quiet),
        "normal" => Some(Verbosity::Normal),
        "verbose" => Some(Verbosity::Verbose),
        _ => None,
    }
}

/// Flags given on the command line; `None` means not given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub verbosity: Option<Verbosity>,
    pub log_dir: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    pub max_iterations: Option<u32>,
}

/// Apply CLI argument overrides to resolved config.
///
/// CLI args have the highest precedence and override all other sources.
/// Only flags that were explicitly set are applied.
pub fn apply_cli_overrides(mut config: ResolvedConfig, cli: CliOverrides) -> ResolvedConfig {
    if let Some(verbosity) = cli.verbosity {
        config.verbosity = verbosity;
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = Some(dir);
    }
    if let Some(dir) = cli.project_dir {
        config.project_dir = Some(dir);
    }
    if let Some(max) = cli.max_iterations {
        config.max_iterations = Some(max);
    }
    config
}

/// Full precedence chain: defaults, file, env, CLI; then validation.
pub fn resolve(
    config_path: Option<PathBuf>,
    cli: CliOverrides,
) -> Result<ResolvedConfig, ConfigError> {
    let file = load_config_with_precedence(config_path)?;
    let config = apply_cli_overrides(apply_env_overrides(merge_config(file))?, cli);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
