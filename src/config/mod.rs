//! Configuration module.
//!
//! Settings come from built-in defaults, `config.toml`, `AGENT_WATCH_*`
//! environment variables and command-line flags, in increasing precedence.

pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, default_config_path, default_log_path,
    load_config_file, load_config_with_precedence, merge_config, resolve, CliOverrides,
    ConfigError, ConfigFile, RedactionSection, ResolvedConfig,
};
