//! Bootstrap configuration loading
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`WKMP_VL_CONFIG`)
//! 3. User config directory (`~/.config/wkmp/vl.toml` on Linux)
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "WKMP_VL_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite catalog database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Import root; layouts build directory chains relative to it
    #[serde(default)]
    pub import_path: Option<PathBuf>,

    /// Maximum number of objects classified concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Classification layout selection
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            import_path: None,
            workers: default_workers(),
            layout: LayoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which classification runtime drives the virtual layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    /// Stock media layout compiled into the service
    #[default]
    Builtin,
    /// Declarative rule file
    Rules,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LayoutConfig {
    #[serde(default)]
    pub kind: LayoutKind,

    /// Rule file, required when `kind = "rules"`
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("wkmp").join("catalog.db"))
        .unwrap_or_else(|| PathBuf::from("./wkmp_data/catalog.db"))
}

impl TomlConfig {
    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.layout.kind == LayoutKind::Rules && self.layout.rules_file.is_none() {
            return Err(Error::Config(
                "layout.kind = \"rules\" requires layout.rules_file".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Locate the configuration file following the resolution priority
///
/// Returns `None` when no file is found; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    dirs::config_dir()
        .map(|d| d.join("wkmp").join("vl.toml"))
        .filter(|p| p.exists())
}

/// Resolve and load configuration, using built-in defaults if no file exists
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            info!("Using configuration file: {}", path.display());
            load_toml_config(&path)
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}
