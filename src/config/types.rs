//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::paths;
use crate::backup::default_critical_paths;
use crate::symlink::DEFAULT_JUNCTION_TIMEOUT;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Runtime configuration for the migrator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the tree being restructured
    pub base_path: PathBuf,
    /// Where `migration_backup_*` directories are written
    pub backup_dir: PathBuf,
    /// Directory holding rules.json / emulator_mapping.json / platform_mapping.json;
    /// defaults to `base_path` when unset
    pub mappings_dir: Option<PathBuf>,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    /// Upper bound for the external junction / icacls calls
    pub junction_timeout: Duration,
    /// Subtrees of `base_path` copied before any mutation
    pub critical_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            backup_dir: paths::default_backup_dir().unwrap_or_else(|| PathBuf::from("migration_backups")),
            mappings_dir: None,
            log_level: LogLevel::Normal,
            log_file: None,
            junction_timeout: DEFAULT_JUNCTION_TIMEOUT,
            critical_paths: default_critical_paths(),
        }
    }
}

impl Config {
    /// Construct a Config for `base_path` with backups in `backup_dir`; other fields use defaults.
    pub fn new(base_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            backup_dir: backup_dir.into(),
            ..Default::default()
        }
    }

    /// Directory the rule and mapping JSON files are read from.
    pub fn mappings_dir(&self) -> PathBuf {
        self.mappings_dir.clone().unwrap_or_else(|| self.base_path.clone())
    }
}
