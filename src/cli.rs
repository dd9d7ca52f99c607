//! CLI definition and parsing.
//! Defines Args/Command and provides parse() for command-line handling.
//!
//! Notes:
//! - Global flags override config values (which are loaded from XML if present).
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};

/// Restructure an emulation tree safely: plan, back up, apply, roll back.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Restructure an emulation file tree with backup and rollback")]
pub struct Args {
    /// Config file to use instead of EMU_MIGRATE_CONFIG or the default location.
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Root of the tree to restructure.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub base_path: Option<PathBuf>,

    /// Where backups (and therefore history) are kept.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub backup_dir: Option<PathBuf>,

    /// Directory with rules.json, emulator_mapping.json and platform_mapping.json.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub mappings_dir: Option<PathBuf>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Also write logs to this file.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Print results as JSON and emit structured JSON logs.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build a migration plan from the rules and mappings.
    Plan {
        /// Write the plan JSON to this file.
        #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// Show what a plan would change, without changing anything.
    Preview {
        /// Plan file produced by `plan --output`; a fresh plan is built otherwise.
        #[arg(long, value_hint = ValueHint::FilePath)]
        plan: Option<PathBuf>,
    },
    /// Back up, then execute a plan; rolls back on the first failure.
    Apply {
        #[arg(long, value_hint = ValueHint::FilePath)]
        plan: Option<PathBuf>,
        /// Confirm that the file system may be modified.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Undo a recorded, successfully applied plan.
    Rollback { plan_id: String },
    /// Retry the failed links of a recorded plan.
    FixSymlinks { plan_id: String },
    /// Check a path's permissions; fixes them only when already elevated.
    FixPermissions {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// Scan the base path for ROMs and emulator executables and suggest
    /// where misplaced ones belong. Changes nothing.
    FixPaths,
    /// List recorded plans, newest first.
    History,
    /// Show the recorded status of one plan.
    Status { plan_id: String },
    /// Print the config file location and effective settings, then exit.
    PrintConfig,
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(p) = &self.base_path {
            cfg.base_path = p.clone();
        }
        if let Some(p) = &self.backup_dir {
            cfg.backup_dir = p.clone();
        }
        if let Some(p) = &self.mappings_dir {
            cfg.mappings_dir = Some(p.clone());
        }
        if let Some(p) = &self.log_file {
            cfg.log_file = Some(p.clone());
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
