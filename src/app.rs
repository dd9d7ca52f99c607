//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler,
//! validates paths, and dispatches the selected command to the `Migrator`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use emu_migrate::cli::{Args, Command};
use emu_migrate::config::{Config, default_config_path, ensure_default_config_exists, load_config};
use emu_migrate::fs_ops::{io_error_with_help, write_atomic};
use emu_migrate::output as out;
use emu_migrate::progress::LogProgress;
use emu_migrate::repair::FoundKind;
use emu_migrate::{MigrateError, MigrationPlan, Migrator, shutdown};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<ExitCode> {
    let loaded = load_config(args.config.as_deref())?;

    if args.command == Command::PrintConfig {
        print_config(&args, loaded.as_ref());
        return Ok(ExitCode::SUCCESS);
    }

    // First run without any config: write a template, unless the CLI already
    // names the tree to work on.
    if loaded.is_none()
        && args.config.is_none()
        && args.base_path.is_none()
        && let Some(path) = ensure_default_config_exists()
    {
        out::print_success(&format!("A template emu_migrate config was written to: {}", path.display()));
        out::print_info("Edit `base_path` (and optionally `backup_dir`, `mappings_dir`, `log_file`), then re-run.");
        out::print_info("To use a different location set EMU_MIGRATE_CONFIG or pass --config.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut cfg = loaded.map(|(_, c)| c).unwrap_or_default();
    args.apply_overrides(&mut cfg);

    let guard_opt = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).inspect_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
    })?;

    // Guard needs to be dropped on SIGINT to flush logs
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            if !shutdown::request() {
                out::print_error("Second interrupt; exiting without rollback");
                std::process::exit(MigrateError::Interrupted.code());
            }
            out::print_warn("Received interrupt; finishing the current step, then rolling back...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .expect("failed to install signal handler");
    }

    debug!(?args, "Starting emu_migrate");
    let result = dispatch(&args, &cfg);

    if let Err(e) = &result {
        match e.downcast_ref::<MigrateError>() {
            Some(me) => error!(code = me.code(), error = %me, "Command failed"),
            None => error!(error = %format!("{e:#}"), "Command failed"),
        }
    }

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn dispatch(args: &Args, cfg: &Config) -> Result<ExitCode> {
    if let Command::FixPermissions { path } = &args.command {
        let migrator = Migrator::from_config(cfg);
        let report = migrator.fix_permissions(path);
        if args.json {
            out::print_json(&report)?;
        } else {
            for m in &report.messages {
                out::print_user(m);
            }
        }
        return Ok(exit_for(report.success));
    }

    cfg.validate()?;
    let migrator = Migrator::from_config(cfg).with_progress(Arc::new(LogProgress));

    match &args.command {
        Command::Plan { output } => {
            let plan = migrator.plan()?;
            if let Some(path) = output {
                save_plan(&plan, path)?;
            }
            if args.json {
                out::print_json(&plan)?;
            } else {
                print_plan(&plan);
                if let Some(path) = output {
                    out::print_success(&format!("Plan written to {}", path.display()));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Preview { plan } => {
            let plan = obtain_plan(&migrator, plan.as_deref())?;
            let report = migrator.preview(&plan)?;
            if args.json {
                out::print_json(&report)?;
            } else {
                out::print_user(&format!("Preview of {} ({} steps)", report.plan_id, report.changes.len()));
                for c in &report.changes {
                    out::print_user(&format!("  {:<12} {:<14} {}", c.status.as_str(), c.step_id, c.description));
                }
                for w in &report.warnings {
                    out::print_warn(w);
                }
                out::print_user(&format!(
                    "Risk: {}  Estimated time: {:.1}s",
                    out::risk_label(report.risk_level),
                    report.estimated_seconds
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply { plan: plan_file, yes } => {
            let mut plan = obtain_plan(&migrator, plan_file.as_deref())?;
            let report = migrator.apply(&mut plan, *yes)?;
            if let Some(path) = plan_file {
                save_plan(&plan, path)?;
            }
            if args.json {
                out::print_json(&report)?;
            } else if report.success {
                out::print_success(&format!(
                    "Migration {} completed ({} steps)",
                    report.plan_id, report.executed_steps
                ));
            } else {
                match &report.failed_step {
                    Some(f) => out::print_error(&format!(
                        "Step {} ({}) failed: {}",
                        f.index, f.step_id, f.error
                    )),
                    None if report.cancelled => out::print_error("Migration cancelled"),
                    None => out::print_error("Migration failed"),
                }
                if let Some(rb) = &report.rollback {
                    out::print_warn(&format!(
                        "Rolled back {} step(s); {} rollback failure(s)",
                        rb.undone.len(),
                        rb.failures.len()
                    ));
                    for f in &rb.failures {
                        out::print_warn(&format!("  {}: {}", f.step_id, f.error));
                    }
                }
            }
            if let Some(loc) = &report.backup_location
                && !args.json
            {
                out::print_info(&format!("Backup: {}", loc.display()));
            }
            if report.cancelled {
                return Err(MigrateError::Interrupted.into());
            }
            Ok(exit_for(report.success))
        }
        Command::Rollback { plan_id } => {
            let report = migrator.rollback_by_id(plan_id)?;
            if args.json {
                out::print_json(&report)?;
            } else if report.is_clean() {
                out::print_success(&format!("Rolled back {plan_id} ({} steps)", report.undone.len()));
            } else {
                for f in &report.failures {
                    out::print_warn(&format!("{}: {}", f.step_id, f.error));
                }
                out::print_error(&format!("Rollback of {plan_id} finished with failures"));
            }
            if !args.json {
                for p in &report.left_in_place {
                    out::print_info(&format!("Left in place (not empty): {p}"));
                }
            }
            Ok(exit_for(report.is_clean()))
        }
        Command::FixSymlinks { plan_id } => {
            let report = migrator.fix_symlinks_by_id(plan_id)?;
            if args.json {
                out::print_json(&report)?;
            } else {
                for m in &report.messages {
                    out::print_user(m);
                }
            }
            Ok(exit_for(report.success))
        }
        Command::FixPaths => {
            let report = migrator.fix_paths();
            if args.json {
                out::print_json(&report)?;
            } else {
                for found in &report.resolved {
                    let kind = match found.kind {
                        FoundKind::Roms => "ROMs",
                        FoundKind::Emulator => "Emulator",
                    };
                    out::print_user(&format!(
                        "{kind:<9} {} ({} file(s)){}",
                        found.path.display(),
                        found.files.len(),
                        if found.organized { "" } else { "  [misplaced]" }
                    ));
                }
                for u in &report.unresolved {
                    out::print_warn(u);
                }
                for s in &report.suggestions {
                    out::print_info(s);
                }
            }
            Ok(exit_for(report.success))
        }
        Command::History => {
            let entries = migrator.history()?;
            if args.json {
                out::print_json(&entries)?;
            } else if entries.is_empty() {
                out::print_info("No migrations recorded");
            } else {
                for e in &entries {
                    out::print_user(&format!(
                        "{}  {:<14} {:<11} {}",
                        e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        e.plan_id,
                        out::status_label(e.status),
                        e.description
                    ));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status { plan_id } => {
            let entry = migrator
                .status(plan_id)?
                .ok_or_else(|| MigrateError::PlanNotFound(plan_id.clone()))?;
            if args.json {
                out::print_json(&entry)?;
            } else {
                out::print_user(&format!("Plan:     {}", entry.plan_id));
                out::print_user(&format!("Status:   {}", out::status_label(entry.status)));
                out::print_user(&format!("Steps:    {} ({} failed)", entry.total_steps, entry.failed_steps));
                out::print_user(&format!("Backup:   {}", entry.backup_location.display()));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::PrintConfig | Command::FixPermissions { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn exit_for(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn obtain_plan(migrator: &Migrator, file: Option<&Path>) -> Result<MigrationPlan> {
    match file {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(io_error_with_help("read plan", path))?;
            let plan = MigrationPlan::from_json(&raw).with_context(|| format!("parse plan '{}'", path.display()))?;
            info!(plan_id = %plan.plan_id, path = %path.display(), "Loaded plan file");
            Ok(plan)
        }
        None => Ok(migrator.plan()?),
    }
}

fn save_plan(plan: &MigrationPlan, path: &Path) -> Result<()> {
    let json = plan.to_json().context("serialize plan")?;
    write_atomic(path, json.as_bytes(), false).map_err(io_error_with_help("write plan", path))
}

fn print_plan(plan: &MigrationPlan) {
    out::print_user(&format!("Plan {}: {} ({} steps)", plan.plan_id, plan.description, plan.total_steps()));
    for step in &plan.steps {
        out::print_user(&format!("  {:<14} {}", step.step_id, step.description));
    }
}

fn print_config(args: &Args, loaded: Option<&(PathBuf, Config)>) {
    match (loaded, default_config_path()) {
        (Some((p, _)), _) => out::print_info(&format!("Using config file:\n  {}", p.display())),
        (None, Some(p)) => {
            out::print_info(&format!("Default emu_migrate config path:\n  {}", p.display()));
            out::print_info("No config file exists there yet. Run any command to create a template.");
        }
        (None, None) => out::print_error("Could not determine a default config path"),
    }

    let mut cfg = loaded.map(|(_, c)| c.clone()).unwrap_or_default();
    args.apply_overrides(&mut cfg);
    out::print_user(&format!("base_path:      {}", cfg.base_path.display()));
    out::print_user(&format!("backup_dir:     {}", cfg.backup_dir.display()));
    out::print_user(&format!("mappings_dir:   {}", cfg.mappings_dir().display()));
    out::print_user(&format!("log_level:      {}", cfg.log_level));
    out::print_user(&format!(
        "log_file:       {}",
        cfg.log_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<none>".into())
    ));
    out::print_user(&format!("junction_timeout_seconds: {}", cfg.junction_timeout.as_secs()));
    for p in &cfg.critical_paths {
        out::print_user(&format!("critical_path:  {}", p.display()));
    }
}
