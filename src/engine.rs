//! `Migrator`: the operation surface consumed by the CLI (or any other host).
//!
//! Everything it needs is injected: rule and mapping providers, the backup
//! manager, the step executor, the history store and a progress sink.
//! `Migrator::from_config` wires the defaults used by the binary.
//!
//! Plans handed to `preview`, `apply` and `fix_symlinks` may come from a file,
//! so every step path (relative link sources resolved against the link's
//! directory) must lie inside the base path; anything else is a planning error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backup::BackupManager;
use crate::config::Config;
use crate::errors::MigrateError;
use crate::executor::StepExecutor;
use crate::fs_ops::normalize_lexical;
use crate::history::{HistoryEntry, HistoryStore};
use crate::mapping::{JsonConfigDir, LayoutNames, MappingProvider, RuleProvider};
use crate::model::{ActionKind, MigrationPlan};
use crate::orchestrator::{ApplyReport, MigrationOrchestrator};
use crate::planner::PlanBuilder;
use crate::preview::{PreviewReport, preview};
use crate::progress::{NullProgress, ProgressSink};
use crate::repair::{self, PathScanReport, PermissionReport, RepairReport};
use crate::rollback::RollbackReport;
use crate::symlink::{NativeLinks, SymlinkStrategy};

pub struct Migrator {
    base_path: PathBuf,
    rules: Box<dyn RuleProvider>,
    mappings: Box<dyn MappingProvider>,
    orchestrator: MigrationOrchestrator,
    progress: Arc<dyn ProgressSink>,
    command_timeout: Duration,
}

impl Migrator {
    pub fn new(
        base_path: impl Into<PathBuf>,
        rules: Box<dyn RuleProvider>,
        mappings: Box<dyn MappingProvider>,
        backup: BackupManager,
        executor: StepExecutor,
        history: HistoryStore,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            rules,
            mappings,
            orchestrator: MigrationOrchestrator::new(backup, executor, history),
            progress: Arc::new(NullProgress),
            command_timeout: crate::symlink::DEFAULT_JUNCTION_TIMEOUT,
        }
    }

    /// Default wiring: JSON mapping files, native links with the configured
    /// junction timeout, backups and history under `backup_dir`.
    pub fn from_config(cfg: &Config) -> Self {
        let mappings_dir = cfg.mappings_dir();
        let links = Arc::new(SymlinkStrategy::new(NativeLinks::new(cfg.junction_timeout)));
        let backup =
            BackupManager::new(&cfg.base_path, &cfg.backup_dir).with_critical_paths(cfg.critical_paths.iter().cloned());
        Self::new(
            &cfg.base_path,
            Box::new(JsonConfigDir::new(&mappings_dir)),
            Box::new(JsonConfigDir::new(&mappings_dir)),
            backup,
            StepExecutor::new(links),
            HistoryStore::new(&cfg.backup_dir),
        )
        .with_command_timeout(cfg.junction_timeout)
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.orchestrator = self.orchestrator.with_progress(Arc::clone(&progress));
        self.progress = progress;
        self
    }

    pub fn with_cancel_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.orchestrator = self.orchestrator.with_cancel_check(check);
        self
    }

    /// Limit for external commands run by `fix_permissions`.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Build a fresh plan from the current rules and mappings.
    pub fn plan(&self) -> Result<MigrationPlan, MigrateError> {
        let rules = self.rules.rules()?;
        let emulators = self.mappings.emulator_mapping()?;
        let platforms = self.mappings.platform_mapping()?;
        PlanBuilder::new(&self.base_path)
            .with_progress(Arc::clone(&self.progress))
            .build(&emulators, &platforms, &rules)
    }

    pub fn preview(&self, plan: &MigrationPlan) -> Result<PreviewReport, MigrateError> {
        self.check_scope(plan)?;
        Ok(preview(plan))
    }

    pub fn apply(&self, plan: &mut MigrationPlan, confirm: bool) -> Result<ApplyReport, MigrateError> {
        self.check_scope(plan)?;
        self.orchestrator.apply(plan, confirm)
    }

    /// Reject plans with a step path outside the base path.
    pub fn check_scope(&self, plan: &MigrationPlan) -> Result<(), MigrateError> {
        let base = absolute_normal(&self.base_path)?;
        for step in &plan.steps {
            let target = step.action.target_path();
            let mut paths = vec![target.to_path_buf()];
            if let Some(source) = step.action.source_path() {
                paths.push(match (step.kind(), target.parent()) {
                    (ActionKind::CreateSymlink, Some(dir)) if source.is_relative() => dir.join(source),
                    _ => source.to_path_buf(),
                });
            }
            for path in paths {
                let resolved = absolute_normal(&path)?;
                if resolved == base || !resolved.starts_with(&base) {
                    warn!(plan_id = %plan.plan_id, step_id = %step.step_id, path = %resolved.display(), "Step path outside base path");
                    return Err(MigrateError::Planning(format!(
                        "step {}: {} is outside the base path {}",
                        step.step_id,
                        resolved.display(),
                        base.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Undo a recorded, successfully applied plan and mark it rolled back.
    pub fn rollback_by_id(&self, plan_id: &str) -> Result<RollbackReport, MigrateError> {
        let mut plan = self.require_plan(plan_id)?;
        let refuse = |reason: &str| MigrateError::NotRollbackable {
            plan_id: plan_id.to_string(),
            reason: reason.to_string(),
        };
        if !plan.executed {
            return Err(refuse("it was never executed"));
        }
        if plan.rolled_back {
            return Err(refuse("it was already rolled back"));
        }
        if !plan.success {
            return Err(refuse("its failed apply was already rolled back"));
        }

        info!(plan_id, steps = plan.completed_steps(), "Rolling back recorded plan");
        let report = self.orchestrator.rollback_coordinator().rollback(&plan.steps);
        if !report.is_clean() {
            warn!(plan_id, failures = report.failures.len(), "Rollback by id finished with failures");
        }
        plan.rolled_back = true;
        self.orchestrator.history().record(&plan)?;
        Ok(report)
    }

    pub fn fix_symlinks(&self, plan: &mut MigrationPlan) -> RepairReport {
        if let Err(e) = self.check_scope(plan) {
            return RepairReport {
                success: false,
                messages: vec![e.to_string()],
                ..RepairReport::default()
            };
        }
        repair::fix_symlinks(self.orchestrator.executor(), plan)
    }

    /// Retry the failed links of a recorded plan and re-record it.
    pub fn fix_symlinks_by_id(&self, plan_id: &str) -> Result<RepairReport, MigrateError> {
        let mut plan = self.require_plan(plan_id)?;
        let report = self.fix_symlinks(&mut plan);
        if !report.fixed.is_empty() {
            self.orchestrator.history().record(&plan)?;
        }
        Ok(report)
    }

    pub fn fix_permissions(&self, path: &Path) -> PermissionReport {
        repair::fix_permissions(path, self.command_timeout)
    }

    /// Read-only scan of the base path for ROMs and emulator executables.
    /// Layout names and extra emulator names come from the providers when
    /// they load; the defaults are used otherwise.
    pub fn fix_paths(&self) -> PathScanReport {
        let layout = match self.rules.rules() {
            Ok(rules) => rules.layout,
            Err(e) => {
                debug!(error = %e, "Rules unavailable for path scan; using default layout");
                LayoutNames::default()
            }
        };
        let names: Vec<String> = match self.mappings.emulator_mapping() {
            Ok(mapping) => mapping
                .emulators
                .iter()
                .flat_map(|(name, entry)| {
                    let exe = entry
                        .executable
                        .as_deref()
                        .and_then(|e| Path::new(e).file_stem())
                        .map(|stem| stem.to_string_lossy().into_owned());
                    std::iter::once(name.clone()).chain(exe)
                })
                .collect(),
            Err(e) => {
                debug!(error = %e, "Emulator mapping unavailable for path scan");
                Vec::new()
            }
        };
        repair::fix_paths(&self.base_path, &layout, &names)
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, MigrateError> {
        self.orchestrator.history().list()
    }

    pub fn status(&self, plan_id: &str) -> Result<Option<HistoryEntry>, MigrateError> {
        self.orchestrator.history().status(plan_id)
    }

    pub fn load_plan(&self, plan_id: &str) -> Result<Option<MigrationPlan>, MigrateError> {
        self.orchestrator.history().load(plan_id)
    }

    fn require_plan(&self, plan_id: &str) -> Result<MigrationPlan, MigrateError> {
        self.load_plan(plan_id)?
            .ok_or_else(|| MigrateError::PlanNotFound(plan_id.to_string()))
    }
}

fn absolute_normal(path: &Path) -> Result<PathBuf, MigrateError> {
    std::path::absolute(path)
        .map(|p| normalize_lexical(&p))
        .map_err(|e| MigrateError::Planning(format!("cannot resolve {}: {e}", path.display())))
}
