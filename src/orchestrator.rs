//! Drives one plan through `Created -> BackedUp -> Executing -> {Completed | RolledBack}`.
//!
//! Hard failures (not confirmed, already executed, backup failed) are returned
//! as `Err` before anything is mutated. Step failures and cancellation are
//! handled here: the executed prefix is rolled back and the outcome is
//! returned as an `ApplyReport`.

use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backup::BackupManager;
use crate::errors::MigrateError;
use crate::executor::StepExecutor;
use crate::history::HistoryStore;
use crate::model::MigrationPlan;
use crate::progress::{NullProgress, ProgressSink, emit};
use crate::rollback::{RollbackCoordinator, RollbackReport};
use crate::shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Created,
    BackedUp,
    Executing,
    Completed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedStep {
    /// 1-based position in the plan.
    pub index: usize,
    pub step_id: String,
    pub description: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub plan_id: String,
    pub state: ApplyState,
    pub success: bool,
    pub executed_steps: usize,
    pub failed_step: Option<FailedStep>,
    pub cancelled: bool,
    pub rollback_attempted: bool,
    pub rollback: Option<RollbackReport>,
    pub backup_location: Option<PathBuf>,
}

type CancelCheck = Box<dyn Fn() -> bool + Send + Sync>;

pub struct MigrationOrchestrator {
    backup: BackupManager,
    executor: StepExecutor,
    rollback: RollbackCoordinator,
    history: HistoryStore,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelCheck,
}

impl MigrationOrchestrator {
    pub fn new(backup: BackupManager, executor: StepExecutor, history: HistoryStore) -> Self {
        let rollback = RollbackCoordinator::new(Arc::clone(executor.links()));
        Self {
            backup,
            executor,
            rollback,
            history,
            progress: Arc::new(NullProgress),
            cancel: Box::new(shutdown::is_requested),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the between-steps cancellation check.
    pub fn with_cancel_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel = Box::new(check);
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    pub fn rollback_coordinator(&self) -> &RollbackCoordinator {
        &self.rollback
    }

    pub fn apply(&self, plan: &mut MigrationPlan, confirm: bool) -> Result<ApplyReport, MigrateError> {
        if !confirm {
            warn!(plan_id = %plan.plan_id, "Apply called without confirmation; nothing done");
            return Err(MigrateError::NotConfirmed);
        }
        if plan.executed {
            return Err(MigrateError::AlreadyExecuted(plan.plan_id.clone()));
        }

        let progress = self.progress.as_ref();
        emit(progress, "Creating backup...");
        let backup_location = self.backup.create_backup(plan).map_err(|e| {
            error!(plan_id = %plan.plan_id, code = e.code(), error = %e, "Backup failed; migration aborted");
            e
        })?;
        let mut state = ApplyState::BackedUp;
        info!(plan_id = %plan.plan_id, ?state, backup = %backup_location.display(), "Backup complete");

        plan.executed = true;
        plan.execution_time = Some(Utc::now());
        state = ApplyState::Executing;
        let total = plan.steps.len();
        info!(plan_id = %plan.plan_id, ?state, steps = total, "Executing steps");

        let mut failed_step = None;
        let mut cancelled = false;
        let mut stop_at = total;
        for i in 0..total {
            if (self.cancel)() {
                warn!(plan_id = %plan.plan_id, next_step = i + 1, "Cancellation requested; rolling back");
                cancelled = true;
                stop_at = i;
                break;
            }
            let step = &mut plan.steps[i];
            emit(progress, &format!("[{}/{}] {}", i + 1, total, step.description));
            if let Err(e) = self.executor.execute(step) {
                error!(plan_id = %plan.plan_id, step_id = %step.step_id, index = i + 1, error = %e, "Step failed");
                failed_step = Some(FailedStep {
                    index: i + 1,
                    step_id: step.step_id.clone(),
                    description: step.description.clone(),
                    error: e.to_string(),
                });
                stop_at = i;
                break;
            }
        }

        let mut rollback = None;
        if failed_step.is_some() || cancelled {
            emit(progress, "Rolling back executed steps...");
            let report = self.rollback.rollback(&plan.steps[..stop_at]);
            if !report.is_clean() {
                warn!(plan_id = %plan.plan_id, failures = report.failures.len(), "Rollback finished with failures");
            }
            rollback = Some(report);
            plan.success = false;
            state = ApplyState::RolledBack;
        } else {
            plan.success = true;
            state = ApplyState::Completed;
            emit(progress, "Migration completed");
        }

        if let Err(e) = self.history.record(plan) {
            error!(plan_id = %plan.plan_id, code = e.code(), error = %e, "Failed to record plan in history");
        }
        info!(plan_id = %plan.plan_id, ?state, success = plan.success, "Apply finished");

        Ok(ApplyReport {
            plan_id: plan.plan_id.clone(),
            state,
            success: plan.success,
            executed_steps: plan.steps.iter().filter(|s| s.executed).count(),
            failed_step,
            cancelled,
            rollback_attempted: rollback.is_some(),
            rollback,
            backup_location: Some(backup_location),
        })
    }
}
