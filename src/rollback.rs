//! Reverse-order, best-effort undo of executed steps.
//!
//! Each undo failure is logged and recorded, never raised: the remaining
//! steps are still undone. Non-empty directories are left in place.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::StepError;
use crate::fs_ops::{move_path, path_occupied, remove_created_dirs, remove_path};
use crate::model::{MigrationStep, RollbackInfo, StepAction};
use crate::platform;
use crate::symlink::SymlinkStrategy;

#[derive(Debug, Clone, Serialize)]
pub struct RollbackFailure {
    pub step_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    /// Step ids undone, in the order they were undone.
    pub undone: Vec<String>,
    pub failures: Vec<RollbackFailure>,
    /// Paths deliberately left behind (non-empty directories).
    pub left_in_place: Vec<String>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RollbackCoordinator {
    links: Arc<SymlinkStrategy>,
}

impl RollbackCoordinator {
    pub fn new(links: Arc<SymlinkStrategy>) -> Self {
        Self { links }
    }

    /// Undo `steps` last-to-first. Steps that did not complete are skipped;
    /// a failed step cleans up after itself.
    pub fn rollback(&self, steps: &[MigrationStep]) -> RollbackReport {
        let mut report = RollbackReport::default();
        for step in steps.iter().rev().filter(|s| s.succeeded()) {
            match self.undo(step, &mut report) {
                Ok(()) => {
                    info!(step_id = %step.step_id, "Rolled back step");
                    report.undone.push(step.step_id.clone());
                }
                Err(e) => {
                    warn!(step_id = %step.step_id, error = %e, "Rollback of step failed; continuing");
                    report.failures.push(RollbackFailure {
                        step_id: step.step_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn undo(&self, step: &MigrationStep, report: &mut RollbackReport) -> Result<(), StepError> {
        let info = &step.rollback_info;
        match &step.action {
            StepAction::CreateDirectory { target_path } => {
                if info.existed_before != Some(false) {
                    return Ok(());
                }
                if info.created_dirs.is_empty() {
                    // Plans recorded without parent tracking: remove the target only.
                    if target_path.is_dir() && fs::remove_dir(target_path).is_err() {
                        leave(report, target_path);
                    }
                    return Ok(());
                }
            }
            StepAction::CreateSymlink { target_path, .. } => self.undo_link(target_path, info)?,
            StepAction::MoveFile {
                source_path,
                target_path,
            } => undo_move(source_path, target_path)?,
            StepAction::CopyFile { target_path, .. } => {
                if info.target_existed == Some(false) && path_occupied(target_path) {
                    remove_path(target_path).map_err(StepError::io("remove copy", target_path))?;
                }
            }
        }
        for kept in remove_created_dirs(&info.created_dirs) {
            leave(report, &kept);
        }
        Ok(())
    }

    fn undo_link(&self, link: &Path, info: &RollbackInfo) -> Result<(), StepError> {
        if path_occupied(link) {
            if !platform::is_link_like(link) {
                return Err(StepError::TargetNotSymlink(link.to_path_buf()));
            }
            platform::remove_link(link).map_err(StepError::io("remove link", link))?;
        }
        if info.was_symlink == Some(true)
            && let Some(old) = &info.old_target
        {
            self.links.create(old, link)?;
            info!(link = %link.display(), target = %old.display(), "Restored previous link");
        }
        Ok(())
    }
}

fn undo_move(source: &Path, target: &Path) -> Result<(), StepError> {
    if !path_occupied(target) {
        return Err(StepError::io("move back", target)(io::Error::from(io::ErrorKind::NotFound)));
    }
    if path_occupied(source) {
        return Err(StepError::TargetExists(source.to_path_buf()));
    }
    if let Some(parent) = source.parent() {
        fs::create_dir_all(parent).map_err(StepError::io("recreate source parent", parent))?;
    }
    move_path(target, source).map_err(StepError::io("move back", target))?;
    Ok(())
}

fn leave(report: &mut RollbackReport, path: &Path) {
    warn!(path = %path.display(), "Directory not empty; left in place");
    report.left_in_place.push(path.display().to_string());
}
