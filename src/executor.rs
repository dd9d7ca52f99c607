//! Executes one migration step and records what is needed to undo it.
//!
//! `run` is the pure result form (`StepOutcome`); `execute` applies the outcome
//! to a `MigrationStep`. A failing step removes the parent directories it
//! created itself, so undoing only the successful prefix restores the tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::StepError;
use crate::fs_ops::{copy_path, create_dir_all_tracked, move_path, path_occupied, remove_created_dirs};
use crate::model::{LinkMethod, MigrationStep, RollbackInfo, StepAction};
use crate::platform;
use crate::symlink::SymlinkStrategy;

/// Result of running one action: always the captured undo state, plus the
/// error if the action failed.
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub rollback_info: RollbackInfo,
    pub error: Option<StepError>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Resolve a link source relative to the directory holding the link.
pub fn resolve_link_source(source: &Path, link: &Path) -> PathBuf {
    match link.parent() {
        Some(parent) if source.is_relative() => parent.join(source),
        _ => source.to_path_buf(),
    }
}

#[derive(Debug, Clone)]
pub struct StepExecutor {
    links: Arc<SymlinkStrategy>,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new(Arc::new(SymlinkStrategy::default()))
    }
}

impl StepExecutor {
    pub fn new(links: Arc<SymlinkStrategy>) -> Self {
        Self { links }
    }

    pub fn links(&self) -> &Arc<SymlinkStrategy> {
        &self.links
    }

    /// Execute `step`, marking it executed and recording rollback info and error.
    pub fn execute(&self, step: &mut MigrationStep) -> Result<(), StepError> {
        debug!(step_id = %step.step_id, action = %step.kind(), "Executing step");
        let outcome = self.run(&step.action);
        step.executed = true;
        step.rollback_info = outcome.rollback_info;
        match outcome.error {
            None => {
                step.error = None;
                Ok(())
            }
            Some(err) => {
                warn!(step_id = %step.step_id, error = %err, "Step failed");
                step.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn run(&self, action: &StepAction) -> StepOutcome {
        let mut info = RollbackInfo::default();
        let result = match action {
            StepAction::CreateDirectory { target_path } => create_directory(target_path, &mut info),
            StepAction::CreateSymlink {
                source_path,
                target_path,
            } => self.create_symlink(source_path, target_path, &mut info),
            StepAction::MoveFile {
                source_path,
                target_path,
            } => transfer(source_path, target_path, &mut info, Transfer::Move),
            StepAction::CopyFile {
                source_path,
                target_path,
            } => transfer(source_path, target_path, &mut info, Transfer::Copy),
        };

        let error = result.err();
        if error.is_some() && !info.created_dirs.is_empty() {
            let kept = remove_created_dirs(&info.created_dirs);
            if !kept.is_empty() {
                warn!(dirs = ?kept, "failed step left created directories in place");
            }
            info.created_dirs = kept;
        }
        StepOutcome {
            rollback_info: info,
            error,
        }
    }

    fn create_symlink(&self, source: &Path, link: &Path, info: &mut RollbackInfo) -> Result<(), StepError> {
        let existed = path_occupied(link);
        let was_link = existed && platform::is_link_like(link);
        info.target_existed = Some(existed);
        info.was_symlink = Some(was_link);
        if was_link {
            info.old_target = fs::read_link(link).ok();
        }
        if existed && !was_link {
            return Err(StepError::TargetNotSymlink(link.to_path_buf()));
        }

        let resolved = resolve_link_source(source, link);
        if !resolved.exists() {
            return Err(StepError::SourceMissing(resolved));
        }

        if was_link {
            if info.old_target.as_deref() == Some(source) {
                info!(link = %link.display(), "Link already points at the requested source");
                info.method_used = Some(LinkMethod::Symlink);
                return Ok(());
            }
            platform::remove_link(link).map_err(StepError::io("remove existing link", link))?;
        } else if let Some(parent) = link.parent() {
            create_dir_all_tracked(parent, &mut info.created_dirs)
                .map_err(StepError::io("create link parent", parent))?;
        }

        match self.links.create(source, link) {
            Ok(method) => {
                info.method_used = Some(method);
                Ok(())
            }
            Err(e) => {
                if let Some(old) = &info.old_target
                    && let Err(restore) = self.links.create(old, link)
                {
                    warn!(link = %link.display(), error = %restore, "failed to restore previous link");
                }
                Err(e.into())
            }
        }
    }
}

fn create_directory(target: &Path, info: &mut RollbackInfo) -> Result<(), StepError> {
    let existed = target.is_dir();
    info.existed_before = Some(existed);
    if existed {
        debug!(path = %target.display(), "Directory already exists; skipping");
        return Ok(());
    }
    if path_occupied(target) {
        info.existed_before = Some(true);
        return Err(StepError::TargetExists(target.to_path_buf()));
    }
    create_dir_all_tracked(target, &mut info.created_dirs).map_err(StepError::io("create directory", target))?;
    info!(path = %target.display(), "Created directory");
    Ok(())
}

#[derive(Clone, Copy)]
enum Transfer {
    Move,
    Copy,
}

fn transfer(source: &Path, target: &Path, info: &mut RollbackInfo, kind: Transfer) -> Result<(), StepError> {
    let source_existed = path_occupied(source);
    let target_existed = path_occupied(target);
    info.source_existed = Some(source_existed);
    info.target_existed = Some(target_existed);

    if target_existed {
        return Err(StepError::TargetExists(target.to_path_buf()));
    }
    if !source_existed {
        warn!(source = %source.display(), "Source is missing; attempting anyway");
    }
    if let Some(parent) = target.parent() {
        create_dir_all_tracked(parent, &mut info.created_dirs)
            .map_err(StepError::io("create destination parent", parent))?;
    }

    match kind {
        Transfer::Move => {
            let method = move_path(source, target).map_err(StepError::io("move", source))?;
            info!(source = %source.display(), target = %target.display(), ?method, "Moved");
        }
        Transfer::Copy => {
            let stats = copy_path(source, target).map_err(StepError::io("copy", source))?;
            info!(source = %source.display(), target = %target.display(), files = stats.files, bytes = stats.bytes, "Copied");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn existing_directory_records_existed_before() {
        let td = tempdir().unwrap();
        let exec = StepExecutor::default();
        let mut step = MigrationStep::create_directory("mkdir_001", td.path(), "base");
        exec.execute(&mut step).unwrap();
        assert!(step.executed);
        assert_eq!(step.rollback_info.existed_before, Some(true));
        assert!(step.rollback_info.created_dirs.is_empty());
    }

    #[test]
    fn new_directory_tracks_created_parents() {
        let td = tempdir().unwrap();
        let target = td.path().join("Emulation/bios");
        let outcome = StepExecutor::default().run(&StepAction::CreateDirectory {
            target_path: target.clone(),
        });
        assert!(outcome.is_ok());
        assert_eq!(outcome.rollback_info.existed_before, Some(false));
        assert_eq!(outcome.rollback_info.created_dirs, vec![td.path().join("Emulation"), target.clone()]);
        assert!(target.is_dir());
    }

    #[test]
    fn file_in_the_way_fails_directory_step() {
        let td = tempdir().unwrap();
        let target = td.path().join("Roms");
        fs::write(&target, b"not a dir").unwrap();
        let mut step = MigrationStep::create_directory("mkdir_001", &target, "roms");
        let err = StepExecutor::default().execute(&mut step).unwrap_err();
        assert!(matches!(err, StepError::TargetExists(_)));
        assert!(step.executed);
        assert!(step.error.is_some());
    }

    #[test]
    fn symlink_with_missing_source_fails_and_cleans_parents() {
        let td = tempdir().unwrap();
        let link = td.path().join("Emulation/roms/nds");
        let mut step = MigrationStep::create_symlink("rom_link_001", "../../Roms/Nintendo DS", &link, "nds");
        let err = StepExecutor::default().execute(&mut step).unwrap_err();
        assert!(matches!(err, StepError::SourceMissing(_)));
        assert!(!td.path().join("Emulation").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_replaces_previous_link_and_records_it() {
        let td = tempdir().unwrap();
        fs::create_dir_all(td.path().join("old")).unwrap();
        fs::create_dir_all(td.path().join("new")).unwrap();
        let link = td.path().join("link");
        std::os::unix::fs::symlink("old", &link).unwrap();

        let mut step = MigrationStep::create_symlink("symlink_001", "new", &link, "relink");
        StepExecutor::default().execute(&mut step).unwrap();
        let info = &step.rollback_info;
        assert_eq!(info.was_symlink, Some(true));
        assert_eq!(info.old_target.as_deref(), Some(Path::new("old")));
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("new"));
    }

    #[test]
    fn symlink_refuses_real_directory_target() {
        let td = tempdir().unwrap();
        fs::create_dir(td.path().join("src")).unwrap();
        fs::create_dir(td.path().join("real")).unwrap();
        let outcome = StepExecutor::default().run(&StepAction::CreateSymlink {
            source_path: td.path().join("src"),
            target_path: td.path().join("real"),
        });
        assert!(matches!(outcome.error, Some(StepError::TargetNotSymlink(_))));
        assert_eq!(outcome.rollback_info.target_existed, Some(true));
    }

    #[test]
    fn move_refuses_occupied_target() {
        let td = tempdir().unwrap();
        let src = td.path().join("a.sav");
        let dst = td.path().join("b.sav");
        fs::write(&src, b"a").unwrap();
        fs::write(&dst, b"b").unwrap();
        let outcome = StepExecutor::default().run(&StepAction::MoveFile {
            source_path: src.clone(),
            target_path: dst.clone(),
        });
        assert!(matches!(outcome.error, Some(StepError::TargetExists(_))));
        assert_eq!(fs::read(&src).unwrap(), b"a");
    }

    #[test]
    fn missing_move_source_fails_on_the_operation() {
        let td = tempdir().unwrap();
        let outcome = StepExecutor::default().run(&StepAction::MoveFile {
            source_path: td.path().join("gone"),
            target_path: td.path().join("deep/dst"),
        });
        assert_eq!(outcome.rollback_info.source_existed, Some(false));
        assert!(matches!(outcome.error, Some(StepError::Io { op: "move", .. })));
        assert!(!td.path().join("deep").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_tree_copy_removes_partial_target_and_new_parents() {
        let td = tempdir().unwrap();
        let src = td.path().join("saves");
        fs::create_dir_all(src.join("nds")).unwrap();
        fs::write(src.join("nds/a.sav"), b"a").unwrap();
        let _sock = std::os::unix::net::UnixListener::bind(src.join("nds/link.sock")).unwrap();

        let outcome = StepExecutor::default().run(&StepAction::CopyFile {
            source_path: src.clone(),
            target_path: td.path().join("Emulation/saves"),
        });
        assert!(matches!(outcome.error, Some(StepError::Io { op: "copy", .. })));
        assert!(outcome.rollback_info.created_dirs.is_empty());
        assert!(!td.path().join("Emulation").exists());
        assert!(src.join("nds/a.sav").is_file());
    }

    #[test]
    fn copy_creates_parent_and_keeps_source() {
        let td = tempdir().unwrap();
        let src = td.path().join("bios.bin");
        fs::write(&src, b"bios").unwrap();
        let dst = td.path().join("Emulation/bios/bios.bin");
        let outcome = StepExecutor::default().run(&StepAction::CopyFile {
            source_path: src.clone(),
            target_path: dst.clone(),
        });
        assert!(outcome.is_ok());
        assert_eq!(fs::read(&dst).unwrap(), b"bios");
        assert!(src.exists());
        assert_eq!(outcome.rollback_info.target_existed, Some(false));
    }
}
