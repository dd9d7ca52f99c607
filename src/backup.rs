//! Pre-execution snapshot.
//!
//! For each plan a directory `migration_backup_<plan_id>_<YYYYmmdd_HHMMSS>` is
//! created under the backup root. It receives a copy of every critical
//! subtree that exists under the base path, then the serialized plan
//! (`migration_plan.json`) with `backup_location` already set.
//! Any failure here removes the incomplete directory and aborts the
//! migration before a single step runs.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::MigrateError;
use crate::fs_ops::{copy_path, describe_io_error, remove_path, write_atomic};
use crate::model::MigrationPlan;

pub const BACKUP_DIR_PREFIX: &str = "migration_backup_";
pub const PLAN_ARTIFACT: &str = "migration_plan.json";
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Subtrees (relative to the base path) copied before any mutation.
pub fn default_critical_paths() -> Vec<PathBuf> {
    ["Emulation/configs", "Emulation/saves", "config"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    base_path: PathBuf,
    backup_root: PathBuf,
    critical_paths: Vec<PathBuf>,
}

impl BackupManager {
    pub fn new(base_path: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            backup_root: backup_root.into(),
            critical_paths: default_critical_paths(),
        }
    }

    pub fn with_critical_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.critical_paths = paths.into_iter().collect();
        self
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    pub fn critical_paths(&self) -> &[PathBuf] {
        &self.critical_paths
    }

    /// Snapshot critical subtrees and write the plan artifact. Sets
    /// `plan.backup_location` and returns it.
    pub fn create_backup(&self, plan: &mut MigrationPlan) -> Result<PathBuf, MigrateError> {
        fs::create_dir_all(&self.backup_root).map_err(|e| {
            MigrateError::backup(&self.backup_root, describe_io_error("create backup root", &self.backup_root, &e))
        })?;
        let location = self.allocate_dir(&plan.plan_id)?;
        info!(plan_id = %plan.plan_id, location = %location.display(), "Creating backup");

        if let Err(e) = self.fill(&location, plan) {
            plan.backup_location = None;
            if let Err(cleanup) = remove_path(&location) {
                warn!(path = %location.display(), error = %cleanup, "failed to remove incomplete backup");
            }
            return Err(e);
        }
        Ok(location)
    }

    fn fill(&self, location: &Path, plan: &mut MigrationPlan) -> Result<(), MigrateError> {
        for rel in &self.critical_paths {
            let src = self.base_path.join(rel);
            if fs::symlink_metadata(&src).is_err() {
                debug!(path = %src.display(), "Critical path absent; nothing to back up");
                continue;
            }
            let dst = location.join(rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| MigrateError::backup(parent, describe_io_error("create backup subdirectory", parent, &e)))?;
            }
            let stats = copy_path(&src, &dst)
                .map_err(|e| MigrateError::backup(&src, describe_io_error("copy critical path", &src, &e)))?;
            info!(path = %src.display(), files = stats.files, bytes = stats.bytes, "Backed up critical path");
        }

        // The artifact records its own location so history can be re-recorded.
        plan.backup_location = Some(location.to_path_buf());
        let artifact = location.join(PLAN_ARTIFACT);
        let json = plan
            .to_json()
            .map_err(|e| MigrateError::backup(&artifact, format!("serialize plan: {e}")))?;
        write_atomic(&artifact, json.as_bytes(), false).map_err(|e| MigrateError::backup(&artifact, e.to_string()))
    }

    /// Fresh directory for this plan; a numeric suffix breaks same-second ties.
    fn allocate_dir(&self, plan_id: &str) -> Result<PathBuf, MigrateError> {
        let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let base = format!("{BACKUP_DIR_PREFIX}{plan_id}_{stamp}");
        for n in 0..100u32 {
            let name = if n == 0 { base.clone() } else { format!("{base}_{n}") };
            let dir = self.backup_root.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(MigrateError::backup(&dir, describe_io_error("create backup directory", &dir, &e))),
            }
        }
        Err(MigrateError::backup(&self.backup_root, format!("no free backup directory name for {base}")))
    }
}
