//! Durable record of applied plans, read back from backup directories.
//!
//! Notes:
//! - The store has no index: each `migration_backup_*` directory under the
//!   backup root holds one `migration_plan.json`, overwritten atomically when
//!   a plan reaches a terminal state or is rolled back.
//! - Unreadable artifacts are skipped with a warning, never fatal for listing.
//!
//! Status mapping:
//! - `failed`: the apply stopped on a step error or an interrupt. Its executed
//!   prefix was already rolled back by the orchestrator (`ApplyState::RolledBack`),
//!   which is why `rollback_by_id` refuses such plans.
//! - `rolled_back`: a completed plan later undone with `rollback_by_id`.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backup::{BACKUP_DIR_PREFIX, BACKUP_TIMESTAMP_FORMAT, PLAN_ARTIFACT};
use crate::errors::MigrateError;
use crate::fs_ops::{describe_io_error, write_atomic};
use crate::model::MigrationPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
}

impl PlanStatus {
    /// `Failed` also covers applies that ended in an automatic rollback.
    pub fn of(plan: &MigrationPlan) -> Self {
        if plan.rolled_back {
            PlanStatus::RolledBack
        } else if !plan.executed {
            PlanStatus::Pending
        } else if plan.success {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub plan_id: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub status: PlanStatus,
    pub executed: bool,
    pub success: bool,
    pub rolled_back: bool,
    pub total_steps: usize,
    pub failed_steps: usize,
    pub backup_location: PathBuf,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    backup_root: PathBuf,
}

impl HistoryStore {
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Persist `plan` into its backup directory, replacing the previous artifact.
    pub fn record(&self, plan: &MigrationPlan) -> Result<PathBuf, MigrateError> {
        let location = plan.backup_location.as_ref().ok_or_else(|| {
            MigrateError::history(&self.backup_root, format!("plan {} has no backup location", plan.plan_id))
        })?;
        let artifact = location.join(PLAN_ARTIFACT);
        let json = plan
            .to_json()
            .map_err(|e| MigrateError::history(&artifact, format!("serialize plan: {e}")))?;
        write_atomic(&artifact, json.as_bytes(), false).map_err(|e| MigrateError::history(&artifact, e.to_string()))?;
        info!(plan_id = %plan.plan_id, status = %PlanStatus::of(plan), artifact = %artifact.display(), "Recorded plan");
        Ok(artifact)
    }

    /// All recorded plans, newest first.
    pub fn list(&self) -> Result<Vec<HistoryEntry>, MigrateError> {
        let mut found = self.scan(None)?;
        found.sort_by_cached_key(|(dir, plan)| std::cmp::Reverse(recency(dir, plan)));
        Ok(found.iter().map(|(dir, plan)| entry_for(dir, plan)).collect())
    }

    pub fn status(&self, plan_id: &str) -> Result<Option<HistoryEntry>, MigrateError> {
        Ok(self.newest(plan_id)?.map(|(dir, plan)| entry_for(&dir, &plan)))
    }

    pub fn load(&self, plan_id: &str) -> Result<Option<MigrationPlan>, MigrateError> {
        Ok(self.newest(plan_id)?.map(|(_, plan)| plan))
    }

    fn newest(&self, plan_id: &str) -> Result<Option<(PathBuf, MigrationPlan)>, MigrateError> {
        Ok(self
            .scan(Some(plan_id))?
            .into_iter()
            .max_by_key(|(dir, plan)| recency(dir, plan)))
    }

    fn scan(&self, plan_id: Option<&str>) -> Result<Vec<(PathBuf, MigrationPlan)>, MigrateError> {
        let read = match fs::read_dir(&self.backup_root) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MigrateError::history(
                    &self.backup_root,
                    describe_io_error("list backups", &self.backup_root, &e),
                ));
            }
        };

        let prefix = match plan_id {
            Some(id) => format!("{BACKUP_DIR_PREFIX}{id}_"),
            None => BACKUP_DIR_PREFIX.to_string(),
        };
        let mut found = Vec::new();
        for entry in read.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) {
                continue;
            }
            let dir = entry.path();
            let artifact = dir.join(PLAN_ARTIFACT);
            let plan = match fs::read_to_string(&artifact) {
                Ok(raw) => match MigrationPlan::from_json(&raw) {
                    Ok(plan) => plan,
                    Err(e) => {
                        warn!(path = %artifact.display(), error = %e, "Skipping malformed plan artifact");
                        continue;
                    }
                },
                Err(e) => {
                    debug!(path = %artifact.display(), error = %e, "Backup directory without plan artifact");
                    continue;
                }
            };
            if plan_id.is_some_and(|id| id != plan.plan_id) {
                continue;
            }
            found.push((dir, plan));
        }
        Ok(found)
    }
}

fn entry_for(dir: &Path, plan: &MigrationPlan) -> HistoryEntry {
    HistoryEntry {
        plan_id: plan.plan_id.clone(),
        description: plan.description.clone(),
        timestamp: dir_timestamp(dir, &plan.plan_id).unwrap_or(plan.created_at),
        status: PlanStatus::of(plan),
        executed: plan.executed,
        success: plan.success,
        rolled_back: plan.rolled_back,
        total_steps: plan.total_steps(),
        failed_steps: plan.failed_steps(),
        backup_location: dir.to_path_buf(),
    }
}

/// Ordering key: directory timestamp, then the `_n` collision suffix.
fn recency(dir: &Path, plan: &MigrationPlan) -> (DateTime<Utc>, u32) {
    (
        dir_timestamp(dir, &plan.plan_id).unwrap_or(plan.created_at),
        dir_suffix(dir, &plan.plan_id).unwrap_or(0),
    )
}

/// `<YYYYmmdd_HHMMSS>[_n]` part of `migration_backup_<plan_id>_...`.
fn dir_stamp<'a>(dir: &'a Path, plan_id: &str) -> Option<&'a str> {
    let name = dir.file_name()?.to_str()?;
    name.strip_prefix(BACKUP_DIR_PREFIX)?.strip_prefix(plan_id)?.strip_prefix('_')
}

fn dir_suffix(dir: &Path, plan_id: &str) -> Option<u32> {
    dir_stamp(dir, plan_id)?.get(15..)?.strip_prefix('_')?.parse().ok()
}

/// Local timestamp encoded in `migration_backup_<plan_id>_<YYYYmmdd_HHMMSS>[_n]`.
fn dir_timestamp(dir: &Path, plan_id: &str) -> Option<DateTime<Utc>> {
    let stamp = dir_stamp(dir, plan_id)?.get(..15)?;
    let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recorded(root: &Path, dir_name: &str, plan: &mut MigrationPlan) {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        plan.backup_location = Some(dir);
        HistoryStore::new(root).record(plan).unwrap();
    }

    #[test]
    fn list_is_newest_first_with_statuses() {
        let td = tempdir().unwrap();
        let mut old = MigrationPlan::new("plan_old", "old");
        old.executed = true;
        old.success = true;
        recorded(td.path(), "migration_backup_plan_old_20240101_090000", &mut old);

        let mut new = MigrationPlan::new("plan_new", "new");
        new.executed = true;
        recorded(td.path(), "migration_backup_plan_new_20240301_120000", &mut new);

        let mut pending = MigrationPlan::new("plan_mid", "mid");
        recorded(td.path(), "migration_backup_plan_mid_20240201_100000", &mut pending);

        let entries = HistoryStore::new(td.path()).list().unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.plan_id.as_str()).collect();
        assert_eq!(ids, ["plan_new", "plan_mid", "plan_old"]);
        assert_eq!(entries[0].status, PlanStatus::Failed);
        assert_eq!(entries[1].status, PlanStatus::Pending);
        assert_eq!(entries[2].status, PlanStatus::Completed);
    }

    #[test]
    fn automatic_rollback_reads_as_failed_and_explicit_as_rolled_back() {
        let mut plan = MigrationPlan::new("plan_s", "s");
        plan.executed = true;
        assert_eq!(PlanStatus::of(&plan), PlanStatus::Failed);
        plan.success = true;
        assert_eq!(PlanStatus::of(&plan), PlanStatus::Completed);
        plan.rolled_back = true;
        assert_eq!(PlanStatus::of(&plan), PlanStatus::RolledBack);
        assert_eq!(PlanStatus::RolledBack.to_string(), "rolled_back");
    }

    #[test]
    fn malformed_artifacts_and_foreign_dirs_are_skipped() {
        let td = tempdir().unwrap();
        fs::create_dir_all(td.path().join("migration_backup_plan_bad_20240101_000000")).unwrap();
        fs::write(td.path().join("migration_backup_plan_bad_20240101_000000").join(PLAN_ARTIFACT), b"{oops").unwrap();
        fs::create_dir_all(td.path().join("unrelated")).unwrap();
        assert!(HistoryStore::new(td.path()).list().unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_empty_history() {
        let td = tempdir().unwrap();
        let store = HistoryStore::new(td.path().join("never-created"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.load("plan_x").unwrap().is_none());
    }

    #[test]
    fn load_by_id_does_not_match_prefix_of_other_ids() {
        let td = tempdir().unwrap();
        let mut a = MigrationPlan::new("plan_a", "a");
        recorded(td.path(), "migration_backup_plan_a_20240101_000000", &mut a);
        let mut ab = MigrationPlan::new("plan_a_b", "ab");
        recorded(td.path(), "migration_backup_plan_a_b_20240102_000000", &mut ab);

        let store = HistoryStore::new(td.path());
        assert_eq!(store.load("plan_a").unwrap().unwrap().description, "a");
        assert_eq!(store.status("plan_a_b").unwrap().unwrap().description, "ab");
    }

    #[test]
    fn record_requires_backup_location() {
        let td = tempdir().unwrap();
        let plan = MigrationPlan::new("plan_nobackup", "x");
        assert!(matches!(
            HistoryStore::new(td.path()).record(&plan),
            Err(MigrateError::History { .. })
        ));
    }

    #[test]
    fn same_second_directories_order_by_suffix() {
        let td = tempdir().unwrap();
        for (suffix, desc) in [("_2", "third"), ("", "first"), ("_10", "eleventh"), ("_1", "second")] {
            let mut plan = MigrationPlan::new("plan_dup", desc);
            recorded(td.path(), &format!("migration_backup_plan_dup_20240101_090000{suffix}"), &mut plan);
        }
        let store = HistoryStore::new(td.path());

        assert_eq!(store.load("plan_dup").unwrap().unwrap().description, "eleventh");
        let order: Vec<_> = store.list().unwrap().into_iter().map(|e| e.description).collect();
        assert_eq!(order, ["eleventh", "third", "second", "first"]);
    }

    #[test]
    fn dir_timestamp_parses_suffixed_names() {
        let dir = Path::new("/b/migration_backup_plan_x_20240102_030405_1");
        let t = dir_timestamp(dir, "plan_x").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(t, expected);
    }
}
