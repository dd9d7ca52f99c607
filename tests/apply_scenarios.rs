//! End-to-end Apply behaviour on real temp trees.

use std::fs;
use std::path::Path;
use tempfile::tempdir;

use emu_migrate::backup::{BackupManager, PLAN_ARTIFACT};
use emu_migrate::executor::StepExecutor;
use emu_migrate::history::HistoryStore;
use emu_migrate::orchestrator::{ApplyState, MigrationOrchestrator};
use emu_migrate::{MigrateError, MigrationPlan, MigrationStep};

fn orchestrator(base: &Path, backups: &Path) -> MigrationOrchestrator {
    MigrationOrchestrator::new(
        BackupManager::new(base, backups),
        StepExecutor::default(),
        HistoryStore::new(backups),
    )
    .with_cancel_check(|| false)
}

fn three_dirs(base: &Path) -> MigrationPlan {
    MigrationPlan::new("plan_three", "three directories").with_steps([
        MigrationStep::create_directory("mkdir_001", base.join("Emulation"), "Emulation"),
        MigrationStep::create_directory("mkdir_002", base.join("Roms"), "Roms"),
        MigrationStep::create_directory("mkdir_003", base.join("Emulators"), "Emulators"),
    ])
}

#[test]
fn three_new_directories_complete() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let mut plan = three_dirs(base.path());

    let report = orchestrator(base.path(), backups.path()).apply(&mut plan, true).unwrap();

    assert!(report.success);
    assert_eq!(report.state, ApplyState::Completed);
    assert!(plan.executed && plan.success);
    assert!(plan.execution_time.is_some());
    for d in ["Emulation", "Roms", "Emulators"] {
        assert!(base.path().join(d).is_dir(), "{d} should exist");
    }
    assert!(plan.steps.iter().all(|s| s.rollback_info.existed_before == Some(false)));
}

#[test]
fn failing_link_rolls_back_created_directories() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let mut plan = MigrationPlan::new("plan_fail", "fails at step 3").with_steps([
        MigrationStep::create_directory("mkdir_001", base.path().join("Emulation"), "Emulation"),
        MigrationStep::create_directory("mkdir_002", base.path().join("Roms"), "Roms"),
        MigrationStep::create_symlink(
            "symlink_001",
            base.path().join("does-not-exist"),
            base.path().join("Emulation/roms/nds"),
            "dangling",
        ),
    ]);

    let report = orchestrator(base.path(), backups.path()).apply(&mut plan, true).unwrap();

    assert!(!report.success);
    assert_eq!(report.state, ApplyState::RolledBack);
    let failed = report.failed_step.expect("failed step reported");
    assert_eq!(failed.index, 3);
    assert_eq!(failed.step_id, "symlink_001");
    assert!(report.rollback_attempted);
    assert_eq!(report.rollback.unwrap().undone, ["mkdir_002", "mkdir_001"]);

    assert!(!base.path().join("Emulation").exists());
    assert!(!base.path().join("Roms").exists());
    assert!(plan.steps[2].error.is_some());
    assert!(plan.executed && !plan.success);
}

#[test]
fn preexisting_directories_survive_rollback() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    fs::create_dir(base.path().join("Roms")).unwrap();
    fs::write(base.path().join("Roms/keep.txt"), b"keep").unwrap();
    let mut plan = MigrationPlan::new("plan_keep", "keep").with_steps([
        MigrationStep::create_directory("mkdir_001", base.path().join("Roms"), "Roms"),
        MigrationStep::copy_file("copy_001", base.path().join("missing"), base.path().join("Roms/copy"), "copy"),
    ]);

    let report = orchestrator(base.path(), backups.path()).apply(&mut plan, true).unwrap();

    assert!(!report.success);
    assert_eq!(plan.steps[0].rollback_info.existed_before, Some(true));
    assert_eq!(fs::read(base.path().join("Roms/keep.txt")).unwrap(), b"keep");
}

#[test]
fn unconfirmed_apply_is_rejected_without_side_effects() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let mut plan = three_dirs(base.path());

    let err = orchestrator(base.path(), backups.path()).apply(&mut plan, false).unwrap_err();

    assert!(matches!(err, MigrateError::NotConfirmed));
    assert!(!plan.executed);
    assert!(plan.backup_location.is_none());
    assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(backups.path()).unwrap().count(), 0);
}

#[test]
fn executed_plan_cannot_be_applied_again() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let orch = orchestrator(base.path(), backups.path());
    let mut plan = three_dirs(base.path());
    orch.apply(&mut plan, true).unwrap();
    let backups_before = fs::read_dir(backups.path()).unwrap().count();

    let err = orch.apply(&mut plan, true).unwrap_err();

    assert!(matches!(err, MigrateError::AlreadyExecuted(id) if id == "plan_three"));
    assert_eq!(fs::read_dir(backups.path()).unwrap().count(), backups_before);
}

#[test]
fn backup_artifact_exists_after_success_and_failure() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let orch = orchestrator(base.path(), backups.path());

    let mut ok = three_dirs(base.path());
    orch.apply(&mut ok, true).unwrap();
    let mut bad = MigrationPlan::new("plan_bad", "bad").with_steps([MigrationStep::move_file(
        "move_001",
        base.path().join("nothing"),
        base.path().join("elsewhere"),
        "move",
    )]);
    orch.apply(&mut bad, true).unwrap();

    for plan in [&ok, &bad] {
        let loc = plan.backup_location.as_ref().expect("backup location set");
        let saved = MigrationPlan::from_json(&fs::read_to_string(loc.join(PLAN_ARTIFACT)).unwrap()).unwrap();
        assert_eq!(saved.plan_id, plan.plan_id);
        assert!(saved.executed, "artifact is re-recorded after execution");
        assert_eq!(saved.success, plan.success);
    }
}

#[test]
fn backup_failure_aborts_before_any_step() {
    let base = tempdir().unwrap();
    let blocker = base.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();
    let orch = orchestrator(base.path(), &blocker.join("backups"));
    let mut plan = three_dirs(base.path());

    let err = orch.apply(&mut plan, true).unwrap_err();

    assert!(matches!(err, MigrateError::Backup { .. }));
    assert!(!plan.executed);
    assert!(!base.path().join("Emulation").exists());
}
