//! Directory trees moved and copied by Apply, then restored by rollback.

use assert_fs::TempDir;
use assert_fs::prelude::*;
use std::fs;

use emu_migrate::prelude::*;

fn orchestrator(base: &TempDir, backups: &TempDir) -> MigrationOrchestrator {
    MigrationOrchestrator::new(
        BackupManager::new(base.path(), backups.path()).with_critical_paths(Vec::new()),
        StepExecutor::default(),
        HistoryStore::new(backups.path()),
    )
    .with_cancel_check(|| false)
}

#[test]
fn moved_tree_is_restored_when_a_later_step_fails() {
    let base = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    base.child("melonDS/bios/bios7.bin").write_str("arm7").unwrap();
    base.child("melonDS/bios/bios9.bin").write_str("arm9").unwrap();
    base.child("Emulators/melonDS").create_dir_all().unwrap();

    let mut plan = MigrationPlan::new("plan_tree", "tree").with_steps([
        MigrationStep::move_file(
            "move_001",
            base.child("melonDS/bios").path(),
            base.child("Emulators/melonDS/bios").path(),
            "move bios",
        ),
        MigrationStep::copy_file(
            "copy_001",
            base.child("nowhere").path(),
            base.child("Emulators/melonDS/extra").path(),
            "copy missing",
        ),
    ]);

    let report = orchestrator(&base, &backups).apply(&mut plan, true).unwrap();

    assert!(!report.success);
    assert_eq!(report.rollback.unwrap().undone, ["move_001"]);
    assert_eq!(fs::read_to_string(base.child("melonDS/bios/bios7.bin").path()).unwrap(), "arm7");
    assert_eq!(fs::read_to_string(base.child("melonDS/bios/bios9.bin").path()).unwrap(), "arm9");
    assert!(!base.child("Emulators/melonDS/bios").path().exists());
    assert!(base.child("Emulators/melonDS").path().is_dir(), "pre-existing parent is kept");
}

#[test]
fn copied_tree_is_removed_by_rollback_and_source_kept() {
    let base = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    base.child("shaders/crt/crt.glsl").write_str("void main(){}").unwrap();
    base.child("shaders/lcd.glsl").touch().unwrap();

    let mut plan = MigrationPlan::new("plan_copy", "copy").with_steps([
        MigrationStep::copy_file(
            "copy_001",
            base.child("shaders").path(),
            base.child("Emulation/shaders").path(),
            "copy shaders",
        ),
        MigrationStep::move_file(
            "move_001",
            base.child("shaders/lcd.glsl").path(),
            base.child("Emulation/shaders/lcd.glsl").path(),
            "target already present",
        ),
    ]);

    let report = orchestrator(&base, &backups).apply(&mut plan, true).unwrap();

    assert!(!report.success);
    let failed = report.failed_step.unwrap();
    assert_eq!(failed.step_id, "move_001");
    assert!(failed.error.contains("refusing to overwrite"), "{}", failed.error);
    assert!(!base.child("Emulation").path().exists());
    assert!(base.child("shaders/crt/crt.glsl").path().is_file());
    assert!(base.child("shaders/lcd.glsl").path().is_file());
}

#[test]
fn copy_of_a_tree_succeeds_intact() {
    let base = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    base.child("configs/a/one.ini").write_str("1").unwrap();
    base.child("configs/b/two.ini").write_str("2").unwrap();

    let mut plan = MigrationPlan::new("plan_ok", "ok").with_steps([MigrationStep::copy_file(
        "copy_001",
        base.child("configs").path(),
        base.child("Emulation/configs").path(),
        "copy configs",
    )]);
    let report = orchestrator(&base, &backups).apply(&mut plan, true).unwrap();

    assert!(report.success);
    assert_eq!(fs::read_to_string(base.child("Emulation/configs/a/one.ini").path()).unwrap(), "1");
    assert_eq!(fs::read_to_string(base.child("Emulation/configs/b/two.ini").path()).unwrap(), "2");
    assert_eq!(plan.steps[0].rollback_info.target_existed, Some(false));
}

#[cfg(unix)]
#[test]
fn failed_tree_copy_leaves_nothing_for_rollback_to_keep() {
    let base = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    base.child("saves/nds/pokemon.sav").write_str("save").unwrap();
    base.child("saves/snes/zelda.srm").write_str("srm").unwrap();
    let _sock = std::os::unix::net::UnixListener::bind(base.child("saves/nds/sync.sock").path()).unwrap();

    let mut plan = MigrationPlan::new("plan_partial", "partial").with_steps([
        MigrationStep::create_directory("mkdir_001", base.child("Emulation").path(), "Emulation"),
        MigrationStep::copy_file(
            "copy_002",
            base.child("saves").path(),
            base.child("Emulation/saves").path(),
            "copy saves",
        ),
    ]);

    let report = orchestrator(&base, &backups).apply(&mut plan, true).unwrap();

    assert!(!report.success);
    assert_eq!(report.state, ApplyState::RolledBack);
    assert_eq!(report.failed_step.unwrap().step_id, "copy_002");
    let rollback = report.rollback.unwrap();
    assert_eq!(rollback.undone, ["mkdir_001"]);
    assert!(rollback.left_in_place.is_empty(), "{:?}", rollback.left_in_place);
    assert!(!base.child("Emulation").path().exists());
    assert_eq!(fs::read_to_string(base.child("saves/nds/pokemon.sav").path()).unwrap(), "save");
}
