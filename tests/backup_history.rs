//! Backups taken by Apply and the history read back from them.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use emu_migrate::backup::{BACKUP_DIR_PREFIX, PLAN_ARTIFACT};
use emu_migrate::prelude::*;

fn orchestrator(base: &Path, backups: &Path, critical: &[&str]) -> MigrationOrchestrator {
    let backup = BackupManager::new(base, backups).with_critical_paths(critical.iter().map(PathBuf::from));
    MigrationOrchestrator::new(backup, StepExecutor::default(), HistoryStore::new(backups)).with_cancel_check(|| false)
}

fn mkdir_plan(id: &str, target: PathBuf) -> MigrationPlan {
    MigrationPlan::new(id, format!("create {}", target.display()))
        .with_steps([MigrationStep::create_directory("mkdir_001", target, "dir")])
}

#[test]
fn critical_subtrees_are_snapshotted_before_steps_run() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    fs::create_dir_all(base.path().join("Emulation/configs/melonDS")).unwrap();
    fs::write(base.path().join("Emulation/configs/melonDS/melonDS.ini"), b"[ui]\nscale=2\n").unwrap();
    fs::write(base.path().join("frontend.cfg"), b"theme=dark").unwrap();

    let orch = orchestrator(base.path(), backups.path(), &["Emulation/configs", "frontend.cfg", "absent"]);
    let mut plan = mkdir_plan("plan_snap", base.path().join("Emulators"));
    let report = orch.apply(&mut plan, true).unwrap();
    assert!(report.success);

    let loc = report.backup_location.expect("backup location reported");
    assert!(loc.starts_with(backups.path()));
    assert!(
        loc.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("{BACKUP_DIR_PREFIX}plan_snap_"))
    );
    assert_eq!(
        fs::read(loc.join("Emulation/configs/melonDS/melonDS.ini")).unwrap(),
        b"[ui]\nscale=2\n"
    );
    assert_eq!(fs::read(loc.join("frontend.cfg")).unwrap(), b"theme=dark");
    assert!(!loc.join("absent").exists());
    assert!(loc.join(PLAN_ARTIFACT).is_file());
}

#[test]
fn history_lists_every_applied_plan_with_its_status() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let orch = orchestrator(base.path(), backups.path(), &[]);

    let mut ok = mkdir_plan("plan_ok", base.path().join("Roms"));
    orch.apply(&mut ok, true).unwrap();
    let mut bad = MigrationPlan::new("plan_bad", "bad").with_steps([MigrationStep::copy_file(
        "copy_001",
        base.path().join("missing.bin"),
        base.path().join("copy.bin"),
        "copy",
    )]);
    orch.apply(&mut bad, true).unwrap();

    let store = orch.history();
    let entries = store.list().unwrap();
    assert_eq!(entries.len(), 2);
    let by_id = |id: &str| entries.iter().find(|e| e.plan_id == id).unwrap().clone();

    let ok_entry = by_id("plan_ok");
    assert_eq!(ok_entry.status, PlanStatus::Completed);
    assert_eq!(ok_entry.total_steps, 1);
    assert_eq!(ok_entry.failed_steps, 0);
    assert_eq!(Some(&ok_entry.backup_location), ok.backup_location.as_ref());

    let bad_entry = by_id("plan_bad");
    assert_eq!(bad_entry.status, PlanStatus::Failed);
    assert_eq!(bad_entry.failed_steps, 1);
    assert!(bad_entry.executed && !bad_entry.success);

    let loaded = store.load("plan_bad").unwrap().unwrap();
    assert!(loaded.steps[0].error.is_some(), "step error survives the round trip");
    assert!(store.status("plan_unknown").unwrap().is_none());
}

#[test]
fn history_entries_serialize_for_json_output() {
    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let orch = orchestrator(base.path(), backups.path(), &[]);
    let mut plan = mkdir_plan("plan_json", base.path().join("Frontends"));
    orch.apply(&mut plan, true).unwrap();

    let entries = orch.history().list().unwrap();
    let value = serde_json::to_value(&entries).unwrap();
    assert_eq!(value[0]["plan_id"], "plan_json");
    assert_eq!(value[0]["status"], "completed");
    assert_eq!(value[0]["rolled_back"], false);
}

#[cfg(unix)]
#[test]
fn fifo_in_a_critical_subtree_fails_the_backup_promptly() {
    use std::os::unix::ffi::OsStrExt;
    use std::sync::mpsc;
    use std::time::Duration;

    let base = tempdir().unwrap();
    let backups = tempdir().unwrap();
    fs::create_dir_all(base.path().join("config")).unwrap();
    fs::write(base.path().join("config/frontend.cfg"), b"x").unwrap();
    let fifo = base.path().join("config/ctl.fifo");
    let c = std::ffi::CString::new(fifo.as_os_str().as_bytes()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(c.as_ptr(), 0o600) }, 0);

    let orch = orchestrator(base.path(), backups.path(), &["config"]);
    let target = base.path().join("Roms");
    let mut plan = mkdir_plan("plan_fifo", target.clone());
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = orch.apply(&mut plan, true);
        let _ = tx.send((result.map(|r| r.success), plan.backup_location.clone()));
    });

    let (result, location) = rx.recv_timeout(Duration::from_secs(10)).expect("apply returned");
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Backup { .. }), "{err}");
    assert!(err.to_string().contains("ctl.fifo"), "{err}");
    assert!(location.is_none());
    assert!(!target.exists(), "no step runs after a failed backup");
    assert_eq!(fs::read_dir(backups.path()).unwrap().count(), 0, "incomplete backup is removed");
}
