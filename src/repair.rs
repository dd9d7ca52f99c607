//! Post-migration repair: retry failed links, check or fix permissions, and
//! locate ROMs and emulator executables that sit outside the layout.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::executor::StepExecutor;
use crate::fs_ops::describe_io_error;
use crate::mapping::LayoutNames;
use crate::model::{ActionKind, MigrationPlan};
use crate::platform;

const WRITE_PROBE: &str = ".emu_migrate_write_probe";

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub success: bool,
    pub fixed: Vec<String>,
    pub failed: Vec<String>,
    pub messages: Vec<String>,
}

/// Retry every `CreateSymlink` step that failed. Fixed steps end up
/// `executed` with no error; the rest keep their new error.
pub fn fix_symlinks(executor: &StepExecutor, plan: &mut MigrationPlan) -> RepairReport {
    let mut report = RepairReport::default();
    for step in plan
        .steps
        .iter_mut()
        .filter(|s| s.kind() == ActionKind::CreateSymlink && s.error.is_some())
    {
        match executor.execute(step) {
            Ok(()) => {
                info!(step_id = %step.step_id, "Repaired link");
                report.messages.push(format!("Fixed {}: {}", step.step_id, step.description));
                report.fixed.push(step.step_id.clone());
            }
            Err(e) => {
                report.messages.push(format!("Still failing {}: {e}", step.step_id));
                report.failed.push(step.step_id.clone());
            }
        }
    }
    if report.fixed.is_empty() && report.failed.is_empty() {
        report.messages.push("No failed symlinks to fix".to_string());
    }
    report.success = report.failed.is_empty();
    report
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionReport {
    pub success: bool,
    pub path: PathBuf,
    pub elevated: bool,
    /// Entries whose permissions were changed; zero in read-only mode.
    pub changed: usize,
    pub messages: Vec<String>,
}

/// Check that `path` is usable. Only when the process already runs elevated
/// are permissions actually granted; elevation is never requested.
pub fn fix_permissions(path: &Path, timeout: Duration) -> PermissionReport {
    let elevated = platform::is_elevated();
    let mut report = PermissionReport {
        success: false,
        path: path.to_path_buf(),
        elevated,
        changed: 0,
        messages: Vec::new(),
    };

    if !path.exists() {
        report.messages.push(format!("{} does not exist", path.display()));
        return report;
    }

    if elevated {
        match platform::grant_access(path, timeout) {
            Ok(n) => {
                report.changed = n;
                report.messages.push(format!("Granted access on {} ({n} entries)", path.display()));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Granting access failed");
                report.messages.push(describe_io_error("grant access", path, &e));
                return report;
            }
        }
    } else {
        report
            .messages
            .push("Not elevated; checking permissions without changing them".to_string());
    }

    let mut ok = true;
    if path.is_dir() {
        if let Err(e) = fs::read_dir(path) {
            ok = false;
            report.messages.push(describe_io_error("list", path, &e));
        }
        let probe = path.join(WRITE_PROBE);
        match fs::write(&probe, b"probe").and_then(|_| fs::remove_file(&probe)) {
            Ok(()) => report.messages.push(format!("{} is writable", path.display())),
            Err(e) => {
                ok = false;
                report.messages.push(describe_io_error("write probe", path, &e));
            }
        }
    } else if let Err(e) = fs::OpenOptions::new().append(true).open(path) {
        ok = false;
        report.messages.push(describe_io_error("open for writing", path, &e));
    }
    report.success = ok;
    report
}

/// Archive and disc-image extensions treated as ROMs.
pub const ROM_EXTENSIONS: &[&str] = &["zip", "7z", "rar", "iso"];
const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "bat", "appimage"];
/// Name fragments of common emulators, matched case-insensitively.
pub const KNOWN_EMULATORS: &[&str] = &["retro", "dolphin", "pcsx", "mame", "snes9x"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FoundKind {
    Roms,
    Emulator,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoundPath {
    pub kind: FoundKind,
    /// Directory relative to the base path.
    pub path: PathBuf,
    pub files: Vec<String>,
    /// Already under the layout directory for its kind.
    pub organized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathScanReport {
    pub success: bool,
    pub base_path: PathBuf,
    pub resolved: Vec<FoundPath>,
    pub unresolved: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Walk `base` (links not followed) for directories holding ROM archives or
/// emulator executables, and suggest where misplaced ones belong.
/// `emulator_names` extends [`KNOWN_EMULATORS`]. Never modifies anything.
pub fn fix_paths(base: &Path, layout: &LayoutNames, emulator_names: &[String]) -> PathScanReport {
    let mut report = PathScanReport {
        success: false,
        base_path: base.to_path_buf(),
        resolved: Vec::new(),
        unresolved: Vec::new(),
        suggestions: Vec::new(),
    };
    if !base.is_dir() {
        report.unresolved.push(format!("Base path does not exist: {}", base.display()));
        return report;
    }

    let needles: Vec<String> = KNOWN_EMULATORS
        .iter()
        .map(|n| n.to_string())
        .chain(emulator_names.iter().map(|n| n.to_lowercase()))
        .filter(|n| !n.is_empty())
        .collect();

    let mut by_dir: BTreeMap<(PathBuf, FoundKind), Vec<String>> = BTreeMap::new();
    for entry in WalkDir::new(base).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let lower = name.to_lowercase();
        let Some(ext) = Path::new(&lower).extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let kind = if ROM_EXTENSIONS.contains(&ext) {
            FoundKind::Roms
        } else if EXECUTABLE_EXTENSIONS.contains(&ext) && needles.iter().any(|n| lower.contains(n.as_str())) {
            FoundKind::Emulator
        } else {
            continue;
        };
        let dir = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(base).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        by_dir.entry((dir, kind)).or_default().push(name);
    }

    for ((dir, kind), files) in by_dir {
        let home = match kind {
            FoundKind::Roms => &layout.roms,
            FoundKind::Emulator => &layout.emulators,
        };
        let organized = dir.starts_with(home);
        let shown = if dir.as_os_str().is_empty() { PathBuf::from(".") } else { dir.clone() };
        if !organized {
            report.suggestions.push(match kind {
                FoundKind::Roms => format!("Move ROMs from {} into {home}/<platform>", shown.display()),
                FoundKind::Emulator => format!("Link {} under {home}/", shown.display()),
            });
        }
        report.resolved.push(FoundPath {
            kind,
            path: shown,
            files,
            organized,
        });
    }

    if report.resolved.is_empty() {
        report.unresolved.push(format!("No ROMs or emulators found under {}", base.display()));
        report
            .suggestions
            .push("Check the base path or the emulator install locations".to_string());
    }
    report.success = report.unresolved.is_empty();
    info!(
        base = %base.display(),
        resolved = report.resolved.len(),
        suggestions = report.suggestions.len(),
        "Path scan finished"
    );
    report
}
