//! Dry-run report for a plan: what each step would do, with no mutation.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::executor::resolve_link_source;
use crate::fs_ops::path_occupied;
use crate::model::{ActionKind, MigrationPlan, MigrationStep, PlanStatistics, StepAction};
use crate::platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    WillCreate,
    WillSkip,
    WillLink,
    WillMove,
    WillCopy,
}

impl PreviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewStatus::WillCreate => "will_create",
            PreviewStatus::WillSkip => "will_skip",
            PreviewStatus::WillLink => "will_link",
            PreviewStatus::WillMove => "will_move",
            PreviewStatus::WillCopy => "will_copy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn for_step_count(steps: usize) -> Self {
        match steps {
            0..50 => RiskLevel::Low,
            50..200 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewChange {
    pub step_id: String,
    pub action: ActionKind,
    pub status: PreviewStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    pub target_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub plan_id: String,
    pub changes: Vec<PreviewChange>,
    pub warnings: Vec<String>,
    pub risk_level: RiskLevel,
    pub estimated_seconds: f64,
    pub statistics: PlanStatistics,
}

fn estimated_cost(kind: ActionKind) -> f64 {
    match kind {
        ActionKind::CreateDirectory => 0.4,
        ActionKind::CreateSymlink => 0.6,
        ActionKind::MoveFile => 0.8,
        ActionKind::CopyFile => 1.0,
    }
}

pub fn preview(plan: &MigrationPlan) -> PreviewReport {
    let elevated = platform::is_elevated();
    let mut warnings = Vec::new();
    let mut changes = Vec::with_capacity(plan.steps.len());

    for step in &plan.steps {
        let target = step.action.target_path();
        let status = match &step.action {
            StepAction::CreateDirectory { .. } if target.is_dir() => PreviewStatus::WillSkip,
            StepAction::CreateDirectory { .. } => PreviewStatus::WillCreate,
            StepAction::CreateSymlink { .. } => PreviewStatus::WillLink,
            StepAction::MoveFile { .. } => PreviewStatus::WillMove,
            StepAction::CopyFile { .. } => PreviewStatus::WillCopy,
        };

        match &step.action {
            StepAction::CreateSymlink {
                source_path,
                target_path,
            } => {
                if path_occupied(target_path) && !platform::is_link_like(target_path) {
                    warnings.push(format!(
                        "{}: {} exists and is not a link; the step will fail",
                        step.step_id,
                        target_path.display()
                    ));
                }
                if !resolve_link_source(source_path, target_path).exists() && !source_created_earlier(plan, step, source_path) {
                    warnings.push(format!("{}: link source {} does not exist yet", step.step_id, source_path.display()));
                }
            }
            StepAction::MoveFile { source_path, .. } | StepAction::CopyFile { source_path, .. } => {
                if !path_occupied(source_path) {
                    warnings.push(format!("{}: source {} is missing", step.step_id, source_path.display()));
                }
                if path_occupied(target) {
                    warnings.push(format!("{}: target {} already exists", step.step_id, target.display()));
                }
            }
            StepAction::CreateDirectory { .. } => {}
        }

        changes.push(PreviewChange {
            step_id: step.step_id.clone(),
            action: step.kind(),
            status,
            description: step.description.clone(),
            source_path: step.action.source_path().map(PathBuf::from),
            target_path: target.to_path_buf(),
        });
    }

    let privileged = plan.steps.iter().filter(|s| s.kind().may_need_privilege()).count();
    if privileged > 0 && !elevated {
        warnings.push(format!(
            "{privileged} step(s) create links or move files and may need elevated privileges or developer mode"
        ));
    }

    let estimated_seconds = plan.steps.iter().map(|s| estimated_cost(s.kind())).sum();
    PreviewReport {
        plan_id: plan.plan_id.clone(),
        changes,
        warnings,
        risk_level: RiskLevel::for_step_count(plan.steps.len()),
        estimated_seconds,
        statistics: plan.statistics(),
    }
}

/// A link may point at a directory an earlier step of the same plan creates.
fn source_created_earlier(plan: &MigrationPlan, link_step: &MigrationStep, source: &Path) -> bool {
    let resolved = resolve_link_source(source, link_step.action.target_path());
    let resolved = normalize(&resolved);
    plan.steps
        .iter()
        .take_while(|s| s.step_id != link_step.step_id)
        .any(|s| normalize(s.action.target_path()) == resolved)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn statuses_reflect_current_tree() {
        let td = tempdir().unwrap();
        fs::create_dir(td.path().join("exists")).unwrap();
        let plan = MigrationPlan::new("plan_p", "p").with_steps([
            MigrationStep::create_directory("mkdir_001", td.path().join("exists"), "d1"),
            MigrationStep::create_directory("mkdir_002", td.path().join("new"), "d2"),
            MigrationStep::copy_file("copy_001", td.path().join("missing"), td.path().join("c"), "c"),
        ]);
        let report = preview(&plan);
        let statuses: Vec<_> = report.changes.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            [PreviewStatus::WillSkip, PreviewStatus::WillCreate, PreviewStatus::WillCopy]
        );
        assert!(report.warnings.iter().any(|w| w.contains("copy_001") && w.contains("missing")));
        assert!((report.estimated_seconds - 1.8).abs() < 1e-9);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(!td.path().join("new").exists());
    }

    #[test]
    fn link_to_directory_created_earlier_is_not_warned_as_missing() {
        let td = tempdir().unwrap();
        let plan = MigrationPlan::new("plan_l", "l").with_steps([
            MigrationStep::create_directory("rom_dir_001", td.path().join("Roms/Nintendo DS"), "rom"),
            MigrationStep::create_symlink(
                "rom_link_001",
                "../../Roms/Nintendo DS",
                td.path().join("Emulation/roms/nds"),
                "link",
            ),
        ]);
        let report = preview(&plan);
        assert!(!report.warnings.iter().any(|w| w.contains("does not exist yet")));
    }

    #[test]
    fn risk_thresholds() {
        assert_eq!(RiskLevel::for_step_count(49), RiskLevel::Low);
        assert_eq!(RiskLevel::for_step_count(50), RiskLevel::Medium);
        assert_eq!(RiskLevel::for_step_count(199), RiskLevel::Medium);
        assert_eq!(RiskLevel::for_step_count(200), RiskLevel::High);
    }
}
