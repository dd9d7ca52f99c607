//! Migration data model.
//!
//! - `MigrationStep`: one file-system operation plus what is needed to undo it.
//! - `MigrationPlan`: an ordered list of steps with execution metadata.
//! - `StepAction`: closed set of operations; each variant carries exactly the
//!   paths it needs, so a symlink step always has both source and target.
//!
//! The JSON shape matches the recovery artifact written into backup
//! directories: `{plan_id, description, created_at, executed, steps[],
//! execution_time, success, backup_location}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// File-system operation performed by one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    CreateDirectory {
        target_path: PathBuf,
    },
    CreateSymlink {
        source_path: PathBuf,
        target_path: PathBuf,
    },
    MoveFile {
        source_path: PathBuf,
        target_path: PathBuf,
    },
    CopyFile {
        source_path: PathBuf,
        target_path: PathBuf,
    },
}

impl StepAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            StepAction::CreateDirectory { .. } => ActionKind::CreateDirectory,
            StepAction::CreateSymlink { .. } => ActionKind::CreateSymlink,
            StepAction::MoveFile { .. } => ActionKind::MoveFile,
            StepAction::CopyFile { .. } => ActionKind::CopyFile,
        }
    }

    pub fn target_path(&self) -> &Path {
        match self {
            StepAction::CreateDirectory { target_path }
            | StepAction::CreateSymlink { target_path, .. }
            | StepAction::MoveFile { target_path, .. }
            | StepAction::CopyFile { target_path, .. } => target_path,
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        match self {
            StepAction::CreateDirectory { .. } => None,
            StepAction::CreateSymlink { source_path, .. }
            | StepAction::MoveFile { source_path, .. }
            | StepAction::CopyFile { source_path, .. } => Some(source_path),
        }
    }
}

/// Payload-free discriminant of `StepAction`, used for statistics and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateDirectory,
    CreateSymlink,
    MoveFile,
    CopyFile,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateDirectory => "create_directory",
            ActionKind::CreateSymlink => "create_symlink",
            ActionKind::MoveFile => "move_file",
            ActionKind::CopyFile => "copy_file",
        }
    }

    /// Operations that commonly need elevated rights on Windows.
    pub fn may_need_privilege(&self) -> bool {
        matches!(self, ActionKind::CreateSymlink | ActionKind::MoveFile)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a directory link was finally created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMethod {
    Symlink,
    Junction,
}

/// State captured before a step mutates anything; drives rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existed_before: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_symlink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_target: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_existed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_existed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_used: Option<LinkMethod>,
    /// Directories created by the step that were absent before, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_dirs: Vec<PathBuf>,
}

impl RollbackInfo {
    pub fn is_empty(&self) -> bool {
        *self == RollbackInfo::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub step_id: String,
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub rollback_info: RollbackInfo,
    #[serde(default)]
    pub error: Option<String>,
}

impl MigrationStep {
    pub fn new(step_id: impl Into<String>, action: StepAction, description: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            action,
            description: description.into(),
            executed: false,
            rollback_info: RollbackInfo::default(),
            error: None,
        }
    }

    pub fn create_directory(step_id: impl Into<String>, target: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        Self::new(
            step_id,
            StepAction::CreateDirectory {
                target_path: target.into(),
            },
            description,
        )
    }

    pub fn create_symlink(
        step_id: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            step_id,
            StepAction::CreateSymlink {
                source_path: source.into(),
                target_path: target.into(),
            },
            description,
        )
    }

    pub fn move_file(
        step_id: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            step_id,
            StepAction::MoveFile {
                source_path: source.into(),
                target_path: target.into(),
            },
            description,
        )
    }

    pub fn copy_file(
        step_id: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            step_id,
            StepAction::CopyFile {
                source_path: source.into(),
                target_path: target.into(),
            },
            description,
        )
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    /// Executed without error.
    pub fn succeeded(&self) -> bool {
        self.executed && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub plan_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub steps: Vec<MigrationStep>,
    #[serde(default)]
    pub execution_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub backup_location: Option<PathBuf>,
    #[serde(default)]
    pub rolled_back: bool,
}

/// Aggregate counters over a plan's steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStatistics {
    pub plan_id: String,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub steps_by_action: BTreeMap<ActionKind, usize>,
}

impl MigrationPlan {
    pub fn new(plan_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            description: description.into(),
            created_at: Utc::now(),
            executed: false,
            steps: Vec::new(),
            execution_time: None,
            success: false,
            backup_location: None,
            rolled_back: false,
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = MigrationStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn add_step(&mut self, step: MigrationStep) {
        self.steps.push(step);
    }

    pub fn extend_steps(&mut self, steps: impl IntoIterator<Item = MigrationStep>) {
        self.steps.extend(steps);
    }

    pub fn step(&self, step_id: &str) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.succeeded()).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn statistics(&self) -> PlanStatistics {
        let mut steps_by_action = BTreeMap::new();
        for step in &self.steps {
            *steps_by_action.entry(step.kind()).or_insert(0) += 1;
        }
        PlanStatistics {
            plan_id: self.plan_id.clone(),
            total_steps: self.total_steps(),
            completed_steps: self.completed_steps(),
            failed_steps: self.failed_steps(),
            steps_by_action,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
