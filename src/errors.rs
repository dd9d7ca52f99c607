//! Typed error definitions for emu_migrate.
//! Three layers: crate-level `MigrateError` (surfaced to callers), per-step
//! `StepError` (recorded on the step, triggers rollback) and `LinkError`
//! (symlink/junction creation, where privilege failures degrade to a fallback).

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Invalid migration input: {0}")]
    Planning(String),

    #[error("Backup failed at {path}: {context}")]
    Backup { path: PathBuf, context: String },

    #[error("Migration not confirmed; pass confirm=true (--yes) to execute")]
    NotConfirmed,

    #[error("Migration plan {0} was already executed")]
    AlreadyExecuted(String),

    #[error("Migration plan not found: {0}")]
    PlanNotFound(String),

    #[error("Migration plan {plan_id} cannot be rolled back: {reason}")]
    NotRollbackable { plan_id: String, reason: String },

    #[error("History store error at {path}: {context}")]
    History { path: PathBuf, context: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation interrupted by user")]
    Interrupted,
}

impl MigrateError {
    /// Stable numeric code for logs and process exit status.
    pub fn code(&self) -> i32 {
        match self {
            MigrateError::Planning(_) => 10,
            MigrateError::Backup { .. } => 11,
            MigrateError::NotConfirmed => 12,
            MigrateError::AlreadyExecuted(_) => 13,
            MigrateError::PlanNotFound(_) => 14,
            MigrateError::NotRollbackable { .. } => 15,
            MigrateError::History { .. } => 16,
            MigrateError::Config(_) => 17,
            MigrateError::Interrupted => 130,
        }
    }

    pub(crate) fn backup(path: impl Into<PathBuf>, context: impl Into<String>) -> Self {
        MigrateError::Backup {
            path: path.into(),
            context: context.into(),
        }
    }

    pub(crate) fn history(path: impl Into<PathBuf>, context: impl Into<String>) -> Self {
        MigrateError::History {
            path: path.into(),
            context: context.into(),
        }
    }
}

/// Failure of a single migration step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{op} '{}': {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Target exists and is not a symlink: {0}")]
    TargetNotSymlink(PathBuf),

    #[error("Target already exists; refusing to overwrite: {0}")]
    TargetExists(PathBuf),

    #[error("Link source does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl StepError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> StepError {
        let path = path.into();
        move |source| StepError::Io { op, path, source }
    }
}

/// Failure while creating or verifying a directory link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("symlink creation failed: {0}")]
    Native(#[source] io::Error),

    #[error("no junction fallback available on this platform")]
    JunctionUnavailable,

    #[error("junction creation timed out after {} seconds", .timeout.as_secs())]
    JunctionTimedOut { timeout: Duration },

    #[error("junction creation failed ({status}): {stderr}")]
    JunctionFailed { status: String, stderr: String },

    #[error("link verification failed for {}: {reason}", .path.display())]
    Verification { path: PathBuf, reason: String },

    #[error("symlink failed ({native}); junction fallback failed ({fallback})")]
    BothFailed {
        native: io::Error,
        fallback: Box<LinkError>,
    },
}

impl LinkError {
    /// True when the native attempt failed for lack of privilege.
    pub fn is_privilege(&self) -> bool {
        match self {
            LinkError::Native(e) => e.kind() == io::ErrorKind::PermissionDenied,
            LinkError::BothFailed { .. } => true,
            _ => false,
        }
    }
}
