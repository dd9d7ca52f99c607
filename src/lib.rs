//! Core library for `emu_migrate`.
//!
//! Restructures an emulation file tree (emulator installs, ROM folders,
//! configuration) into a canonical layout with transactional-style safety:
//! plan, back up critical subtrees, execute steps one at a time, and roll the
//! executed prefix back on the first failure.
//!
//! Entry point for hosts is [`Migrator`]; the building blocks (planner,
//! backup, executor, symlink strategy, rollback, history) are public so they
//! can be wired differently.

pub mod backup;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod fs_ops;
pub mod history;
pub mod mapping;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod planner;
pub mod platform;
pub mod preview;
pub mod progress;
pub mod repair;
pub mod rollback;
pub mod shutdown;
pub mod symlink;

pub use config::{Config, LogLevel, default_config_path};
pub use engine::Migrator;
pub use errors::{LinkError, MigrateError, StepError};
pub use model::{ActionKind, MigrationPlan, MigrationStep, RollbackInfo, StepAction};

/// Convenience re-exports for hosts embedding the engine.
pub mod prelude {
    pub use crate::backup::BackupManager;
    pub use crate::config::{Config, LogLevel, default_config_path};
    pub use crate::engine::Migrator;
    pub use crate::errors::{LinkError, MigrateError as Error, StepError};
    pub use crate::executor::{StepExecutor, StepOutcome};
    pub use crate::history::{HistoryEntry, HistoryStore, PlanStatus};
    pub use crate::mapping::{
        EmulatorEntry, EmulatorMapping, JsonConfigDir, MappingProvider, PlatformMapping, RuleProvider, RuleSet,
        StaticMappings,
    };
    pub use crate::model::{ActionKind, MigrationPlan, MigrationStep, RollbackInfo, StepAction};
    pub use crate::orchestrator::{ApplyReport, ApplyState, MigrationOrchestrator};
    pub use crate::planner::{PlanBuilder, new_plan};
    pub use crate::progress::{LogProgress, NullProgress, ProgressSink};
    pub use crate::shutdown::request as request_shutdown;
    pub use crate::symlink::{LinkBackend, NativeLinks, SymlinkStrategy};

    /// Crate-level result alias.
    pub type MResult<T> = std::result::Result<T, Error>;
}
