//! Config module.
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{default_backup_dir, default_config_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use xml::{create_template_config, ensure_default_config_exists, load_config, load_config_from_xml_path};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "EMU_MIGRATE_CONFIG";

/// Directory name used under the OS config and data dirs.
pub const APP_DIR: &str = "emu_migrate";
