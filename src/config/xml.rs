//! `config.xml` reader and first-run template writer.
//!
//! Every element is optional; absent or blank ones keep the `Config` defaults.
//! `<critical_path>` may repeat and replaces the default backup set as a whole.
//! Unknown elements are rejected. Checking that the directories exist is
//! `Config::validate`'s job, not this module's.

use anyhow::{Context, Result, anyhow};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::CONFIG_ENV;
use super::paths::{default_backup_dir, default_config_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel};
use crate::platform::{set_dir_mode_0700, write_config_secure_new_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    base_path: Option<String>,
    backup_dir: Option<String>,
    mappings_dir: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    junction_timeout_seconds: Option<u64>,
    #[serde(rename = "critical_path", default)]
    critical_paths: Vec<String>,
}

// Custom deserializer that trims surrounding whitespace for optional u64
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<u64>().ok()))
}

fn trimmed_path(s: Option<&str>) -> Option<PathBuf> {
    s.map(str::trim).filter(|t| !t.is_empty()).map(PathBuf::from)
}

// Map XmlConfig -> Config; absent fields keep their defaults.
fn xml_to_config(parsed: XmlConfig) -> Config {
    let mut cfg = Config::default();

    if let Some(p) = trimmed_path(parsed.base_path.as_deref()) {
        cfg.base_path = p;
    }
    if let Some(p) = trimmed_path(parsed.backup_dir.as_deref()) {
        cfg.backup_dir = p;
    }
    cfg.mappings_dir = trimmed_path(parsed.mappings_dir.as_deref());
    cfg.log_file = trimmed_path(parsed.log_file.as_deref());

    if let Some(level) = parsed.log_level.as_deref().and_then(LogLevel::parse) {
        cfg.log_level = level;
    }
    if let Some(secs) = parsed.junction_timeout_seconds.filter(|s| *s > 0) {
        cfg.junction_timeout = Duration::from_secs(secs);
    }

    let critical: Vec<PathBuf> = parsed
        .critical_paths
        .iter()
        .filter_map(|s| trimmed_path(Some(s)))
        .collect();
    if !critical.is_empty() {
        cfg.critical_paths = critical;
    }
    cfg
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = if contents.trim().is_empty() {
        XmlConfig::default()
    } else {
        from_xml_str(&contents).with_context(|| format!("parse config xml '{}'", path.display()))?
    };
    debug!(path = %path.display(), "Loaded config xml");
    Ok(xml_to_config(parsed))
}

/// Resolve and load the config file.
///
/// An explicit path (from `--config`) must exist. Otherwise `EMU_MIGRATE_CONFIG`
/// or the OS default location is used, and a missing file yields `Ok(None)`.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, Config)>> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(anyhow!("config file not found: {}", p.display()));
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            Some(p) if env::var_os(CONFIG_ENV).is_some() => {
                return Err(anyhow!("{CONFIG_ENV} points to a missing file: {}", p.display()));
            }
            _ => return Ok(None),
        },
    };
    let cfg = load_config_from_xml_path(&path)?;
    Ok(Some((path, cfg)))
}

/// Create default template config file and parent directory (best-effort permissions).
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        return Err(anyhow!("Refusing to create config: ancestor of {} is a symlink", path.display()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let suggested_backups = default_backup_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/path/to/backups".into());

    let content = format!(
        "<!--\n  emu_migrate configuration (XML)\n\n  Fields:\n    base_path                 -> root of the emulation tree to restructure\n    backup_dir                -> where migration_backup_* directories are written\n    mappings_dir              -> directory with rules.json, emulator_mapping.json, platform_mapping.json\n                                 (defaults to base_path)\n    log_level                 -> quiet | normal | info | debug\n    log_file                  -> path to log file (optional; stderr is still used)\n    junction_timeout_seconds  -> limit for external link/permission commands\n    critical_path             -> repeatable; subtree of base_path backed up before any change\n\n  Notes:\n    - CLI flags override XML values.\n-->\n<config>\n  <base_path>/path/to/emulation</base_path>\n  <backup_dir>{}</backup_dir>\n  <log_level>normal</log_level>\n  <log_file></log_file>\n  <junction_timeout_seconds>10</junction_timeout_seconds>\n  <critical_path>Emulation/configs</critical_path>\n  <critical_path>Emulation/saves</critical_path>\n  <critical_path>config</critical_path>\n</config>\n",
        suggested_backups
    );

    write_config_secure_new_0600(path, content.as_bytes())?;
    info!(path = %path.display(), "Created template config");
    Ok(())
}

/// Create default config if EMU_MIGRATE_CONFIG is not set; return the created path so the CLI can inform the user.
pub fn ensure_default_config_exists() -> Option<PathBuf> {
    if env::var_os(CONFIG_ENV).is_some() {
        return None;
    }
    let cfg_path = default_config_path()?;
    if cfg_path.exists() {
        return None;
    }
    match create_template_config(&cfg_path) {
        Ok(()) => Some(cfg_path),
        Err(e) => {
            debug!(path = %cfg_path.display(), error = %e, "Could not create template config");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(target_os = "macos", ignore = "temp dir sits behind a symlinked /var")]
    fn template_parses_back() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("cfg/config.xml");
        create_template_config(&path).unwrap();
        let cfg = load_config_from_xml_path(&path).unwrap();
        assert_eq!(cfg.base_path, PathBuf::from("/path/to/emulation"));
        assert!(cfg.log_file.is_none());
        assert_eq!(cfg.critical_paths.len(), 3);
        assert!(create_template_config(&path).is_err(), "existing config must not be replaced");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.xml");
        fs::write(&path, "<config><download_base>/x</download_base></config>").unwrap();
        assert!(load_config_from_xml_path(&path).is_err());
    }

    #[test]
    fn whitespace_and_zero_timeout_fall_back_to_defaults() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.xml");
        fs::write(
            &path,
            "<config>\n  <base_path>  /sd  </base_path>\n  <junction_timeout_seconds> 0 </junction_timeout_seconds>\n  <log_level> DEBUG </log_level>\n</config>",
        )
        .unwrap();
        let cfg = load_config_from_xml_path(&path).unwrap();
        assert_eq!(cfg.base_path, PathBuf::from("/sd"));
        assert_eq!(cfg.junction_timeout, Duration::from_secs(10));
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }
}
