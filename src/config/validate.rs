//! Config validation logic.
//! Verifies the base path, prepares a writable backup directory and keeps
//! backups out of the subtrees they snapshot.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use super::types::Config;

const WRITE_PROBE_PREFIX: &str = ".emu_migrate_probe_";

impl Config {
    /// Validate existence, readability/writability and path relationships.
    pub fn validate(&self) -> Result<()> {
        let base = &self.base_path;
        let backups = &self.backup_dir;

        // 1) Base path: must exist, be a directory, and be readable.
        ensure_dir_exists_and_is_dir(base, "base_path")?;
        ensure_readable(base, "base_path")?;

        // 2) Backup dir: created if missing, must be writable.
        ensure_dir_is_or_create(backups, "backup_dir")?;
        ensure_writable(backups, "backup_dir")?;

        // 3) Backups must not live inside a subtree that gets backed up.
        let base_real = fs::canonicalize(base).unwrap_or_else(|_| base.clone());
        let backups_real = fs::canonicalize(backups).unwrap_or_else(|_| backups.clone());
        for rel in &self.critical_paths {
            if rel.is_absolute() {
                bail!("critical_path must be relative to base_path: '{}'", rel.display());
            }
            let critical = base_real.join(rel);
            if backups_real.starts_with(&critical) {
                bail!(
                    "backup_dir '{}' must not be inside critical path '{}'",
                    backups_real.display(),
                    critical.display()
                );
            }
        }

        if let Some(dir) = &self.mappings_dir {
            ensure_dir_exists_and_is_dir(dir, "mappings_dir")?;
        }

        info!(
            base = %base.display(),
            backups = %backups.display(),
            log_file = %self
                .log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".into()),
            "Config validated"
        );
        Ok(())
    }
}

/// Ensure path exists and is a directory; emit clear errors with path context.
fn ensure_dir_exists_and_is_dir(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        error!("{name} does not exist: {}", path.display());
        bail!("{name} does not exist: {}", path.display());
    }
    if !path.is_dir() {
        error!("{name} is not a directory: {}", path.display());
        bail!("{name} is not a directory: {}", path.display());
    }
    Ok(())
}

fn ensure_readable(path: &Path, name: &str) -> Result<()> {
    fs::read_dir(path)
        .with_context(|| format!("Cannot read {name} directory '{}'; check permissions", path.display()))?;
    debug!("{name} readable: {}", path.display());
    Ok(())
}

/// Ensure directory exists (create if missing). If exists, it must be a directory.
fn ensure_dir_is_or_create(path: &Path, name: &str) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            error!("{name} exists but isn't a directory: {}", path.display());
            bail!("{name} exists but isn't a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path).with_context(|| format!("Failed to create {name} directory '{}'", path.display()))?;
        info!("Created {name} directory: {}", path.display());
    }
    Ok(())
}

/// Ensure directory is writable using a non-destructive probe file.
fn ensure_writable(path: &Path, name: &str) -> Result<()> {
    let probe = path.join(format!("{WRITE_PROBE_PREFIX}{}.tmp", std::process::id()));
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)
        .and_then(|_| fs::remove_file(&probe))
        .with_context(|| format!("Cannot write to {name} '{}'; check permissions", path.display()))?;
    debug!("{name} writable: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_base_is_rejected() {
        let td = tempdir().unwrap();
        let cfg = Config::new(td.path().join("nope"), td.path().join("b"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("base_path does not exist"));
    }

    #[test]
    fn backup_dir_is_created() {
        let td = tempdir().unwrap();
        let cfg = Config::new(td.path(), td.path().join("backups/nested"));
        cfg.validate().unwrap();
        assert!(td.path().join("backups/nested").is_dir());
    }

    #[test]
    fn backup_inside_critical_path_is_rejected() {
        let td = tempdir().unwrap();
        let cfg = Config::new(td.path(), td.path().join("Emulation/saves/backups"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must not be inside critical path"));
    }
}
