//! Unix implementations of platform helpers.
//!
//! Notes:
//! - Directory links are plain symlinks; there is no junction equivalent, so
//!   the fallback reports `JunctionUnavailable`.
//! - "Elevated" means effective uid 0.

use anyhow::{Context, Result, bail};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt, symlink};
use std::path::Path;
use std::time::Duration;
use tracing::trace;
use walkdir::WalkDir;

use crate::errors::LinkError;
use crate::fs_ops::write_atomic;

/// Open log file for appending; new files are created 0600, existing modes are kept.
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
}

/// Write a new config file atomically with mode 0600. Refuses to replace one.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    write_atomic(path, contents, true).with_context(|| format!("write config '{}'", path.display()))
}

pub fn set_dir_mode_0700(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

pub fn is_privilege_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EPERM | libc::EACCES)) || e.kind() == io::ErrorKind::PermissionDenied
}

pub fn is_link_like(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

pub fn create_dir_symlink(source: &Path, link: &Path) -> io::Result<()> {
    symlink(source, link)
}

pub fn clone_symlink(existing: &Path, dst: &Path) -> io::Result<()> {
    symlink(fs::read_link(existing)?, dst)
}

pub fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

pub fn create_junction(_target: &Path, _link: &Path, _timeout: Duration) -> Result<(), LinkError> {
    Err(LinkError::JunctionUnavailable)
}

/// Add owner read/write (and search on directories) throughout `path`.
/// Returns how many entries changed. Symlinks are not followed.
pub fn grant_access(path: &Path, _timeout: Duration) -> io::Result<usize> {
    let mut changed = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_symlink() {
            continue;
        }
        let meta = entry.metadata().map_err(io::Error::from)?;
        let mode = meta.permissions().mode();
        let wanted = if meta.is_dir() { mode | 0o700 } else { mode | 0o600 };
        if wanted != mode {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(wanted))?;
            trace!(path = %entry.path().display(), mode = format!("{wanted:o}"), "granted owner access");
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn existing_log_file_mode_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emu_migrate.log");
        fs::write(&path, b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let _f = open_log_file_secure_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn config_write_refuses_existing() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("config.xml");
        write_config_secure_new_0600(&cfg, b"<config/>").unwrap();
        assert!(write_config_secure_new_0600(&cfg, b"<other/>").is_err());
        assert_eq!(fs::read(&cfg).unwrap(), b"<config/>");
    }

    #[test]
    fn grant_access_adds_owner_bits() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("save.srm");
        fs::write(&f, b"s").unwrap();
        fs::set_permissions(&f, fs::Permissions::from_mode(0o400)).unwrap();
        let changed = grant_access(dir.path(), Duration::from_secs(1)).unwrap();
        assert!(changed >= 1);
        assert_eq!(fs::metadata(&f).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn junction_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = create_junction(dir.path(), &dir.path().join("j"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LinkError::JunctionUnavailable));
    }
}
