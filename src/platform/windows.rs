//! Windows implementations of platform helpers.
//!
//! Notes:
//! - Directory symlinks need SeCreateSymbolicLinkPrivilege (admin or
//!   Developer Mode); junctions do not, which is why they are the fallback.
//! - Junctions are created with `cmd /c mklink /J` under a hard timeout.
//! - No POSIX modes; permission changes go through `icacls`.

use anyhow::{Context, Result, bail};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::windows::fs::{MetadataExt, symlink_dir, symlink_file};
use std::os::windows::process::CommandExt;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};
use windows_sys::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_REPARSE_POINT};
use windows_sys::Win32::UI::Shell::IsUserAnAdmin;

use super::process::{ProcessError, run_with_timeout};
use crate::errors::LinkError;
use crate::fs_ops::write_atomic;

const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_PRIVILEGE_NOT_HELD: i32 = 1314;

/// Open log file for appending (no symlink defense available via std here).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Write a new config file atomically. Refuses to replace one.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    write_atomic(path, contents, true).with_context(|| format!("write config '{}'", path.display()))
}

/// No-op; POSIX directory modes do not apply.
pub fn set_dir_mode_0700(_path: &Path) -> io::Result<()> {
    Ok(())
}

pub fn is_elevated() -> bool {
    unsafe { IsUserAnAdmin() != 0 }
}

pub fn is_privilege_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(ERROR_PRIVILEGE_NOT_HELD | ERROR_ACCESS_DENIED))
        || e.kind() == io::ErrorKind::PermissionDenied
}

/// Symlink or any other reparse point (junctions included).
pub fn is_link_like(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink() || m.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0)
        .unwrap_or(false)
}

pub fn create_dir_symlink(source: &Path, link: &Path) -> io::Result<()> {
    symlink_dir(source, link)
}

pub fn clone_symlink(existing: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(existing)?;
    let resolved = existing.parent().map(|p| p.join(&target)).unwrap_or_else(|| target.clone());
    if resolved.is_dir() {
        symlink_dir(&target, dst)
    } else {
        symlink_file(&target, dst)
    }
}

/// Directory links (symlink or junction) are removed with `remove_dir`,
/// which deletes the link without touching its target.
pub fn remove_link(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_attributes() & FILE_ATTRIBUTE_DIRECTORY != 0 {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// `mklink /J <link> <target>`; `target` must be absolute.
pub fn create_junction(target: &Path, link: &Path, timeout: Duration) -> Result<(), LinkError> {
    let mut cmd = Command::new("cmd.exe");
    cmd.raw_arg(format!("/c mklink /J \"{}\" \"{}\"", link.display(), target.display()));
    debug!(link = %link.display(), target = %target.display(), "Creating junction");

    match run_with_timeout(cmd, timeout) {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(LinkError::JunctionFailed {
            status: out.status.to_string(),
            stderr: out.stderr.trim().to_string(),
        }),
        Err(ProcessError::TimedOut { timeout, .. }) => Err(LinkError::JunctionTimedOut { timeout }),
        Err(e) => Err(LinkError::JunctionFailed {
            status: "not started".into(),
            stderr: e.to_string(),
        }),
    }
}

/// `icacls <path> /grant *S-1-1-0:(OI)(CI)F /T` (Everyone, full control, recursive).
pub fn grant_access(path: &Path, timeout: Duration) -> io::Result<usize> {
    let mut cmd = Command::new("icacls");
    cmd.arg(path).args(["/grant", "*S-1-1-0:(OI)(CI)F", "/T"]);
    match run_with_timeout(cmd, timeout) {
        Ok(out) if out.status.success() => Ok(1),
        Ok(out) => {
            warn!(path = %path.display(), status = %out.status, stderr = %out.stderr.trim(), "icacls failed");
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("icacls exited with {}: {}", out.status, out.stderr.trim()),
            ))
        }
        Err(ProcessError::TimedOut { .. }) => Err(io::Error::new(io::ErrorKind::TimedOut, "icacls timed out")),
        Err(e) => Err(io::Error::other(e.to_string())),
    }
}
