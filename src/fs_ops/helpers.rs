//! I/O error enrichment.
//!
//! Adapters that attach the operation, the path and an OS-aware hint to an
//! `io::Error`, for use with `map_err` in both `anyhow::Result` and
//! `io::Result` code.
//!
//! Usage:
//!   fs::create_dir_all(dir).map_err(io_error_with_help("create backup dir", dir))?;
//!   File::open(p).map_err(io_error_with_help_io("open plan artifact", p))?;

use anyhow::anyhow;
use std::io;
use std::path::Path;

/// Hint keyed on the raw OS error code, when one is known.
fn os_hint(code: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        let hint = match code {
            libc::EACCES | libc::EPERM => "permission denied; check ownership or run elevated",
            libc::EXDEV => "different file systems; rename is not possible, a copy is required",
            libc::EBUSY => "resource busy; close emulators or frontends using it",
            libc::ENOENT => "path not found",
            libc::EEXIST => "already exists",
            libc::ENOTEMPTY => "directory not empty",
            libc::ENOSPC => "no space left on device",
            libc::EROFS => "read-only file system",
            libc::ELOOP => "too many levels of symbolic links",
            libc::ENAMETOOLONG => "path too long",
            _ => return None,
        };
        Some(hint)
    }
    #[cfg(windows)]
    {
        let hint = match code {
            5 => "access denied; check permissions or run as administrator",
            17 => "different drives; rename is not possible, a copy is required",
            32 => "sharing violation; the file is in use",
            2 | 3 => "path not found",
            80 | 183 => "already exists",
            145 => "directory not empty",
            112 => "disk full",
            19 => "write-protected media",
            206 => "path too long",
            1314 => "symbolic link privilege not held; enable Developer Mode or run as administrator",
            _ => return None,
        };
        Some(hint)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        None
    }
}

fn kind_hint(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::PermissionDenied => Some("permission denied"),
        io::ErrorKind::NotFound => Some("path not found"),
        io::ErrorKind::AlreadyExists => Some("already exists"),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Some("timed out; retry later"),
        _ => None,
    }
}

pub(crate) fn describe_io_error(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{op} '{}': {e}", path.display());
    let hint = match e.raw_os_error() {
        Some(code) => os_hint(code),
        None => kind_hint(e.kind()),
    };
    if let Some(hint) = hint {
        msg.push_str(" (");
        msg.push_str(hint);
        msg.push(')');
    }
    if let Some(code) = e.raw_os_error() {
        msg.push_str(&format!(" [os code: {code}]"));
    }
    msg
}

/// For `anyhow::Result` code paths.
pub fn io_error_with_help<'a>(op: &'a str, path: &'a Path) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| anyhow!(describe_io_error(op, path, &e))
}

/// For `io::Result` code paths; keeps the original `ErrorKind`.
pub fn io_error_with_help_io<'a>(op: &'a str, path: &'a Path) -> impl FnOnce(io::Error) -> io::Error + 'a {
    move |e: io::Error| io::Error::new(e.kind(), describe_io_error(op, path, &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_preserved() {
        let e = io::Error::from(io::ErrorKind::NotFound);
        let wrapped = io_error_with_help_io("read", Path::new("/nope"))(e);
        assert_eq!(wrapped.kind(), io::ErrorKind::NotFound);
        assert!(wrapped.to_string().contains("/nope"));
    }

    #[cfg(unix)]
    #[test]
    fn raw_code_gets_hint_and_code() {
        let e = io::Error::from_raw_os_error(libc::EXDEV);
        let msg = describe_io_error("rename", Path::new("/a"), &e);
        assert!(msg.contains("copy is required"));
        assert!(msg.contains(&format!("[os code: {}]", libc::EXDEV)));
    }
}
