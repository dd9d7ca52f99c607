//! Atomic rename and atomic file replacement.
//! - `rename_no_clobber` refuses an occupied destination, then renames and
//!   fsyncs the destination directory (Unix, best-effort).
//! - `write_atomic` writes a temp sibling, fsyncs it, renames it over the
//!   target and fsyncs the directory. Readers see the old or the new content.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::helpers::io_error_with_help_io;
use super::util::{fsync_dir, path_occupied, unique_temp_path};

pub fn rename_no_clobber(src: &Path, dst: &Path) -> io::Result<()> {
    if path_occupied(dst) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination already exists: {}", dst.display()),
        ));
    }
    fs::rename(src, dst)?;
    #[cfg(unix)]
    if let Some(parent) = dst.parent() {
        let _ = fsync_dir(parent);
    }
    Ok(())
}

/// Replace `path` with `contents` atomically. With `private`, the file is
/// created 0600 on Unix.
pub fn write_atomic(path: &Path, contents: &[u8], private: bool) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_error_with_help_io("create parent directory", parent))?;

    let tmp = unique_temp_path(parent);
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let written = (|| {
        let mut f = opts.open(&tmp)?;
        f.write_all(contents)?;
        f.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(io_error_with_help_io("write temporary file", &tmp)(e));
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error_with_help_io("replace file", path)(e));
    }
    let _ = fsync_dir(parent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rename_refuses_existing_destination() {
        let td = tempdir().unwrap();
        let a = td.path().join("a");
        let b = td.path().join("b");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        let err = rename_no_clobber(&a, &b).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&b).unwrap(), b"b");
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() {
        let td = tempdir().unwrap();
        let p = td.path().join("plan.json");
        write_atomic(&p, b"one", false).unwrap();
        write_atomic(&p, b"two", false).unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"two");
        let leftovers: Vec<_> = fs::read_dir(td.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn private_write_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let td = tempdir().unwrap();
        let p = td.path().join("config.xml");
        write_atomic(&p, b"<x/>", true).unwrap();
        let mode = fs::metadata(&p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
