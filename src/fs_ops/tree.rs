//! Whole-path operations built on the file primitives: recursive copy,
//! move with cross-device fallback, and removal.
//!
//! Notes:
//! - Directories are created sequentially in walk order; regular files are
//!   copied in parallel with rayon.
//! - Symlinks inside a tree are recreated as links, never followed.
//! - Sockets, FIFOs and device nodes are refused before anything is opened.
//! - No operation here overwrites an occupied destination, and a copy that
//!   fails leaves no destination behind.

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::atomic::rename_no_clobber;
use super::copy::safe_copy;
use super::helpers::io_error_with_help_io;
use super::metadata::preserve_metadata;
use super::util::{is_cross_device, path_occupied};
use crate::platform;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub dirs: u64,
    pub files: u64,
    pub links: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    Renamed,
    Copied,
}

fn already_exists(dst: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("destination already exists: {}", dst.display()),
    )
}

pub(crate) fn not_copyable(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("not a regular file, directory or symlink: {}", path.display()),
    )
}

/// Remove whatever a failed copy left at `dst`. Only called for destinations
/// that were free when the copy started.
fn discard_partial(dst: &Path) {
    if !path_occupied(dst) {
        return;
    }
    match remove_path(dst) {
        Ok(()) => debug!(path = %dst.display(), "Removed partial copy"),
        Err(e) => warn!(path = %dst.display(), error = %e, "failed to remove partial copy"),
    }
}

/// Copy the directory `src` to the new directory `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<TreeStats> {
    if path_occupied(dst) {
        return Err(already_exists(dst));
    }
    copy_tree_into(src, dst).inspect_err(|_| discard_partial(dst))
}

fn copy_tree_into(src: &Path, dst: &Path) -> io::Result<TreeStats> {
    let mut stats = TreeStats::default();
    let mut dirs: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };
        let ft = entry.file_type();
        if ft.is_dir() {
            fs::create_dir(&target).map_err(io_error_with_help_io("create directory", &target))?;
            dirs.push((entry.into_path(), target));
            stats.dirs += 1;
        } else if ft.is_symlink() {
            platform::clone_symlink(entry.path(), &target)
                .map_err(io_error_with_help_io("recreate symlink", &target))?;
            stats.links += 1;
        } else if ft.is_file() {
            files.push((entry.into_path(), target));
        } else {
            return Err(not_copyable(entry.path()));
        }
    }

    stats.files = files.len() as u64;
    stats.bytes = files
        .par_iter()
        .map(|(from, to)| safe_copy(from, to))
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    // Directory times change while children are written; set them last.
    for (from, to) in dirs.iter().rev() {
        match fs::metadata(from) {
            Ok(meta) => preserve_metadata(to, &meta),
            Err(e) => warn!(path = %from.display(), error = %e, "cannot stat directory for metadata"),
        }
    }

    debug!(src = %src.display(), dst = %dst.display(), files = stats.files, bytes = stats.bytes, "Copied tree");
    Ok(stats)
}

/// Copy a file, directory tree or symlink to `dst`.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<TreeStats> {
    let meta = fs::symlink_metadata(src).map_err(io_error_with_help_io("stat source", src))?;
    if meta.file_type().is_symlink() {
        if path_occupied(dst) {
            return Err(already_exists(dst));
        }
        platform::clone_symlink(src, dst).map_err(io_error_with_help_io("recreate symlink", dst))?;
        return Ok(TreeStats {
            links: 1,
            ..TreeStats::default()
        });
    }
    if meta.is_dir() {
        return copy_tree(src, dst);
    }
    if !meta.is_file() {
        return Err(not_copyable(src));
    }
    let bytes = safe_copy(src, dst)?;
    Ok(TreeStats {
        files: 1,
        bytes,
        ..TreeStats::default()
    })
}

/// Move `src` to `dst`: rename when possible, copy then remove across devices.
pub fn move_path(src: &Path, dst: &Path) -> io::Result<MoveMethod> {
    match rename_no_clobber(src, dst) {
        Ok(()) => {
            info!(src = %src.display(), dst = %dst.display(), "Renamed");
            return Ok(MoveMethod::Renamed);
        }
        Err(e) if is_cross_device(&e) => {
            warn!(src = %src.display(), dst = %dst.display(), "Rename crosses file systems; copying instead");
        }
        Err(e) => return Err(e),
    }

    // copy_path discards its own partial destination on error.
    copy_path(src, dst)?;
    if let Err(e) = remove_path(src) {
        // Keep exactly one copy so the move can be retried or undone.
        if let Err(cleanup) = remove_path(dst) {
            warn!(path = %dst.display(), error = %cleanup, "failed to remove partial move destination");
        }
        return Err(io_error_with_help_io("remove moved source", src)(e));
    }
    info!(src = %src.display(), dst = %dst.display(), "Copied and removed source");
    Ok(MoveMethod::Copied)
}

/// Remove a file, a link (without following it) or a directory tree.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() || platform::is_link_like(path) {
        platform::remove_link(path)
    } else if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
