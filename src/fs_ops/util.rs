use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Hidden, unique sibling name inside `dir` for copy-then-rename.
pub(crate) fn unique_temp_path(dir: &Path) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".emu_migrate.{pid}.{nanos}.{seq}.tmp"))
}

/// EXDEV / ERROR_NOT_SAME_DEVICE; std has no stable ErrorKind for it.
pub(crate) fn is_cross_device(e: &io::Error) -> bool {
    match e.raw_os_error() {
        #[cfg(unix)]
        Some(code) => code == libc::EXDEV,
        #[cfg(windows)]
        Some(code) => code == 17,
        #[cfg(not(any(unix, windows)))]
        Some(_) => false,
        None => false,
    }
}

#[cfg(unix)]
pub(crate) fn fsync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// True if something (including a dangling symlink) occupies `path`.
pub fn path_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Path of `to` expressed relative to the directory `from_dir`.
/// Both paths are compared lexically; pass paths with the same root.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from_dir.components().filter(|c| *c != Component::CurDir).collect();
    let to_parts: Vec<Component<'_>> = to.components().filter(|c| *c != Component::CurDir).collect();
    let common = from.iter().zip(to_parts.iter()).take_while(|(a, b)| a == b).count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

/// Resolve `.` and `..` without touching the file system. `..` never climbs
/// above a root; leading `..` of a relative path are kept.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `create_dir_all` that appends each directory it actually creates to
/// `created`, outermost first. On error, `created` holds what was made so far.
pub fn create_dir_all_tracked(dir: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(p) = cursor {
        if p.as_os_str().is_empty() || path_occupied(p) {
            break;
        }
        missing.push(p.to_path_buf());
        cursor = p.parent();
    }
    for p in missing.into_iter().rev() {
        match fs::create_dir(&p) {
            Ok(()) => created.push(p),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && p.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Remove directories created by `create_dir_all_tracked`, innermost first,
/// skipping any that are no longer empty. Returns the ones left in place.
pub fn remove_created_dirs(created: &[PathBuf]) -> Vec<PathBuf> {
    let mut kept = Vec::new();
    for dir in created.iter().rev() {
        if !path_occupied(dir) {
            continue;
        }
        if fs::remove_dir(dir).is_err() {
            kept.push(dir.clone());
        }
    }
    kept
}
