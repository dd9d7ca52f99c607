//! Default path helpers and symlink checks.
//! Determines OS-appropriate config/backup paths and detects symlinked ancestors for safety.

use dirs::{config_dir, data_dir};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{APP_DIR, CONFIG_ENV};

/// Config file location: `$EMU_MIGRATE_CONFIG` when set, else the OS config dir.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(p));
    }
    if let Some(mut base) = config_dir() {
        base.push(APP_DIR);
        base.push("config.xml");
        Some(base)
    } else {
        env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config").join(APP_DIR).join("config.xml"))
    }
}

/// OS-appropriate default backup root (data dir).
pub fn default_backup_dir() -> Option<PathBuf> {
    if let Some(mut base) = data_dir() {
        base.push(APP_DIR);
        base.push("backups");
        Some(base)
    } else {
        env::var("HOME").ok().map(|h| {
            PathBuf::from(h)
                .join(".local")
                .join("share")
                .join(APP_DIR)
                .join("backups")
        })
    }
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        if let Ok(meta) = fs::symlink_metadata(anc)
            && meta.file_type().is_symlink()
        {
            return Ok(true);
        }
        p = anc.parent();
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn symlinked_ancestor_is_detected() {
        let td = tempfile::tempdir().unwrap();
        let real = td.path().join("real");
        fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, td.path().join("link")).unwrap();
        assert!(path_has_symlink_ancestor(&td.path().join("link/app.log")).unwrap());
        assert!(!path_has_symlink_ancestor(&real.join("app.log")).unwrap());
    }
}
