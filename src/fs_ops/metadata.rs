//! Best-effort metadata carry-over for copied files and directories:
//! access/modify times, Unix mode bits, and the Windows readonly flag.
//! Failures are logged at warn and never fail the copy.

use filetime::{FileTime, set_file_times};
use std::fs;
use std::path::Path;
use tracing::{trace, warn};

pub fn preserve_metadata(dest: &Path, src_meta: &fs::Metadata) {
    let atime = FileTime::from_last_access_time(src_meta);
    let mtime = FileTime::from_last_modification_time(src_meta);
    match set_file_times(dest, atime, mtime) {
        Ok(()) => trace!(path = %dest.display(), "copied timestamps"),
        Err(e) => warn!(path = %dest.display(), error = %e, "failed to copy timestamps"),
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = src_meta.permissions().mode() & 0o7777;
        if let Err(e) = fs::set_permissions(dest, fs::Permissions::from_mode(mode)) {
            warn!(path = %dest.display(), mode = format!("{mode:o}"), error = %e, "failed to copy permissions");
        }
    }

    #[cfg(not(unix))]
    if src_meta.permissions().readonly() {
        match fs::metadata(dest) {
            Ok(meta) => {
                let mut perms = meta.permissions();
                perms.set_readonly(true);
                if let Err(e) = fs::set_permissions(dest, perms) {
                    warn!(path = %dest.display(), error = %e, "failed to copy readonly flag");
                }
            }
            Err(e) => warn!(path = %dest.display(), error = %e, "failed to stat copy"),
        }
    }
}
