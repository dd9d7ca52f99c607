//! Safe single-file copy:
//! - stream into a hidden temp file in the destination directory,
//! - carry metadata over,
//! - rename into place only if the destination is still free.
//!
//! The destination directory must exist; callers create (and track) it.

use std::fs;
use std::io;
use std::path::Path;

use super::atomic::rename_no_clobber;
use super::helpers::io_error_with_help_io;
use super::tree::not_copyable;
use super::{io_copy, metadata, util};

pub fn safe_copy(src: &Path, dest: &Path) -> io::Result<u64> {
    let dest_dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let src_meta = fs::metadata(src).map_err(io_error_with_help_io("stat source", src))?;
    if !src_meta.is_file() {
        return Err(not_copyable(src));
    }

    let tmp = util::unique_temp_path(dest_dir);
    let bytes = match io_copy::copy_streaming(src, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(io_error_with_help_io("copy to temporary file", &tmp)(e));
        }
    };
    metadata::preserve_metadata(&tmp, &src_meta);

    if let Err(e) = rename_no_clobber(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error_with_help_io("rename copy into place", dest)(e));
    }
    Ok(bytes)
}
