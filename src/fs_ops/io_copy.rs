//! Streaming file copy into a fresh destination.
//!
//! - The destination is opened with `create_new`, so an existing file is never
//!   clobbered (callers copy into a unique temp name, then rename).
//! - Linux uses `copy_file_range` when the file system supports it; everything
//!   else goes through 1 MiB buffered I/O.
//! - The destination is fsynced before returning.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

const BUF_SIZE: usize = 1024 * 1024;

pub(crate) fn copy_streaming(src: &Path, dst: &Path) -> io::Result<u64> {
    let src_f = File::open(src)?;
    let dst_f = OpenOptions::new().write(true).create_new(true).open(dst)?;

    #[cfg(target_os = "linux")]
    if let Some(bytes) = kernel_copy(&src_f, &dst_f)? {
        dst_f.sync_all()?;
        return Ok(bytes);
    }

    let mut reader = BufReader::with_capacity(BUF_SIZE, src_f);
    let mut writer = BufWriter::with_capacity(BUF_SIZE, dst_f);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes)
}

/// In-kernel copy. `Ok(None)` means unsupported here and nothing was written.
#[cfg(target_os = "linux")]
fn kernel_copy(src: &File, dst: &File) -> io::Result<Option<u64>> {
    use std::os::unix::io::AsRawFd;

    const CHUNK: usize = 16 * 1024 * 1024;
    let mut total: u64 = 0;
    loop {
        let rc = unsafe {
            libc::copy_file_range(
                src.as_raw_fd(),
                std::ptr::null_mut(),
                dst.as_raw_fd(),
                std::ptr::null_mut(),
                CHUNK,
                0,
            )
        };
        match rc {
            n if n > 0 => total += n as u64,
            0 => return Ok(Some(total)),
            _ => {
                let err = io::Error::last_os_error();
                let unsupported = matches!(
                    err.raw_os_error(),
                    Some(libc::EXDEV | libc::ENOSYS | libc::EINVAL | libc::EPERM | libc::EOPNOTSUPP)
                );
                if total == 0 && unsupported {
                    return Ok(None);
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn copies_contents_and_reports_size() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("save.srm");
        let dst = dir.path().join("save.out");
        let data: Vec<u8> = (0..(2 * BUF_SIZE + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &data).unwrap();

        let n = copy_streaming(&src, &dst).unwrap();
        assert_eq!(n as usize, data.len());
        assert_eq!(fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn empty_file_copies() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("empty");
        let dst = dir.path().join("out");
        File::create(&src).unwrap();
        assert_eq!(copy_streaming(&src, &dst).unwrap(), 0);
        assert_eq!(fs::metadata(&dst).unwrap().len(), 0);
    }

    #[test]
    fn refuses_existing_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"data").unwrap();
        fs::write(&dst, b"x").unwrap();
        let err = copy_streaming(&src, &dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&dst).unwrap(), b"x");
    }
}
