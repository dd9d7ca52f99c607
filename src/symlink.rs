//! Directory link creation: native symlink first, junction second.
//!
//! Policy:
//! 1. Try a native symbolic link.
//! 2. If that fails for lack of privilege, try the backend's junction
//!    fallback (bounded by a timeout on Windows, unavailable on Unix).
//! 3. Verify a junction: target exists, is link-like, and accepts a probe
//!    file write/delete.
//! 4. If both fail, the error carries both causes.
//!
//! Elevation is never requested; a failed fallback becomes a step failure.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::LinkError;
use crate::model::LinkMethod;
use crate::platform;

/// Name of the file written and removed to prove a link is usable.
pub const ACCESS_PROBE: &str = ".emu_migrate_access_probe";

pub const DEFAULT_JUNCTION_TIMEOUT: Duration = Duration::from_secs(10);

/// OS primitives behind the strategy. Swappable so the fallback path can be
/// driven on any platform.
pub trait LinkBackend: Send + Sync {
    fn create_symlink(&self, source: &Path, link: &Path) -> io::Result<()>;

    /// Whether a native failure should degrade to the junction fallback.
    fn is_privilege_error(&self, err: &io::Error) -> bool;

    /// `target` is absolute.
    fn create_junction(&self, target: &Path, link: &Path) -> Result<(), LinkError>;
}

/// The running platform's links.
#[derive(Debug, Clone)]
pub struct NativeLinks {
    junction_timeout: Duration,
}

impl NativeLinks {
    pub fn new(junction_timeout: Duration) -> Self {
        Self { junction_timeout }
    }
}

impl Default for NativeLinks {
    fn default() -> Self {
        Self::new(DEFAULT_JUNCTION_TIMEOUT)
    }
}

impl LinkBackend for NativeLinks {
    fn create_symlink(&self, source: &Path, link: &Path) -> io::Result<()> {
        platform::create_dir_symlink(source, link)
    }

    fn is_privilege_error(&self, err: &io::Error) -> bool {
        platform::is_privilege_error(err)
    }

    fn create_junction(&self, target: &Path, link: &Path) -> Result<(), LinkError> {
        platform::create_junction(target, link, self.junction_timeout)
    }
}

pub struct SymlinkStrategy {
    backend: Box<dyn LinkBackend>,
}

impl std::fmt::Debug for SymlinkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymlinkStrategy").finish_non_exhaustive()
    }
}

impl Default for SymlinkStrategy {
    fn default() -> Self {
        Self::new(NativeLinks::default())
    }
}

impl SymlinkStrategy {
    pub fn new(backend: impl LinkBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Create `link` pointing at `source`. A relative `source` is relative to
    /// the link's parent directory, as for any symlink.
    pub fn create(&self, source: &Path, link: &Path) -> Result<LinkMethod, LinkError> {
        let native = match self.backend.create_symlink(source, link) {
            Ok(()) => {
                info!(link = %link.display(), source = %source.display(), "Created symlink");
                return Ok(LinkMethod::Symlink);
            }
            Err(e) if self.backend.is_privilege_error(&e) => e,
            Err(e) => return Err(LinkError::Native(e)),
        };

        warn!(
            link = %link.display(),
            error = %native,
            "Symlink creation lacks privilege; trying junction fallback"
        );
        match self.junction(source, link) {
            Ok(()) => {
                info!(link = %link.display(), source = %source.display(), "Created junction");
                Ok(LinkMethod::Junction)
            }
            Err(fallback) => {
                if platform::is_link_like(link)
                    && let Err(e) = platform::remove_link(link)
                {
                    warn!(link = %link.display(), error = %e, "failed to remove unverified junction");
                }
                Err(LinkError::BothFailed {
                    native,
                    fallback: Box::new(fallback),
                })
            }
        }
    }

    fn junction(&self, source: &Path, link: &Path) -> Result<(), LinkError> {
        let target = absolute_source(source, link)?;
        self.backend.create_junction(&target, link)?;
        verify_link(link)
    }
}

/// Resolve a link source the way the OS would, then canonicalize it
/// (junction targets must be absolute).
fn absolute_source(source: &Path, link: &Path) -> Result<PathBuf, LinkError> {
    let joined = match link.parent() {
        Some(parent) if source.is_relative() => parent.join(source),
        _ => source.to_path_buf(),
    };
    dunce::canonicalize(&joined).map_err(|e| LinkError::Verification {
        path: joined.clone(),
        reason: format!("cannot resolve link source: {e}"),
    })
}

/// Check that `link` resolves, is a link, and can be written through.
pub fn verify_link(link: &Path) -> Result<(), LinkError> {
    let fail = |reason: String| LinkError::Verification {
        path: link.to_path_buf(),
        reason,
    };
    if !link.exists() {
        return Err(fail("link target does not resolve".into()));
    }
    if !platform::is_link_like(link) {
        return Err(fail("not a symlink or junction".into()));
    }
    let probe = link.join(ACCESS_PROBE);
    fs::write(&probe, b"ok").map_err(|e| fail(format!("write probe: {e}")))?;
    fs::remove_file(&probe).map_err(|e| fail(format!("remove probe: {e}")))?;
    debug!(link = %link.display(), "Link verified");
    Ok(())
}
