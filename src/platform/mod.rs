//! Platform-specific helpers.
//! Hides OS differences (Unix/Windows) behind a uniform API: secure log and
//! config files, elevation probing, link creation/removal, the junction
//! fallback and recursive permission grants.

mod process;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use process::{ProcessError, ProcessOutput, run_with_timeout};

#[cfg(unix)]
pub use unix::{
    clone_symlink, create_dir_symlink, create_junction, grant_access, is_elevated, is_link_like,
    is_privilege_error, open_log_file_secure_append, remove_link, set_dir_mode_0700,
    write_config_secure_new_0600,
};

#[cfg(windows)]
pub use windows::{
    clone_symlink, create_dir_symlink, create_junction, grant_access, is_elevated, is_link_like,
    is_privilege_error, open_log_file_secure_append, remove_link, set_dir_mode_0700,
    write_config_secure_new_0600,
};
