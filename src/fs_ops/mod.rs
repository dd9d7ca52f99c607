//! File-system primitives used by the executor and the backup manager.

mod atomic;
mod copy;
mod helpers;
mod io_copy;
mod metadata;
mod tree;
mod util;

pub use atomic::{rename_no_clobber, write_atomic};
pub use copy::safe_copy;
pub use helpers::{io_error_with_help, io_error_with_help_io};
pub use metadata::preserve_metadata;
pub use tree::{MoveMethod, TreeStats, copy_path, copy_tree, move_path, remove_path};
pub use util::{create_dir_all_tracked, normalize_lexical, path_occupied, relative_path, remove_created_dirs};

pub(crate) use helpers::describe_io_error;
