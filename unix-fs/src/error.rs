use std::io;

use thiserror::Error;

/// Recoverable engine errors, surfaced to the hook layer as negative errno.
///
/// Violated invariants (freeing a clear bitmap bit, resolving through a
/// zero block pointer, dropping a proxy without commit or discard) are not
/// errors but panics: they mean corruption or a caller bug.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("no space left on device")]
    NoSpace,
    #[error("file exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("disk error: {0}")]
    Disk(#[from] io::Error),
}

impl FsError {
    /// The errno the hook layer reports for this error.
    ///
    /// An existing rename target is reported as `EACCES`, not `EEXIST`.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::NoSpace => libc::ENOSPC,
            FsError::AlreadyExists => libc::EACCES,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::Disk(_) => libc::EIO,
        }
    }
}
