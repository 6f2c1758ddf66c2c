//! Error types for the virtfs filesystem abstraction.

use std::io;

/// The closed set of recoverable failure categories reported by this layer.
///
/// Every fallible operation returns `Result<T, Error>`. Anticipated
/// environmental conditions (missing file, permission denial, already
/// exists, disk full) are always reported through this channel — never by
/// panicking. Panics are reserved for contract violations such as a
/// cross-provider rename or a malformed virtual device name.
///
/// Native OS error codes are translated through two fixed tables: the errno
/// table used by the descriptor-based backend ([`Error::from_raw_os_error`])
/// and the portable [`io::ErrorKind`] table (`From<io::Error>`). Anything
/// not covered maps to [`Error::Unknown`].
///
/// # Examples
///
/// ```rust
/// use virtfs::Error;
///
/// let err = Error::NoEnt;
/// assert_eq!(err.to_string(), "Not found");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// Invalid arguments (bad open-mode combination, negative seek, ...).
    #[error("Invalid arguments")]
    Inval,
    /// Path does not exist.
    #[error("Not found")]
    NoEnt,
    /// Path already exists.
    #[error("Already exists")]
    Exist,
    /// Permission denied, sharing violation, or a held advisory lock.
    #[error("Access violation")]
    Acces,
    /// Directory is not empty.
    #[error("Not empty")]
    NotEmpty,
    /// Filesystem is read-only.
    #[error("Read only")]
    ReadOnly,
    /// Expected a file but found a directory.
    #[error("Is a directory")]
    IsDir,
    /// Path or name exceeds the platform limit.
    #[error("Path too long")]
    TooLong,
    /// Out of space on the device.
    #[error("Not enough space on the device")]
    NoSpace,
    /// Any native error with no mapping of its own.
    #[error("Unknown system error")]
    Unknown,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Translate a raw OS error code (`errno`) into the closed taxonomy.
    ///
    /// This is the fixed lookup table used by the descriptor-based native
    /// backend; codes without an entry collapse into [`Error::Unknown`].
    #[cfg(unix)]
    pub fn from_raw_os_error(code: i32) -> Self {
        match code {
            libc::ENOENT => Error::NoEnt,
            libc::EEXIST => Error::Exist,
            libc::EINVAL => Error::Inval,
            libc::EACCES => Error::Acces,
            libc::ENOTEMPTY => Error::NotEmpty,
            libc::EROFS => Error::ReadOnly,
            libc::EISDIR => Error::IsDir,
            libc::ENAMETOOLONG => Error::TooLong,
            libc::ENOSPC => Error::NoSpace,
            _ => Error::Unknown,
        }
    }

    /// Capture the calling thread's `errno` and translate it.
    #[cfg(unix)]
    pub(crate) fn last_os_error() -> Self {
        Self::from(io::Error::last_os_error())
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        #[cfg(unix)]
        if let Some(code) = error.raw_os_error() {
            return Error::from_raw_os_error(code);
        }

        // Sharing and lock violations have no ErrorKind of their own.
        #[cfg(windows)]
        if let Some(code) = error.raw_os_error() {
            use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, ERROR_SHARING_VIOLATION};
            if code == ERROR_SHARING_VIOLATION as i32 || code == ERROR_LOCK_VIOLATION as i32 {
                return Error::Acces;
            }
        }

        match error.kind() {
            io::ErrorKind::NotFound => Error::NoEnt,
            io::ErrorKind::AlreadyExists => Error::Exist,
            io::ErrorKind::InvalidInput => Error::Inval,
            io::ErrorKind::PermissionDenied => Error::Acces,
            io::ErrorKind::DirectoryNotEmpty => Error::NotEmpty,
            io::ErrorKind::ReadOnlyFilesystem => Error::ReadOnly,
            io::ErrorKind::IsADirectory => Error::IsDir,
            io::ErrorKind::InvalidFilename => Error::TooLong,
            io::ErrorKind::StorageFull => Error::NoSpace,
            _ => Error::Unknown,
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        let kind = match error {
            Error::Inval => io::ErrorKind::InvalidInput,
            Error::NoEnt => io::ErrorKind::NotFound,
            Error::Exist => io::ErrorKind::AlreadyExists,
            Error::Acces => io::ErrorKind::PermissionDenied,
            Error::NotEmpty => io::ErrorKind::DirectoryNotEmpty,
            Error::ReadOnly => io::ErrorKind::ReadOnlyFilesystem,
            Error::IsDir => io::ErrorKind::IsADirectory,
            Error::TooLong => io::ErrorKind::InvalidFilename,
            Error::NoSpace => io::ErrorKind::StorageFull,
            Error::Unknown => io::ErrorKind::Other,
        };
        io::Error::new(kind, error.to_string())
    }
}
