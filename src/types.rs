//! Core data types for the virtfs filesystem abstraction.

use std::time::SystemTime;

bitflags::bitflags! {
    /// Bit-set of independent flags controlling how a file is opened.
    ///
    /// The flags translate to native access/sharing/creation-disposition
    /// flags per backend:
    ///
    /// - `CREATE` alone opens or creates; `CREATE | EXCL` creates only if
    ///   absent; `CREATE | TRUNC` creates or truncates.
    /// - `EXCL` without `CREATE` is a contract violation rejected with
    ///   [`Error::Inval`](crate::Error::Inval) before any backend is
    ///   consulted.
    /// - `TRUNC` without `CREATE` truncates an existing file.
    /// - `WRITE | APPEND` forces append-mode writes.
    /// - `LOCK` requests a non-blocking exclusive advisory lock; if the
    ///   lock is already held elsewhere the open fails with
    ///   [`Error::Acces`](crate::Error::Acces). Combined with `TRUNC`,
    ///   truncation is deferred until after the lock is held so a file
    ///   another process is validly using is never destroyed before the
    ///   lock check completes.
    /// - `UNREAD` declares that read access to the handle is not needed
    ///   even though the path allows it; on creation it also drops the
    ///   permission bits of the new file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenMode: u32 {
        /// Open for reading.
        const READ = 1 << 0;
        /// Open for writing.
        const WRITE = 1 << 1;
        /// Writes go to the end of the file.
        const APPEND = 1 << 2;
        /// Create the file if it does not exist.
        const CREATE = 1 << 3;
        /// Fail if the file already exists (requires `CREATE`).
        const EXCL = 1 << 4;
        /// Truncate the file to zero length.
        const TRUNC = 1 << 5;
        /// Acquire a non-blocking exclusive advisory lock.
        const LOCK = 1 << 6;
        /// Handle does not need read access; new files get no permission bits.
        const UNREAD = 1 << 7;
    }
}

impl OpenMode {
    /// Read-only access to an existing file.
    pub const fn read() -> Self {
        Self::READ
    }

    /// Read-write access to an existing file.
    pub const fn rw() -> Self {
        Self::READ.union(Self::WRITE)
    }

    /// Write access, creating or truncating as needed.
    pub const fn rewrite() -> Self {
        Self::WRITE.union(Self::CREATE).union(Self::TRUNC)
    }

    /// Write access, creating if absent, appending to the end.
    pub const fn append() -> Self {
        Self::WRITE.union(Self::CREATE).union(Self::APPEND)
    }

    /// Read-write access, creating only if absent.
    pub const fn create_new() -> Self {
        Self::READ
            .union(Self::WRITE)
            .union(Self::CREATE)
            .union(Self::EXCL)
    }
}

/// Metadata for a single filesystem node, as reported by `stat`-like
/// queries.
///
/// `is_writable` is derived from a read-only/permission bit and is an
/// approximation, not a full ACL check. The access time is clamped so that
/// `atime >= mtime` always holds: some platforms report stale or cleared
/// access times, so an access time earlier than the modification time is
/// never surfaced. This clamp is a lossy approximation — it masks
/// filesystems where access-time tracking is disabled or coarser than
/// modification time. `ctime` is synthesized equal to `mtime` on platforms
/// without a true metadata-change timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatInfo {
    /// Whether the node is a directory.
    pub is_directory: bool,
    /// Whether the node is writable (permission-bit approximation).
    pub is_writable: bool,
    /// Size in bytes.
    pub size: u64,
    /// Last access time (never earlier than `mtime`).
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Metadata change time (equal to `mtime` where unavailable).
    pub ctime: SystemTime,
}

impl StatInfo {
    /// Enforce the `atime >= mtime` invariant after filling in raw values.
    pub(crate) fn clamp_atime(mut self) -> Self {
        if self.atime < self.mtime {
            self.atime = self.mtime;
        }
        self
    }
}

impl Default for StatInfo {
    fn default() -> Self {
        Self {
            is_directory: false,
            is_writable: false,
            size: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Filesystem-level capacity information for the volume containing a path,
/// independent of any single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStat {
    /// Fundamental block size in bytes.
    pub block_size: u64,
    /// Total size of the volume in bytes.
    pub total_size: u64,
    /// Total free bytes.
    pub total_free: u64,
    /// Free bytes available to the caller.
    pub avail_free: u64,
}

/// A single directory entry produced by [`Dir::read_next`](crate::Dir::read_next).
///
/// `.` and `..` pseudo-entries may appear; callers that aggregate sizes or
/// recurse must filter them (the built-in recursive utilities do).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Entry name (not a full path).
    pub name: String,
    /// Metadata captured during enumeration.
    pub stat: StatInfo,
}

impl DirEntry {
    /// Shorthand for `self.stat.is_directory`.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.stat.is_directory
    }
}
