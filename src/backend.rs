//! Capability traits implemented by file and directory backends.
//!
//! A backend is selected at construction time (native platform backend,
//! in-memory buffer, gather stream, or whatever a virtual device returns)
//! and stored behind an owning facade — [`File`](crate::File) or
//! [`Dir`](crate::Dir). Callers never see which backend is active and no
//! runtime type inspection is needed.
//!
//! Backends encapsulate a single cursor. They are `Send` so handles can be
//! moved across threads, but a single handle is not safe for concurrent
//! use — issuing reads/writes/seeks on one handle from multiple threads
//! races on the cursor, exactly like the underlying native handles.

use std::io::{IoSlice, SeekFrom};

use crate::error::{Error, Result};
use crate::types::{DirEntry, StatInfo};

/// Identifier of the OS object behind a native backend.
#[cfg(unix)]
pub type NativeHandle = std::os::fd::RawFd;

/// Identifier of the OS object behind a native backend.
#[cfg(windows)]
pub type NativeHandle = std::os::windows::io::RawHandle;

/// An open file capability.
///
/// Methods take `&mut self`: every backend owns one cursor and the facade
/// does not add synchronization.
pub trait FileBackend: Send {
    /// Query metadata through the open handle.
    fn stat(&self) -> Result<StatInfo>;

    /// Flush buffered data to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Set the file length. Pure read-only backends fail with
    /// [`Error::ReadOnly`].
    fn truncate(&mut self, length: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes at the cursor, returning the number of
    /// bytes read. Zero at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the buffer at the cursor, returning the number of bytes
    /// written. Read-only backends report 0 without failing.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Gathered write: write every buffer in order, returning the total
    /// number of bytes written.
    ///
    /// The default concatenates the buffers into one owned allocation and
    /// issues a single [`write`](Self::write). Backends with a native
    /// vectored call override this (the descriptor-based backend batches
    /// `writev` in fixed-size chunks and accumulates the total).
    fn write_gather(&mut self, bufs: &[IoSlice<'_>]) -> Result<u64> {
        let mut total = 0usize;
        for buf in bufs {
            total = total.checked_add(buf.len()).ok_or(Error::Inval)?;
        }

        let mut flat = Vec::with_capacity(total);
        for buf in bufs {
            flat.extend_from_slice(buf);
        }

        Ok(self.write(&flat)? as u64)
    }

    /// Move the cursor, returning the new absolute position.
    ///
    /// A computed negative position fails with [`Error::Inval`] and leaves
    /// the cursor unchanged.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current size of the file in bytes.
    fn size(&self) -> Result<u64>;

    /// The raw OS handle, when one exists.
    fn native_handle(&self) -> Option<NativeHandle> {
        None
    }
}

/// An open directory enumeration capability.
///
/// Produces a lazy, single-pass sequence of entries. Once exhausted,
/// [`read_next`](Self::read_next) keeps returning `Ok(None)` until
/// [`rewind`](Self::rewind). A backend may enumerate eagerly at open time
/// (stable snapshot) or fetch lazily with platform iteration calls; both
/// must satisfy the exhaustion rule, and both silently skip entries whose
/// individual metadata query fails (e.g. a broken symbolic link) instead
/// of aborting the enumeration.
pub trait DirBackend: Send {
    /// Produce the next entry, or `Ok(None)` when exhausted.
    fn read_next(&mut self) -> Result<Option<DirEntry>>;

    /// Reset the sequence to its start.
    fn rewind(&mut self);
}
