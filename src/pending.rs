//! Write-to-temp-then-rename transactions.

use std::io::{self, IoSlice, SeekFrom};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::file::File;
use crate::path::{file_name, parent_of, path_append};
use crate::types::OpenMode;
use crate::vfs::Vfs;

/// A transactional replacement of one file's contents.
///
/// The transaction owns a freshly created, exclusively named temporary
/// file in the destination's parent directory; because the final rename is
/// same-directory (and therefore same-volume), it is atomic on every
/// supported platform and the destination is never observed in a
/// partially-written state.
///
/// Dropping the transaction without a successful [`commit`](Self::commit)
/// deletes the temporary file, so no orphaned temp files survive an
/// abandoned or failed transaction.
///
/// Created by [`Vfs::pending`].
pub struct PendingFile<'vfs> {
    vfs: &'vfs Vfs,
    /// Open read-write handle to the temp file; taken on commit.
    file: Option<File>,
    temp_path: Option<String>,
    dest: String,
}

/// Render a counter value in a compact lowercase base-36 alphabet.
fn to_base36(mut value: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut out = Vec::new();
    loop {
        out.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// A process-unique, monotonically advancing token.
///
/// The high-resolution seed is captured once per process; the counter
/// makes tokens unique within the process, and cross-process collisions
/// are handled by the exclusive-create retry loop.
fn unique_token() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seed = *SEED.get_or_init(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });

    seed.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
}

impl<'vfs> PendingFile<'vfs> {
    pub(crate) fn new(vfs: &'vfs Vfs, dest: &str) -> Result<Self> {
        let parent = parent_of(dest);
        let base = file_name(dest);

        loop {
            let name = format!("${base}.{}.tmp", to_base36(unique_token()));
            let temp_path = path_append(&parent, &name);

            match vfs.open(
                &temp_path,
                OpenMode::READ | OpenMode::WRITE | OpenMode::CREATE | OpenMode::EXCL,
            ) {
                Ok(file) => {
                    trace!("pending write for {dest} via {temp_path}");
                    return Ok(Self {
                        vfs,
                        file: Some(file),
                        temp_path: Some(temp_path),
                        dest: dest.to_owned(),
                    });
                }
                // Only a name collision is retried.
                Err(Error::Exist) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// The open handle to the temporary file.
    ///
    /// # Panics
    ///
    /// Panics if the transaction was already committed.
    pub fn file(&mut self) -> &mut File {
        self.file.as_mut().expect("pending file already committed")
    }

    /// Flush the temporary file to stable storage, close it, and
    /// atomically rename it onto the destination.
    ///
    /// With `overwrite` unset, an existing destination fails the commit
    /// with [`Error::Exist`]; the destination and the temporary file are
    /// both left intact (the latter until the transaction is dropped).
    pub fn commit(&mut self, overwrite: bool) -> Result<()> {
        let Some(temp_path) = self.temp_path.as_deref() else {
            return Err(Error::NoEnt);
        };

        if let Some(file) = self.file.as_mut() {
            // The temp file's contents must be on disk before the rename.
            file.sync()?;
        }
        self.file = None;

        self.vfs.rename(temp_path, &self.dest, overwrite)?;
        debug!("committed pending write to {}", self.dest);

        // Disarm the Drop cleanup.
        self.temp_path = None;
        Ok(())
    }

    /// The path of the temporary file backing this transaction, while it
    /// still exists.
    pub fn temp_path(&self) -> Option<&str> {
        self.temp_path.as_deref()
    }
}

impl io::Write for PendingFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file().write(buf).map_err(Into::into)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        // The std contract permits empty buffers; they carry no bytes, so
        // drop them before the gathered write.
        let bufs: Vec<IoSlice<'_>> = bufs.iter().filter(|b| !b.is_empty()).copied().collect();
        Ok(self.file().write_gather(&bufs).map_err(io::Error::from)? as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file().sync().map_err(Into::into)
    }
}

impl io::Seek for PendingFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file().seek(pos).map_err(Into::into)
    }
}

impl Drop for PendingFile<'_> {
    fn drop(&mut self) {
        // Close before unlink so the remove works on every platform.
        self.file = None;

        if let Some(temp_path) = self.temp_path.take() {
            trace!("discarding pending write {temp_path}");
            let _ = self.vfs.remove_file(&temp_path);
        }
    }
}
