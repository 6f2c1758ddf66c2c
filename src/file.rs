//! The owning file facade and the fixed in-memory backend.

use std::io::{self, IoSlice, SeekFrom};

use crate::backend::{FileBackend, NativeHandle};
use crate::error::{Error, Result};
use crate::types::StatInfo;

/// An open file handle bound to exactly one backend.
///
/// The facade is backend-agnostic: the same type fronts native files,
/// in-memory buffers, gather streams, and whatever a virtual device
/// returns. Dropping the facade releases the backend (closing descriptors
/// or handles) deterministically; moving it transfers the backend.
///
/// `File` also implements [`io::Read`], [`io::Write`] and [`io::Seek`], so
/// consumers built on the standard traits (binary format parsers and the
/// like) work unchanged.
///
/// A handle encapsulates a single cursor and is not safe for concurrent
/// use by multiple threads without external synchronization.
pub struct File {
    backend: Box<dyn FileBackend>,
}

impl File {
    /// Wrap an already-constructed backend.
    ///
    /// This is how virtual device providers and the native open path hand
    /// their backends to callers.
    pub fn from_backend(backend: Box<dyn FileBackend>) -> Self {
        Self { backend }
    }

    /// Open a fixed read-only memory buffer as a file.
    ///
    /// Supports seeking and reading only: writes are no-ops returning 0
    /// and truncation always fails.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::from_backend(Box::new(MemoryFile {
            data: data.into(),
            pos: 0,
        }))
    }

    /// Query metadata through the open handle.
    pub fn stat(&self) -> Result<StatInfo> {
        self.backend.stat()
    }

    /// Flush buffered data to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.backend.sync()
    }

    /// Set the file length.
    pub fn truncate(&mut self, length: u64) -> Result<()> {
        self.backend.truncate(length)
    }

    /// Read up to `buf.len()` bytes at the cursor.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.backend.read(buf)
    }

    /// Read the remainder of the file into a vector.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 16384];
        loop {
            let n = self.backend.read(&mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Write the buffer at the cursor, returning the number of bytes
    /// written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.backend.write(buf)
    }

    /// Gathered write of several buffers in order, returning the total
    /// bytes written.
    ///
    /// An empty buffer entry is a contract violation rejected with
    /// [`Error::Inval`] before the backend is consulted.
    pub fn write_gather(&mut self, bufs: &[IoSlice<'_>]) -> Result<u64> {
        if bufs.iter().any(|b| b.is_empty()) {
            return Err(Error::Inval);
        }

        self.backend.write_gather(bufs)
    }

    /// Move the cursor, returning the new absolute position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.backend.seek(pos)
    }

    /// Current size of the file in bytes.
    pub fn size(&self) -> Result<u64> {
        self.backend.size()
    }

    /// The raw OS handle behind this file, when a native backend is
    /// active.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.backend.native_handle()
    }
}

impl io::Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(Into::into)
    }
}

impl io::Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        File::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sync().map_err(Into::into)
    }
}

impl io::Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        File::seek(self, pos).map_err(Into::into)
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("native_handle", &self.backend.native_handle())
            .finish_non_exhaustive()
    }
}

/// Fixed read-only buffer backend behind [`File::from_bytes`].
struct MemoryFile {
    data: Vec<u8>,
    pos: u64,
}

impl FileBackend for MemoryFile {
    fn stat(&self) -> Result<StatInfo> {
        Ok(StatInfo {
            size: self.data.len() as u64,
            ..Default::default()
        })
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, _length: u64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = self.data.len() as u64;
        if self.pos >= size {
            return Ok(0);
        }

        let avail = (size - self.pos) as usize;
        let count = buf.len().min(avail);
        let start = self.pos as usize;
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.pos += count as u64;
        Ok(count)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
            SeekFrom::End(offset) => (self.data.len() as u64).checked_add_signed(offset),
        };

        match new_pos {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(Error::Inval),
        }
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}
