//! Logical concatenation of several files into one readable stream.

use std::collections::BTreeMap;
use std::io::SeekFrom;

use crate::backend::FileBackend;
use crate::error::{Error, Result};
use crate::file::File;
use crate::types::StatInfo;

impl File {
    /// Build one read-only sequential handle spanning `files` end-to-end,
    /// in the order supplied.
    ///
    /// The gather stream takes ownership of all fragment handles; the
    /// fragments must not be mutated externally afterwards, since each
    /// fragment's size is captured here and [`File::size`] reports the sum
    /// of those captured sizes. Writes are no-ops returning 0 and
    /// truncation always fails, as for [`File::from_bytes`].
    pub fn gather(files: Vec<File>) -> Result<Self> {
        let mut end = 0u64;
        let mut ends = BTreeMap::new();

        for (index, file) in files.iter().enumerate() {
            end += file.size()?;
            // First fragment wins on duplicate end offsets, so zero-sized
            // fragments are never selected by the lookup.
            ends.entry(end).or_insert(index);
        }

        Ok(File::from_backend(Box::new(GatherStream {
            pos: 0,
            end,
            files,
            ends,
        })))
    }
}

/// Read-only stream over an ordered list of fragments.
///
/// `ends` maps each fragment's cumulative end offset to its index, so the
/// fragment containing a logical offset is the one with the smallest end
/// offset strictly greater than that offset.
struct GatherStream {
    pos: u64,
    end: u64,
    files: Vec<File>,
    ends: BTreeMap<u64, usize>,
}

impl FileBackend for GatherStream {
    fn stat(&self) -> Result<StatInfo> {
        let mut info = match self.files.first() {
            Some(first) => first.stat()?,
            None => StatInfo::default(),
        };

        info.is_directory = false;
        info.is_writable = false;
        info.size = self.end;
        Ok(info)
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, _length: u64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.end {
            return Ok(0);
        }

        let start = self.pos;
        let max = (buf.len() as u64).min(self.end - self.pos);
        if max == 0 {
            return Ok(0);
        }

        let mut buf_off = 0u64;
        let mut buf_max = max;

        // Walk fragments starting at the one whose end offset is strictly
        // greater than the current position.
        let spans: Vec<(u64, usize)> = self
            .ends
            .range(self.pos + 1..)
            .map(|(&frag_end, &index)| (frag_end, index))
            .collect();

        for (frag_end, index) in spans {
            // Position within the fragment, computed from its end.
            let back = (frag_end - self.pos) as i64;
            self.files[index].seek(SeekFrom::End(-back))?;

            let count = (frag_end - self.pos).min(buf_max);
            let got = self.files[index]
                .read(&mut buf[buf_off as usize..(buf_off + count) as usize])?;

            buf_off += count;
            buf_max -= count;
            self.pos += got as u64;

            // Short underlying reads propagate as a short gather read.
            if (got as u64) < count || buf_max == 0 {
                break;
            }
        }

        Ok((self.pos - start) as usize)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
            SeekFrom::End(offset) => self.end.checked_add_signed(offset),
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
        Ok(self.end)
    }
}
