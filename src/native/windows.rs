//! Handle-based native backend for windows targets.
//!
//! Built over `std::fs::File` (which owns the `HANDLE`) with
//! `OpenOptionsExt` carrying the access/share/disposition translation;
//! `windows-sys` is used only where std has no equivalent
//! (`GetDiskFreeSpaceExW`, `MoveFileExW`).

use std::fs::{self, FileTimes, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::fs::{MetadataExt, OpenOptionsExt};
use std::os::windows::io::AsRawHandle;
use std::time::SystemTime;

use windows_sys::Win32::Foundation::{ERROR_ACCESS_DENIED, GENERIC_READ, GENERIC_WRITE};
use windows_sys::Win32::Storage::FileSystem::{
    DELETE, FILE_APPEND_DATA, FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_READONLY,
    FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
    FILE_WRITE_ATTRIBUTES, GetDiskFreeSpaceExW, MOVEFILE_REPLACE_EXISTING, MoveFileExW,
};

use crate::backend::{DirBackend, FileBackend, NativeHandle};
use crate::error::{Error, Result};
use crate::types::{DeviceStat, DirEntry, OpenMode, StatInfo};

fn to_wide(path: &str) -> Vec<u16> {
    std::ffi::OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn stat_info(meta: &fs::Metadata) -> StatInfo {
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    StatInfo {
        is_directory: meta.file_attributes() & FILE_ATTRIBUTE_DIRECTORY != 0,
        is_writable: meta.file_attributes() & FILE_ATTRIBUTE_READONLY == 0,
        size: meta.file_size(),
        atime: meta.accessed().unwrap_or(mtime),
        mtime,
        // No better source than the last write time.
        ctime: mtime,
    }
    .clamp_atime()
}

pub(crate) fn stat(path: &str) -> Result<StatInfo> {
    let meta = fs::metadata(path)?;
    Ok(stat_info(&meta))
}

pub(crate) fn statfs(path: &str) -> Result<DeviceStat> {
    // GetDiskFreeSpaceExW rejects long paths; cut components from the
    // right until it is short enough.
    let mut probe = path.to_owned();
    while probe.chars().count() > 256 {
        match probe.rfind(crate::path::DELIMS) {
            Some(at) => probe.truncate(at),
            None => break,
        }
    }

    let wide = to_wide(&probe);
    let mut avail_free = 0u64;
    let mut total_size = 0u64;
    let mut total_free = 0u64;

    let ok = unsafe {
        GetDiskFreeSpaceExW(
            wide.as_ptr(),
            &mut avail_free,
            &mut total_size,
            &mut total_free,
        )
    };
    if ok == 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(DeviceStat {
        block_size: 4096,
        total_size,
        total_free,
        avail_free,
    })
}

pub(crate) fn create_dir(path: &str) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        // Access denied on an existing drive root behaves like "exists".
        Err(err)
            if err.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32)
                && fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) =>
        {
            Err(Error::Exist)
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn remove_dir(path: &str) -> Result<()> {
    fs::remove_dir(path)?;
    Ok(())
}

pub(crate) fn remove_file(path: &str) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

pub(crate) fn truncate(path: &str, length: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(length)?;
    Ok(())
}

pub(crate) fn set_times(path: &str, atime: SystemTime, mtime: SystemTime) -> Result<()> {
    let file = OpenOptions::new()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)?;

    file.set_times(FileTimes::new().set_accessed(atime).set_modified(mtime))?;
    Ok(())
}

pub(crate) fn rename(from: &str, to: &str, overwrite: bool) -> Result<()> {
    let wfrom = to_wide(from);
    let wto = to_wide(to);
    let flags = if overwrite { MOVEFILE_REPLACE_EXISTING } else { 0 };

    if unsafe { MoveFileExW(wfrom.as_ptr(), wto.as_ptr(), flags) } != 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();

    // MoveFileEx cannot replace a directory; for empty destination
    // directories, remove and retry once.
    if overwrite
        && err.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32)
        && fs::metadata(from).map(|m| m.is_dir()).unwrap_or(false)
        && fs::metadata(to).map(|m| m.is_dir()).unwrap_or(false)
    {
        match fs::remove_dir(to) {
            Ok(()) => {
                if unsafe { MoveFileExW(wfrom.as_ptr(), wto.as_ptr(), 0) } != 0 {
                    return Ok(());
                }
                let retry_err = std::io::Error::last_os_error();
                let _ = fs::create_dir(to);
                return Err(retry_err.into());
            }
            Err(remove_err) => return Err(remove_err.into()),
        }
    }

    Err(err.into())
}

/// Translate the portable open-mode bit-set into native access, share and
/// creation-disposition flags and open.
pub(crate) fn open(path: &str, mode: OpenMode) -> Result<Box<dyn FileBackend>> {
    let mut access = 0u32;
    if mode.contains(OpenMode::READ) {
        access |= GENERIC_READ;
    }
    if mode.contains(OpenMode::WRITE) {
        access |= DELETE
            | if mode.contains(OpenMode::APPEND) {
                FILE_APPEND_DATA
            } else {
                GENERIC_WRITE
            };
    }

    // Readers block other writers unless relaxed below.
    let mut share = FILE_SHARE_DELETE;
    if !mode.contains(OpenMode::UNREAD) || !mode.contains(OpenMode::WRITE) {
        share |= FILE_SHARE_READ;
    }
    if !mode.intersects(OpenMode::LOCK | OpenMode::UNREAD) || !mode.contains(OpenMode::WRITE) {
        share |= FILE_SHARE_WRITE;
    }

    let mut options = OpenOptions::new();
    // The read/write bits only satisfy the builder's creation-flag checks;
    // the actual access mask is the override below.
    options
        .read(mode.contains(OpenMode::READ))
        .write(mode.intersects(OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNC))
        .access_mode(access)
        .share_mode(share);

    // std derives CREATE_NEW / CREATE_ALWAYS / OPEN_ALWAYS /
    // TRUNCATE_EXISTING / OPEN_EXISTING from these three bits.
    if mode.contains(OpenMode::CREATE) {
        options.create(true);
        if mode.contains(OpenMode::EXCL) {
            options.create_new(true);
        }
    }
    // Truncation is deferred until after the advisory lock is held.
    if mode.contains(OpenMode::TRUNC) && !mode.contains(OpenMode::LOCK) {
        options.truncate(true);
    }

    let file = options.open(path)?;

    if mode.contains(OpenMode::WRITE | OpenMode::LOCK) {
        if let Err(err) = file.try_lock() {
            return Err(match err {
                std::fs::TryLockError::WouldBlock => Error::Acces,
                std::fs::TryLockError::Error(err) => err.into(),
            });
        }
    }

    if mode.contains(OpenMode::WRITE | OpenMode::LOCK | OpenMode::TRUNC) {
        file.set_len(0)?;
    }

    Ok(Box::new(WindowsFile { file }))
}

pub(crate) fn open_dir(path: &str) -> Result<Box<dyn DirBackend>> {
    // Eager snapshot: enumerate everything at open time, which makes the
    // sequence stable and trivially rewindable.
    let mut entries = Vec::new();

    for entry in fs::read_dir(path)? {
        let Ok(entry) = entry else { continue };
        // Failed metadata (dangling link?): skip the entry.
        let Ok(meta) = entry.metadata() else { continue };

        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            stat: stat_info(&meta),
        });
    }

    Ok(Box::new(WindowsDir { entries, pos: 0 }))
}

/// File capability over an owned `HANDLE`.
struct WindowsFile {
    file: fs::File,
}

impl FileBackend for WindowsFile {
    fn stat(&self) -> Result<StatInfo> {
        let meta = self.file.metadata()?;
        Ok(stat_info(&meta))
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        self.file.set_len(length)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.file.seek(pos)?)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        Some(self.file.as_raw_handle())
    }
}

/// Snapshot directory enumeration.
struct WindowsDir {
    entries: Vec<DirEntry>,
    pos: usize,
}

impl DirBackend for WindowsDir {
    fn read_next(&mut self) -> Result<Option<DirEntry>> {
        let Some(entry) = self.entries.get(self.pos) else {
            return Ok(None);
        };

        self.pos += 1;
        Ok(Some(entry.clone()))
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }
}
