//! Descriptor-based native backend for unix targets.

use std::ffi::{CStr, CString};
use std::io::{self, IoSlice, SeekFrom};
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::backend::{DirBackend, FileBackend, NativeHandle};
use crate::error::{Error, Result};
use crate::types::{DeviceStat, DirEntry, OpenMode, StatInfo};

/// `writev` is issued in chunks of this many iovecs per call.
const IOV_BATCH: usize = 256;

fn cstr(path: &str) -> Result<CString> {
    CString::new(path).map_err(|_| Error::Inval)
}

fn sys_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn stat_info(st: &libc::stat) -> StatInfo {
    StatInfo {
        is_directory: st.st_mode & libc::S_IFMT == libc::S_IFDIR,
        // Owner-write bit only: an approximation, not an ACL check.
        is_writable: st.st_mode & 0o200 != 0,
        size: st.st_size as u64,
        atime: sys_time(st.st_atime as i64),
        mtime: sys_time(st.st_mtime as i64),
        ctime: sys_time(st.st_mtime as i64),
    }
    .clamp_atime()
}

pub(crate) fn stat(path: &str) -> Result<StatInfo> {
    let cpath = cstr(path)?;

    let mut st: libc::stat = unsafe { mem::zeroed() };
    if unsafe { libc::stat(cpath.as_ptr(), &mut st) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(stat_info(&st))
}

pub(crate) fn statfs(path: &str) -> Result<DeviceStat> {
    let cpath = cstr(path)?;

    let mut buf: libc::statvfs = unsafe { mem::zeroed() };
    if unsafe { libc::statvfs(cpath.as_ptr(), &mut buf) } != 0 {
        return Err(Error::last_os_error());
    }

    let block_size = buf.f_frsize as u64;
    Ok(DeviceStat {
        block_size,
        total_size: block_size * buf.f_blocks as u64,
        total_free: block_size * buf.f_bfree as u64,
        avail_free: block_size * buf.f_bavail as u64,
    })
}

pub(crate) fn create_dir(path: &str) -> Result<()> {
    let cpath = cstr(path)?;

    if unsafe { libc::mkdir(cpath.as_ptr(), 0o755) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

pub(crate) fn remove_dir(path: &str) -> Result<()> {
    let cpath = cstr(path)?;

    if unsafe { libc::rmdir(cpath.as_ptr()) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

pub(crate) fn remove_file(path: &str) -> Result<()> {
    let cpath = cstr(path)?;

    if unsafe { libc::unlink(cpath.as_ptr()) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

pub(crate) fn truncate(path: &str, length: u64) -> Result<()> {
    let cpath = cstr(path)?;

    if unsafe { libc::truncate(cpath.as_ptr(), length as libc::off_t) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

fn timeval(time: SystemTime) -> libc::timeval {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => libc::timeval {
            tv_sec: d.as_secs() as libc::time_t,
            tv_usec: d.subsec_micros() as libc::suseconds_t,
        },
        Err(e) => libc::timeval {
            tv_sec: -(e.duration().as_secs() as libc::time_t),
            tv_usec: 0,
        },
    }
}

pub(crate) fn set_times(path: &str, atime: SystemTime, mtime: SystemTime) -> Result<()> {
    let cpath = cstr(path)?;
    let times = [timeval(atime), timeval(mtime)];

    if unsafe { libc::utimes(cpath.as_ptr(), times.as_ptr()) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

pub(crate) fn rename(from: &str, to: &str, overwrite: bool) -> Result<()> {
    let cfrom = cstr(from)?;
    let cto = cstr(to)?;

    #[cfg(target_os = "linux")]
    {
        const RENAME_NOREPLACE: libc::c_uint = 1;

        let flags = if overwrite { 0 } else { RENAME_NOREPLACE };
        let res = unsafe {
            libc::syscall(
                libc::SYS_renameat2,
                libc::AT_FDCWD,
                cfrom.as_ptr(),
                libc::AT_FDCWD,
                cto.as_ptr(),
                flags,
            )
        };

        if res == 0 {
            return Ok(());
        }

        // Filesystems without RENAME_NOREPLACE report EINVAL; only that
        // case falls through to the probe-then-rename path.
        let err = io::Error::last_os_error();
        if overwrite || err.raw_os_error() != Some(libc::EINVAL) {
            return Err(err.into());
        }
    }

    if !overwrite {
        let mut st: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::stat(cto.as_ptr(), &mut st) } == 0 {
            return Err(Error::Exist);
        }
    }

    if unsafe { libc::rename(cfrom.as_ptr(), cto.as_ptr()) } != 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

/// Translate the portable open-mode bit-set into `O_*` flags and open.
pub(crate) fn open(path: &str, mode: OpenMode) -> Result<Box<dyn FileBackend>> {
    let cpath = cstr(path)?;

    // Close on exec, always.
    let mut flags = libc::O_CLOEXEC;

    if mode.contains(OpenMode::READ | OpenMode::WRITE) {
        flags |= libc::O_RDWR;
    } else if mode.contains(OpenMode::READ) {
        flags |= libc::O_RDONLY;
    } else if mode.contains(OpenMode::WRITE) {
        flags |= libc::O_WRONLY;
    }

    if mode.contains(OpenMode::APPEND) {
        flags |= libc::O_APPEND;
    }
    if mode.contains(OpenMode::CREATE) {
        flags |= libc::O_CREAT;
    }
    // Truncation is deferred until after the advisory lock is held.
    if mode.contains(OpenMode::TRUNC) && !mode.contains(OpenMode::LOCK) {
        flags |= libc::O_TRUNC;
    }
    if mode.contains(OpenMode::EXCL) {
        flags |= libc::O_EXCL;
    }

    let mut perm: libc::c_uint = 0o644;

    if mode.contains(OpenMode::WRITE | OpenMode::UNREAD) {
        if mode.contains(OpenMode::CREATE | OpenMode::TRUNC)
            && !mode.intersects(OpenMode::EXCL | OpenMode::LOCK)
        {
            // Unread files are recreated from scratch instead of truncated
            // so the new permission bits actually apply.
            unsafe { libc::unlink(cpath.as_ptr()) };
        }

        perm = 0;
    }

    let fd = unsafe { libc::open(cpath.as_ptr(), flags, perm) };
    if fd < 0 {
        return Err(Error::last_os_error());
    }

    // Owns the descriptor from here on; early returns close it.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    if mode.contains(OpenMode::WRITE | OpenMode::LOCK)
        && unsafe { libc::flock(fd.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0
    {
        let err = io::Error::last_os_error();
        return Err(if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Error::Acces
        } else {
            err.into()
        });
    }

    if mode.contains(OpenMode::WRITE | OpenMode::LOCK | OpenMode::TRUNC)
        && unsafe { libc::ftruncate(fd.as_raw_fd(), 0) } != 0
    {
        return Err(Error::last_os_error());
    }

    Ok(Box::new(UnixFile { fd }))
}

pub(crate) fn open_dir(path: &str) -> Result<Box<dyn DirBackend>> {
    let cpath = cstr(path)?;

    let dir = unsafe { libc::opendir(cpath.as_ptr()) };
    if dir.is_null() {
        return Err(Error::last_os_error());
    }

    Ok(Box::new(UnixDir { dir }))
}

/// File capability over a raw descriptor.
struct UnixFile {
    fd: OwnedFd,
}

impl FileBackend for UnixFile {
    fn stat(&self) -> Result<StatInfo> {
        let mut st: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::fstat(self.fd.as_raw_fd(), &mut st) } != 0 {
            return Err(Error::last_os_error());
        }

        Ok(stat_info(&st))
    }

    fn sync(&mut self) -> Result<()> {
        if unsafe { libc::fsync(self.fd.as_raw_fd()) } != 0 {
            return Err(Error::last_os_error());
        }

        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        if unsafe { libc::ftruncate(self.fd.as_raw_fd(), length as libc::off_t) } != 0 {
            return Err(Error::last_os_error());
        }

        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let got = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if got < 0 {
            return Err(Error::last_os_error());
        }

        Ok(got as usize)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let put = unsafe { libc::write(self.fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
        if put < 0 {
            return Err(Error::last_os_error());
        }

        Ok(put as usize)
    }

    fn write_gather(&mut self, bufs: &[IoSlice<'_>]) -> Result<u64> {
        let mut total = 0u64;

        for chunk in bufs.chunks(IOV_BATCH) {
            // IoSlice is guaranteed ABI-compatible with iovec.
            let put = unsafe {
                libc::writev(
                    self.fd.as_raw_fd(),
                    chunk.as_ptr().cast::<libc::iovec>(),
                    chunk.len() as libc::c_int,
                )
            };
            if put < 0 {
                return Err(Error::last_os_error());
            }

            total += put as u64;
        }

        Ok(total)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(offset) => (offset as i64, libc::SEEK_SET),
            SeekFrom::Current(offset) => (offset, libc::SEEK_CUR),
            SeekFrom::End(offset) => (offset, libc::SEEK_END),
        };

        let new_pos =
            unsafe { libc::lseek(self.fd.as_raw_fd(), offset as libc::off_t, whence) };
        if new_pos < 0 {
            return Err(Error::last_os_error());
        }

        Ok(new_pos as u64)
    }

    fn size(&self) -> Result<u64> {
        let mut st: libc::stat = unsafe { mem::zeroed() };
        if unsafe { libc::fstat(self.fd.as_raw_fd(), &mut st) } != 0 {
            return Err(Error::last_os_error());
        }

        Ok(st.st_size as u64)
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        Some(self.fd.as_raw_fd())
    }
}

/// Lazy directory enumeration over `readdir`.
struct UnixDir {
    dir: *mut libc::DIR,
}

// The DIR stream is owned exclusively and carries a single cursor.
unsafe impl Send for UnixDir {}

impl Drop for UnixDir {
    fn drop(&mut self) {
        unsafe { libc::closedir(self.dir) };
    }
}

impl DirBackend for UnixDir {
    fn read_next(&mut self) -> Result<Option<DirEntry>> {
        loop {
            let found = unsafe { libc::readdir(self.dir) };
            if found.is_null() {
                return Ok(None);
            }

            let name_ptr = unsafe { (*found).d_name.as_ptr() };
            let mut st: libc::stat = unsafe { mem::zeroed() };

            if unsafe { libc::fstatat(libc::dirfd(self.dir), name_ptr, &mut st, 0) } != 0 {
                // Failed metadata (broken symlink?): skip to the next entry.
                continue;
            }

            let name = unsafe { CStr::from_ptr(name_ptr) }
                .to_string_lossy()
                .into_owned();

            return Ok(Some(DirEntry {
                name,
                stat: stat_info(&st),
            }));
        }
    }

    fn rewind(&mut self) {
        unsafe { libc::rewinddir(self.dir) };
    }
}
