//! Top-level filesystem operations with virtual-device dispatch.

use std::sync::Arc;
use std::time::SystemTime;

use log::trace;

use crate::device::{Device, DeviceRegistry};
use crate::dir::Dir;
use crate::error::{Error, Result};
use crate::file::File;
use crate::native::platform;
use crate::path::{parent_of, path_append};
use crate::pending::PendingFile;
use crate::types::{DeviceStat, OpenMode, StatInfo};

/// Copy buffer size for the generic facade-to-facade loop.
const COPY_CHUNK: usize = 64 * 1024;

/// The filesystem entry point.
///
/// Every path-accepting operation consults the owned [`DeviceRegistry`]
/// first: paths beginning with two separators are routed to the matching
/// virtual provider, everything else goes to the native platform backend.
/// Callers never see which backend served them.
///
/// `Vfs` is cheap to share behind an `Arc` and all methods take `&self`.
#[derive(Default)]
pub struct Vfs {
    devices: DeviceRegistry,
}

/// Round `value` up to the next multiple of `align` (`align <= 1` is a
/// no-op).
fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.next_multiple_of(align)
    }
}

/// Empty paths never reach a backend.
fn guard(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::NoEnt);
    }
    Ok(())
}

impl Vfs {
    /// Create a filesystem with an empty device registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a virtual device provider under `name` (e.g. `//cache`),
    /// returning the evicted previous registration if any.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a well-formed device name; see
    /// [`DeviceRegistry::register`].
    pub fn register_device(
        &self,
        name: &str,
        device: Arc<dyn Device>,
    ) -> Option<Arc<dyn Device>> {
        self.devices.register(name, device)
    }

    /// Query metadata for a path.
    pub fn stat(&self, path: &str) -> Result<StatInfo> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.stat(path),
            None => platform::stat(path),
        }
    }

    /// Whether the path resolves to any node at all.
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Whether the path resolves to a regular file.
    ///
    /// Missing paths report `Ok(false)`; an existing node of the wrong
    /// type fails with [`Error::Exist`].
    pub fn is_file(&self, path: &str) -> Result<bool> {
        match self.stat(path) {
            Ok(info) if info.is_directory => Err(Error::Exist),
            Ok(_) => Ok(true),
            Err(Error::NoEnt) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether the path resolves to a directory.
    ///
    /// Missing paths report `Ok(false)`; an existing node of the wrong
    /// type fails with [`Error::Exist`].
    pub fn is_dir(&self, path: &str) -> Result<bool> {
        match self.stat(path) {
            Ok(info) if !info.is_directory => Err(Error::Exist),
            Ok(_) => Ok(true),
            Err(Error::NoEnt) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Capacity information for the volume (or virtual device) containing
    /// `path`.
    pub fn statfs(&self, path: &str) -> Result<DeviceStat> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.statfs(path),
            None => platform::statfs(path),
        }
    }

    /// Create a directory. The parent must already exist.
    pub fn create_dir(&self, path: &str) -> Result<()> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.create_dir(path),
            None => platform::create_dir(path),
        }
    }

    /// Create a directory along with any missing ancestors.
    ///
    /// "Already exists" from the final creation step counts as success.
    pub fn create_path(&self, path: &str) -> Result<()> {
        match self.create_dir(path) {
            Ok(()) | Err(Error::Exist) => Ok(()),
            Err(Error::NoEnt) => {
                let parent = parent_of(path);
                if parent == path {
                    return Err(Error::NoEnt);
                }
                self.create_path(&parent)?;

                match self.create_dir(path) {
                    Ok(()) | Err(Error::Exist) => Ok(()),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Remove an empty directory.
    pub fn remove_dir(&self, path: &str) -> Result<()> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.remove_dir(path),
            None => platform::remove_dir(path),
        }
    }

    /// Remove a file.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.remove_file(path),
            None => platform::remove_file(path),
        }
    }

    /// Rename `from` onto `to`.
    ///
    /// With `overwrite` unset an existing destination fails with
    /// [`Error::Exist`] instead of being replaced.
    ///
    /// # Panics
    ///
    /// Panics if the two paths resolve to different providers (or one is
    /// virtual and the other native) — no cross-device move primitive
    /// exists at this layer.
    pub fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        guard(from)?;
        guard(to)?;

        match (self.devices.lookup(from), self.devices.lookup(to)) {
            (Some(a), Some(b)) => {
                assert!(
                    Arc::ptr_eq(&a, &b),
                    "cross-provider rename: {from:?} -> {to:?}"
                );
                a.rename(from, to, overwrite)
            }
            (None, None) => platform::rename(from, to, overwrite),
            _ => panic!("cross-provider rename: {from:?} -> {to:?}"),
        }
    }

    /// Copy a file's contents from `from` to `to` through the facades.
    ///
    /// With `overwrite` unset an existing destination fails with
    /// [`Error::Exist`]; otherwise it is truncated and rewritten.
    ///
    /// # Panics
    ///
    /// Panics if the two paths resolve to different providers, matching
    /// [`rename`](Self::rename).
    pub fn copy(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        guard(from)?;
        guard(to)?;

        match (self.devices.lookup(from), self.devices.lookup(to)) {
            (Some(a), Some(b)) => assert!(
                Arc::ptr_eq(&a, &b),
                "cross-provider copy: {from:?} -> {to:?}"
            ),
            (None, None) => {}
            _ => panic!("cross-provider copy: {from:?} -> {to:?}"),
        }

        let mut src = self.open(from, OpenMode::READ)?;

        let mut mode = OpenMode::WRITE | OpenMode::CREATE;
        mode |= if overwrite {
            OpenMode::TRUNC
        } else {
            OpenMode::EXCL
        };
        let mut dst = self.open(to, mode)?;

        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = src.read(&mut buf)?;
            if n == 0 {
                break;
            }

            let mut done = 0;
            while done < n {
                let written = dst.write(&buf[done..n])?;
                if written == 0 {
                    return Err(Error::NoSpace);
                }
                done += written;
            }
        }

        trace!("copied {from} -> {to}");
        Ok(())
    }

    /// Set the length of the file at `path`.
    pub fn truncate(&self, path: &str, length: u64) -> Result<()> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.truncate(path, length),
            None => platform::truncate(path, length),
        }
    }

    /// Set the access and modification times of the node at `path`.
    pub fn set_times(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> Result<()> {
        guard(path)?;
        match self.devices.lookup(path) {
            Some(dev) => dev.set_times(path, atime, mtime),
            None => platform::set_times(path, atime, mtime),
        }
    }

    /// Open a file.
    ///
    /// `EXCL` without `CREATE` is a contract violation rejected with
    /// [`Error::Inval`] before any backend is consulted.
    pub fn open(&self, path: &str, mode: OpenMode) -> Result<File> {
        guard(path)?;
        if mode.contains(OpenMode::EXCL) && !mode.contains(OpenMode::CREATE) {
            return Err(Error::Inval);
        }

        let backend = match self.devices.lookup(path) {
            Some(dev) => dev.open_file(path, mode)?,
            None => platform::open(path, mode)?,
        };

        Ok(File::from_backend(backend))
    }

    /// Open a directory for enumeration.
    pub fn open_dir(&self, path: &str) -> Result<Dir> {
        guard(path)?;
        let backend = match self.devices.lookup(path) {
            Some(dev) => dev.open_dir(path)?,
            None => platform::open_dir(path)?,
        };

        Ok(Dir::from_backend(backend))
    }

    /// Recursively delete everything under `path`, then `path` itself when
    /// `remove_root` is set.
    ///
    /// Stops at the first failing sub-operation, leaving the partially
    /// deleted state in place.
    pub fn remove_all(&self, path: &str, remove_root: bool) -> Result<()> {
        let mut dir = self.open_dir(path)?;

        while let Some(entry) = dir.read_next()? {
            if entry.name == "." || entry.name == ".." {
                continue;
            }

            let child = path_append(path, &entry.name);
            if entry.is_directory() {
                self.remove_all(&child, true)?;
            } else {
                self.remove_file(&child)?;
            }
        }
        drop(dir);

        if remove_root {
            self.remove_dir(path)?;
        }
        Ok(())
    }

    /// Recursively sum file sizes under `path`, rounding each file's size
    /// up to `rounding_alignment` before accumulating.
    ///
    /// `None` means the total is unknown because a sub-listing failed.
    pub fn dir_size(&self, path: &str, rounding_alignment: u64) -> Option<u64> {
        let mut dir = self.open_dir(path).ok()?;
        let mut total = 0u64;

        while let Some(entry) = dir.read_next().ok()? {
            if entry.name == "." || entry.name == ".." {
                continue;
            }

            if entry.is_directory() {
                total += self.dir_size(&path_append(path, &entry.name), rounding_alignment)?;
            } else {
                total += align_up(entry.stat.size, rounding_alignment);
            }
        }

        Some(total)
    }

    /// Begin an atomic replacement of the file at `path`.
    ///
    /// See [`PendingFile`] for the transaction protocol.
    pub fn pending(&self, path: &str) -> Result<PendingFile<'_>> {
        guard(path)?;
        PendingFile::new(self, path)
    }
}
