//! Virtual device providers and the registry that dispatches to them.
//!
//! Any path beginning with two separators is reserved for virtual devices;
//! the device name is the substring up to (excluding) the next separator,
//! e.g. `//savedata/slot0/file.bin` is served by the provider registered
//! under `//savedata`. Real filesystem paths must never begin with two
//! separators. Every path-accepting top-level operation consults the
//! registry first; on a hit it delegates entirely to the provider and the
//! native backend is never touched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;
use parking_lot::RwLock;

use crate::backend::{DirBackend, FileBackend};
use crate::error::Result;
use crate::types::{DeviceStat, OpenMode, StatInfo};

/// An in-process provider serving all filesystem operations for paths
/// under one reserved `//name` prefix.
///
/// Providers are invoked from arbitrary caller threads and must be
/// internally thread-safe to the same standard as the native backends.
/// Each method receives the full original path (including the device
/// prefix) and must satisfy the same operation contracts as the native
/// implementations. A method the provider cannot support should fail with
/// the most specific applicable [`Error`](crate::Error) rather than panic.
pub trait Device: Send + Sync {
    /// Query metadata for a path.
    fn stat(&self, path: &str) -> Result<StatInfo>;

    /// Query capacity information for the device.
    fn statfs(&self, path: &str) -> Result<DeviceStat>;

    /// Create a directory. The parent must already exist.
    fn create_dir(&self, path: &str) -> Result<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &str) -> Result<()>;

    /// Rename a node. Both paths are guaranteed to resolve to this device.
    fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<()>;

    /// Set the length of a file.
    fn truncate(&self, path: &str, length: u64) -> Result<()>;

    /// Set access and modification times.
    fn set_times(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> Result<()>;

    /// Open a file, returning its backend.
    fn open_file(&self, path: &str, mode: OpenMode) -> Result<Box<dyn FileBackend>>;

    /// Open a directory for enumeration, returning its backend.
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirBackend>>;
}

/// Maps virtual path prefixes to providers.
///
/// Read-mostly: lookups during normal traffic take a shared lock and never
/// block each other; registration takes the exclusive lock. Held by
/// [`Vfs`](crate::Vfs).
#[derive(Default)]
pub struct DeviceRegistry {
    map: RwLock<HashMap<String, Arc<dyn Device>>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the provider serving `path`, if the path is virtual.
    ///
    /// Only paths beginning with two separators are recognized; everything
    /// from the first separator after the device name is stripped to form
    /// the registration key.
    pub fn lookup(&self, path: &str) -> Option<Arc<dyn Device>> {
        if !path.starts_with("//") {
            return None;
        }

        let key = match path[2..].find('/') {
            Some(at) => &path[..2 + at],
            None => path,
        };

        self.map.read().get(key).cloned()
    }

    /// Register `device` under `name`, returning the evicted previous
    /// registration if any (last registration wins).
    ///
    /// # Panics
    ///
    /// Panics if `name` does not start with exactly two separators
    /// followed by a non-separator — a malformed device name is a
    /// programming error, not an environmental condition.
    pub fn register(&self, name: &str, device: Arc<dyn Device>) -> Option<Arc<dyn Device>> {
        assert!(
            name.starts_with("//") && !name[2..].starts_with('/') && !name[2..].is_empty(),
            "invalid virtual device name: {name:?}"
        );

        debug!("registering virtual device {name}");
        self.map.write().insert(name.to_owned(), device)
    }
}
