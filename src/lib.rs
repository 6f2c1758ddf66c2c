//! Capability-based filesystem abstraction with virtual-device dispatch.
//!
//! `virtfs` fronts the native filesystem and in-process virtual devices
//! behind one uniform API. Every path-accepting operation on [`Vfs`] first
//! consults the device registry: paths beginning with two separators
//! (`//name/...`) are routed to the [`Device`] provider registered under
//! that name, everything else goes to the native platform backend. The
//! [`File`] and [`Dir`] facades are backend-agnostic, so callers never see
//! which backend served them.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use virtfs::{OpenMode, Vfs};
//!
//! # fn main() -> virtfs::Result<()> {
//! let vfs = Vfs::new();
//!
//! let mut file = vfs.open("/tmp/data.bin", OpenMode::rewrite())?;
//! file.write(b"hello")?;
//!
//! // Atomic replacement: the destination is never observed half-written.
//! let mut tx = vfs.pending("/tmp/config.bin")?;
//! tx.file().write(b"v2")?;
//! tx.commit(true)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! Four backend families implement the [`FileBackend`] / [`DirBackend`]
//! capabilities:
//!
//! - the native platform backend (descriptor-based on unix, handle-based
//!   on windows), reached through [`Vfs`] for non-virtual paths;
//! - whatever a registered [`Device`] provider returns for its paths;
//! - a fixed read-only memory buffer ([`File::from_bytes`]);
//! - a read-only logical concatenation of files ([`File::gather`]).
//!
//! # Errors
//!
//! All fallible operations return [`Result`] with the closed [`Error`]
//! taxonomy; anticipated conditions (missing file, permission, exists) are
//! reported as values, never panics. Contract violations — a malformed
//! device name, a cross-provider rename — panic, since they indicate a
//! programming error rather than an environmental condition.

mod backend;
mod device;
mod dir;
mod error;
mod file;
mod gather;
mod native;
mod path;
mod pending;
mod types;
mod vfs;

pub use backend::{DirBackend, FileBackend, NativeHandle};
pub use device::{Device, DeviceRegistry};
pub use dir::Dir;
pub use error::{Error, Result};
pub use file::File;
pub use path::{parent_of, path_append};
pub use pending::PendingFile;
pub use types::{DeviceStat, DirEntry, OpenMode, StatInfo};
pub use vfs::Vfs;
