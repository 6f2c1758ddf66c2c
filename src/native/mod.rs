//! OS-specific implementations of the file and directory capabilities.
//!
//! Exactly one backend module is compiled per target: the descriptor-based
//! unix backend and the handle-based windows backend expose the same
//! `pub(crate)` surface, re-exported here as `platform` for the top-level
//! operations in [`crate::vfs`].

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(windows)]
pub(crate) use windows as platform;
