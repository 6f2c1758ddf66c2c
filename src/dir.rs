//! The owning directory facade.

use crate::backend::DirBackend;
use crate::error::Result;
use crate::types::DirEntry;

/// An open directory handle bound to exactly one backend.
///
/// Provides iteration by repeated [`read_next`](Self::read_next); the
/// sequence is single-pass and non-restartable except through
/// [`rewind`](Self::rewind). `&mut Dir` also implements [`Iterator`] for
/// range-for loops; enumeration errors terminate that iteration.
pub struct Dir {
    backend: Box<dyn DirBackend>,
}

impl Dir {
    /// Wrap an already-constructed backend.
    pub fn from_backend(backend: Box<dyn DirBackend>) -> Self {
        Self { backend }
    }

    /// Produce the next entry, or `Ok(None)` when exhausted.
    ///
    /// `.` and `..` pseudo-entries may appear. Entries whose metadata
    /// query fails are skipped by the backend.
    pub fn read_next(&mut self) -> Result<Option<DirEntry>> {
        self.backend.read_next()
    }

    /// Reset the enumeration to its start.
    pub fn rewind(&mut self) {
        self.backend.rewind();
    }
}

impl Iterator for &mut Dir {
    type Item = DirEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().ok().flatten()
    }
}

impl std::fmt::Debug for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dir").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatInfo;

    struct FixedDir {
        names: Vec<&'static str>,
        pos: usize,
    }

    impl DirBackend for FixedDir {
        fn read_next(&mut self) -> Result<Option<DirEntry>> {
            let Some(name) = self.names.get(self.pos) else {
                return Ok(None);
            };
            self.pos += 1;
            Ok(Some(DirEntry {
                name: (*name).to_owned(),
                stat: StatInfo::default(),
            }))
        }

        fn rewind(&mut self) {
            self.pos = 0;
        }
    }

    #[test]
    fn exhausted_until_rewind() {
        let mut dir = Dir::from_backend(Box::new(FixedDir {
            names: vec!["a", "b"],
            pos: 0,
        }));

        assert_eq!(dir.read_next().unwrap().unwrap().name, "a");
        assert_eq!(dir.read_next().unwrap().unwrap().name, "b");
        assert!(dir.read_next().unwrap().is_none());
        assert!(dir.read_next().unwrap().is_none());

        dir.rewind();
        assert_eq!(dir.read_next().unwrap().unwrap().name, "a");
    }

    #[test]
    fn iterator_adapter_yields_all() {
        let mut dir = Dir::from_backend(Box::new(FixedDir {
            names: vec!["x", "y", "z"],
            pos: 0,
        }));

        let names: Vec<_> = (&mut dir).map(|e| e.name).collect();
        assert_eq!(names, ["x", "y", "z"]);
    }
}
