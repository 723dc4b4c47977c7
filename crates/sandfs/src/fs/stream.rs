//! Directory listing streams.

use std::fmt;

use crate::path::VfsPath;

/// Predicate deciding which directory entries a stream yields.
pub type EntryFilter = Box<dyn Fn(&VfsPath) -> bool + Send + Sync>;

/// Filter that accepts every entry.
pub fn accept_all() -> EntryFilter {
    Box::new(|_| true)
}

/// Lazy sequence of directory entry paths.
///
/// Entries are captured when the stream is opened; the filter runs as the
/// stream is consumed, so entries the caller never reaches are never
/// filtered.
pub struct DirectoryStream {
    entries: std::vec::IntoIter<VfsPath>,
    filter: EntryFilter,
}

impl DirectoryStream {
    pub fn new(entries: Vec<VfsPath>, filter: EntryFilter) -> Self {
        Self {
            entries: entries.into_iter(),
            filter,
        }
    }
}

impl Iterator for DirectoryStream {
    type Item = VfsPath;

    fn next(&mut self) -> Option<VfsPath> {
        let filter = &self.filter;
        self.entries.by_ref().find(|path| filter(path))
    }
}

impl fmt::Debug for DirectoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryStream")
            .field("remaining", &self.entries.len())
            .finish()
    }
}
