//! Filesystem engine trait definitions

use async_trait::async_trait;
use url::Url;

use super::attributes::{AttributeMap, AttributeValue, FileAttribute};
use super::channel::SeekableChannel;
use super::stream::{DirectoryStream, EntryFilter};
use crate::error::Result;
use crate::path::{PathSyntax, VfsPath};

/// Access requested from [`FileSystemProvider::check_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

/// How symbolic links are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkOption {
    /// Operate on a trailing symbolic link itself instead of its target.
    NoFollowLinks,
}

/// True unless `options` contains [`LinkOption::NoFollowLinks`].
pub fn follows_links(options: &[LinkOption]) -> bool {
    !options.contains(&LinkOption::NoFollowLinks)
}

/// Options for copy and move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyOption {
    ReplaceExisting,
    CopyAttributes,
    AtomicMove,
    NoFollowLinks,
}

/// Options for opening a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenOption {
    Read,
    Write,
    Append,
    TruncateExisting,
    Create,
    CreateNew,
    DeleteOnClose,
    Sparse,
    Sync,
    Dsync,
    NoFollowLinks,
}

/// Capability interface of an in-memory filesystem engine.
///
/// This is the POSIX-like primitive set the facade dispatches to. Paths
/// reaching an engine may still be relative; the engine resolves them against
/// its own default working directory.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` for concurrent access.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    /// Path syntax used by this engine.
    fn syntax(&self) -> PathSyntax;

    /// Parse a path string.
    fn parse_path(&self, path: &str) -> Result<VfsPath>;

    /// Parse a filesystem URI into an absolute path.
    fn parse_uri(&self, uri: &Url) -> Result<VfsPath>;

    /// URI naming `path` (made absolute first).
    fn to_uri(&self, path: &VfsPath) -> Result<Url>;

    /// Engine default absolute form of `path`.
    fn to_absolute(&self, path: &VfsPath) -> VfsPath;

    /// Check that `path` exists (following links) and grants `modes`.
    async fn check_access(&self, path: &VfsPath, modes: &[AccessMode]) -> Result<()>;

    /// Create a directory. The parent must exist.
    async fn create_directory(&self, dir: &VfsPath, attrs: &[FileAttribute]) -> Result<()>;

    /// Delete a file, empty directory or link.
    async fn delete(&self, path: &VfsPath) -> Result<()>;

    /// Copy a file, link or (shallow) directory.
    async fn copy(&self, source: &VfsPath, target: &VfsPath, options: &[CopyOption])
    -> Result<()>;

    /// Move or rename an entry.
    async fn move_path(
        &self,
        source: &VfsPath,
        target: &VfsPath,
        options: &[CopyOption],
    ) -> Result<()>;

    /// Open a file channel.
    ///
    /// Returns [`crate::Error::Unsupported`] when the option set needs the
    /// general byte channel instead.
    async fn new_file_channel(
        &self,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
    ) -> Result<Box<dyn SeekableChannel>>;

    /// Open a general byte channel.
    async fn new_byte_channel(
        &self,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
    ) -> Result<Box<dyn SeekableChannel>>;

    /// List a directory.
    async fn new_directory_stream(
        &self,
        dir: &VfsPath,
        filter: EntryFilter,
    ) -> Result<DirectoryStream>;

    /// Create a hard link to an existing regular file.
    async fn create_link(&self, link: &VfsPath, existing: &VfsPath) -> Result<()>;

    /// Create a symbolic link pointing at `target`.
    async fn create_symbolic_link(
        &self,
        link: &VfsPath,
        target: &VfsPath,
        attrs: &[FileAttribute],
    ) -> Result<()>;

    /// Read a symbolic link's target.
    async fn read_symbolic_link(&self, link: &VfsPath) -> Result<VfsPath>;

    /// Read attributes (`"[view:]name,..."` or `"[view:]*"`).
    async fn read_attributes(
        &self,
        path: &VfsPath,
        attributes: &str,
        options: &[LinkOption],
    ) -> Result<AttributeMap>;

    /// Set a single `view:name` attribute.
    async fn set_attribute(
        &self,
        path: &VfsPath,
        attribute: &str,
        value: AttributeValue,
        options: &[LinkOption],
    ) -> Result<()>;

    /// Canonical absolute path with links resolved.
    async fn to_real_path(&self, path: &VfsPath, options: &[LinkOption]) -> Result<VfsPath>;

    /// Release the engine. Later operations may fail with
    /// [`crate::Error::Closed`].
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follows_links_by_default() {
        assert!(follows_links(&[]));
        assert!(!follows_links(&[LinkOption::NoFollowLinks]));
    }
}
