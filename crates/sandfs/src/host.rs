//! Host filesystem contract
//!
//! The operation set an embedding host calls when a sandboxed workload
//! touches the filesystem. [`crate::SandboxFs`] implements it over an
//! in-memory engine; a host can also implement it for its own filesystems.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::fs::{
    AccessMode, AttributeMap, AttributeValue, CopyOption, DirectoryStream, EntryFilter,
    FileAttribute, LinkOption, OpenOption, SeekableChannel,
};
use crate::path::VfsPath;

/// Filesystem interface consumed by the host.
///
/// Path arguments may be relative. Implementations decide how relative paths
/// are resolved; [`crate::SandboxFs`] resolves them against its current
/// working directory.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` for concurrent access.
#[async_trait]
pub trait HostFileSystem: Send + Sync {
    /// Convert a filesystem URI into a path.
    fn parse_uri(&self, uri: &Url) -> Result<VfsPath>;

    /// Convert a path string into a path.
    fn parse_path(&self, path: &str) -> Result<VfsPath>;

    /// Check that `path` exists and grants `modes`.
    async fn check_access(
        &self,
        path: &VfsPath,
        modes: &[AccessMode],
        link_options: &[LinkOption],
    ) -> Result<()>;

    async fn create_directory(&self, dir: &VfsPath, attrs: &[FileAttribute]) -> Result<()>;

    async fn delete(&self, path: &VfsPath) -> Result<()>;

    async fn copy(&self, source: &VfsPath, target: &VfsPath, options: &[CopyOption])
    -> Result<()>;

    async fn move_path(
        &self,
        source: &VfsPath,
        target: &VfsPath,
        options: &[CopyOption],
    ) -> Result<()>;

    /// Open a channel for reading and/or writing. The caller owns it.
    async fn new_byte_channel(
        &self,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
    ) -> Result<Box<dyn SeekableChannel>>;

    /// List `dir`, yielding entries accepted by `filter`.
    async fn new_directory_stream(
        &self,
        dir: &VfsPath,
        filter: EntryFilter,
    ) -> Result<DirectoryStream>;

    /// Create a hard link at `link` to `existing`.
    async fn create_link(&self, link: &VfsPath, existing: &VfsPath) -> Result<()>;

    /// Create a symbolic link at `link` pointing at `target`.
    async fn create_symbolic_link(
        &self,
        link: &VfsPath,
        target: &VfsPath,
        attrs: &[FileAttribute],
    ) -> Result<()>;

    async fn read_symbolic_link(&self, link: &VfsPath) -> Result<VfsPath>;

    /// Read attributes named by `"[view:]name,..."`.
    async fn read_attributes(
        &self,
        path: &VfsPath,
        attributes: &str,
        options: &[LinkOption],
    ) -> Result<AttributeMap>;

    /// Set one `"[view:]name"` attribute.
    async fn set_attribute(
        &self,
        path: &VfsPath,
        attribute: &str,
        value: AttributeValue,
        options: &[LinkOption],
    ) -> Result<()>;

    /// Absolute form of `path`.
    fn to_absolute_path(&self, path: &VfsPath) -> VfsPath;

    /// Replace the working directory used for relative paths.
    fn set_current_working_directory(&self, path: VfsPath);

    /// Canonical absolute path with links resolved.
    async fn to_real_path(&self, path: &VfsPath, options: &[LinkOption]) -> Result<VfsPath>;
}
