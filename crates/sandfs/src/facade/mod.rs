//! Sandboxed filesystem facade
//!
//! [`SandboxFs`] implements the host contract over an engine. Every path
//! argument is resolved against the facade's working directory before it is
//! dispatched, and the engine's results and errors are passed back unchanged.
//! The one exception is the access check without link following, which the
//! engine has no primitive for.

mod resolver;

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::config::Configuration;
use crate::error::{Error, Result, fs_errors};
use crate::fs::{
    AccessMode, AttributeMap, AttributeValue, CopyOption, DirectoryStream, EntryFilter,
    FileAttribute, FileSystemProvider, LinkOption, MemoryFs, OpenOption, SeekableChannel,
    follows_links,
};
use crate::host::HostFileSystem;
use crate::logging_impl::LogConfig;
use crate::path::VfsPath;
use resolver::PathResolver;

/// Filesystem facade handed to a host.
///
/// # Example
///
/// ```rust
/// use sandfs::{Configuration, HostFileSystem, SandboxFs};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sandfs::Result<()> {
/// let fs = SandboxFs::create(Configuration::unix())?;
/// fs.create_directory(&fs.parse_path("/project")?, &[]).await?;
/// fs.set_current_working_directory(fs.parse_path("/project")?);
///
/// fs.create_directory(&fs.parse_path("src")?, &[]).await?;
/// let real = fs.to_real_path(&fs.parse_path("src")?, &[]).await?;
/// assert_eq!(real.to_string(), "/project/src");
/// # Ok(())
/// # }
/// ```
pub struct SandboxFs {
    provider: Arc<dyn FileSystemProvider>,
    resolver: PathResolver,
    owns_provider: bool,
}

impl SandboxFs {
    /// Wrap an existing engine. The caller keeps responsibility for closing it.
    pub fn new(provider: Arc<dyn FileSystemProvider>) -> Self {
        Self {
            resolver: PathResolver::new(Arc::clone(&provider)),
            provider,
            owns_provider: false,
        }
    }

    /// Create a fresh in-memory engine from `config` and wrap it.
    ///
    /// The engine is closed when the facade is dropped.
    pub fn create(config: Configuration) -> Result<Self> {
        let engine = MemoryFs::new(config)?;
        let mut fs = Self::new(Arc::new(engine));
        fs.owns_provider = true;
        Ok(fs)
    }

    /// Set how paths are formatted in log output.
    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.resolver.set_log_config(config);
        self
    }

    /// The engine operations are dispatched to.
    pub fn provider(&self) -> &Arc<dyn FileSystemProvider> {
        &self.provider
    }

    /// Working directory set by the host, if any.
    pub fn current_working_directory(&self) -> Option<VfsPath> {
        self.resolver.working_directory().map(|cwd| (*cwd).clone())
    }

    fn log_dispatch(&self, _op: &'static str, _path: &VfsPath) {
        #[cfg(feature = "logging")]
        tracing::debug!(
            op = _op,
            path = %self.resolver.log_config().format_path(_path),
            "dispatch"
        );
    }

    fn resolve(&self, op: &'static str, path: &VfsPath) -> VfsPath {
        let resolved = self.resolver.resolve(path);
        self.log_dispatch(op, &resolved);
        resolved
    }
}

impl Drop for SandboxFs {
    fn drop(&mut self) {
        if self.owns_provider {
            self.provider.close();
        }
    }
}

#[async_trait]
impl HostFileSystem for SandboxFs {
    fn parse_uri(&self, uri: &Url) -> Result<VfsPath> {
        self.provider.parse_uri(uri)
    }

    fn parse_path(&self, path: &str) -> Result<VfsPath> {
        self.provider.parse_path(path)
    }

    async fn check_access(
        &self,
        path: &VfsPath,
        modes: &[AccessMode],
        link_options: &[LinkOption],
    ) -> Result<()> {
        if follows_links(link_options) {
            let path = self.resolve("check_access", path);
            return self.provider.check_access(&path, modes).await;
        }
        if !modes.is_empty() {
            #[cfg(feature = "logging")]
            tracing::warn!(
                path = %self.resolver.log_config().format_path(path),
                modes = ?modes,
                "access check with NOFOLLOW_LINKS and access modes is unsupported"
            );
            return Err(Error::unsupported(
                "check_access with non-empty access modes and NOFOLLOW_LINKS",
            ));
        }

        let path = self.resolve("check_access", path);
        let attrs = self
            .provider
            .read_attributes(&path, "basic:isRegularFile", &[LinkOption::NoFollowLinks])
            .await?;
        match attrs.get("isRegularFile").and_then(AttributeValue::as_bool) {
            Some(true) => Ok(()),
            _ => Err(fs_errors::not_a_regular_file(&path)),
        }
    }

    async fn create_directory(&self, dir: &VfsPath, attrs: &[FileAttribute]) -> Result<()> {
        let dir = self.resolve("create_directory", dir);
        self.provider.create_directory(&dir, attrs).await
    }

    async fn delete(&self, path: &VfsPath) -> Result<()> {
        let path = self.resolve("delete", path);
        self.provider.delete(&path).await
    }

    async fn copy(
        &self,
        source: &VfsPath,
        target: &VfsPath,
        options: &[CopyOption],
    ) -> Result<()> {
        let source = self.resolve("copy", source);
        let target = self.resolver.resolve(target);
        self.provider.copy(&source, &target, options).await
    }

    async fn move_path(
        &self,
        source: &VfsPath,
        target: &VfsPath,
        options: &[CopyOption],
    ) -> Result<()> {
        let source = self.resolve("move", source);
        let target = self.resolver.resolve(target);
        self.provider.move_path(&source, &target, options).await
    }

    async fn new_byte_channel(
        &self,
        path: &VfsPath,
        options: &[OpenOption],
        attrs: &[FileAttribute],
    ) -> Result<Box<dyn SeekableChannel>> {
        let path = self.resolve("new_byte_channel", path);
        match self.provider.new_file_channel(&path, options, attrs).await {
            Err(Error::Unsupported(_reason)) => {
                #[cfg(feature = "logging")]
                tracing::warn!(
                    path = %self.resolver.log_config().format_path(&path),
                    reason = %_reason,
                    "file channel unsupported, opening byte channel"
                );
                self.provider.new_byte_channel(&path, options, attrs).await
            }
            other => other,
        }
    }

    async fn new_directory_stream(
        &self,
        dir: &VfsPath,
        filter: EntryFilter,
    ) -> Result<DirectoryStream> {
        let dir = self.resolve("new_directory_stream", dir);
        self.provider.new_directory_stream(&dir, filter).await
    }

    async fn create_link(&self, link: &VfsPath, existing: &VfsPath) -> Result<()> {
        let link = self.resolve("create_link", link);
        let existing = self.resolver.resolve(existing);
        self.provider.create_link(&link, &existing).await
    }

    async fn create_symbolic_link(
        &self,
        link: &VfsPath,
        target: &VfsPath,
        attrs: &[FileAttribute],
    ) -> Result<()> {
        let link = self.resolve("create_symbolic_link", link);
        let target = self.resolver.resolve(target);
        self.provider.create_symbolic_link(&link, &target, attrs).await
    }

    async fn read_symbolic_link(&self, link: &VfsPath) -> Result<VfsPath> {
        let link = self.resolve("read_symbolic_link", link);
        self.provider.read_symbolic_link(&link).await
    }

    async fn read_attributes(
        &self,
        path: &VfsPath,
        attributes: &str,
        options: &[LinkOption],
    ) -> Result<AttributeMap> {
        let path = self.resolve("read_attributes", path);
        self.provider.read_attributes(&path, attributes, options).await
    }

    async fn set_attribute(
        &self,
        path: &VfsPath,
        attribute: &str,
        value: AttributeValue,
        options: &[LinkOption],
    ) -> Result<()> {
        let path = self.resolve("set_attribute", path);
        self.provider
            .set_attribute(&path, attribute, value, options)
            .await
    }

    fn to_absolute_path(&self, path: &VfsPath) -> VfsPath {
        self.resolver.to_absolute(path)
    }

    fn set_current_working_directory(&self, path: VfsPath) {
        self.resolver.set_working_directory(path);
    }

    async fn to_real_path(&self, path: &VfsPath, options: &[LinkOption]) -> Result<VfsPath> {
        let path = self.resolve("to_real_path", path);
        self.provider.to_real_path(&path, options).await
    }
}
