//! Working directory tracking and relative path resolution.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, RwLock};

use crate::fs::FileSystemProvider;
use crate::logging_impl::LogConfig;
use crate::path::VfsPath;

/// Resolves paths handed to the facade into paths handed to the engine.
///
/// The working directory is a swappable reference: the lock is held only to
/// replace or clone the `Arc`, so every resolution sees exactly one value.
pub(crate) struct PathResolver {
    provider: Arc<dyn FileSystemProvider>,
    working_directory: RwLock<Option<Arc<VfsPath>>>,
    log_config: LogConfig,
}

impl PathResolver {
    pub(crate) fn new(provider: Arc<dyn FileSystemProvider>) -> Self {
        Self {
            provider,
            working_directory: RwLock::new(None),
            log_config: LogConfig::default(),
        }
    }

    pub(crate) fn log_config(&self) -> &LogConfig {
        &self.log_config
    }

    pub(crate) fn set_log_config(&mut self, config: LogConfig) {
        self.log_config = config;
    }

    pub(crate) fn working_directory(&self) -> Option<Arc<VfsPath>> {
        self.working_directory.read().unwrap().clone()
    }

    pub(crate) fn set_working_directory(&self, path: VfsPath) {
        #[cfg(feature = "logging")]
        tracing::debug!(
            path = %self.log_config.format_path(&path),
            "working directory changed"
        );
        *self.working_directory.write().unwrap() = Some(Arc::new(path));
    }

    /// Absolute form of `path`.
    ///
    /// Without a working directory the engine's own default applies.
    pub(crate) fn to_absolute(&self, path: &VfsPath) -> VfsPath {
        if path.is_absolute() {
            return path.clone();
        }
        match self.working_directory() {
            Some(cwd) => cwd.join(path),
            None => self.provider.to_absolute(path),
        }
    }

    /// Path to hand to the engine.
    ///
    /// Relative paths are rewritten only when a working directory is set;
    /// otherwise the engine resolves them itself.
    pub(crate) fn resolve(&self, path: &VfsPath) -> VfsPath {
        let Some(cwd) = self.working_directory().filter(|_| !path.is_absolute()) else {
            return path.clone();
        };
        let resolved = cwd.join(path);
        #[cfg(feature = "logging")]
        tracing::trace!(
            path = %self.log_config.format_path(path),
            resolved = %self.log_config.format_path(&resolved),
            "resolved relative path"
        );
        resolved
    }
}
