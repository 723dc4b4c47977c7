//! sandfs - In-memory filesystem for sandboxed workloads
//!
//! A host that runs untrusted code hands it a [`SandboxFs`] instead of the
//! real OS filesystem. The facade tracks a working directory of its own,
//! rewrites every relative path against it and dispatches to an in-memory
//! engine ([`MemoryFs`], or any [`FileSystemProvider`]).
//!
//! # Example
//!
//! ```rust
//! use sandfs::{Configuration, HostFileSystem, OpenOption};
//! use std::io::{Read, Write};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let fs = sandfs::create(Configuration::unix())?;
//!     fs.set_current_working_directory(fs.parse_path("/work")?);
//!
//!     let path = fs.parse_path("notes.txt")?;
//!     let mut out = fs
//!         .new_byte_channel(&path, &[OpenOption::Write, OpenOption::Create], &[])
//!         .await?;
//!     out.write_all(b"hello")?;
//!     drop(out);
//!
//!     let mut text = String::new();
//!     fs.new_byte_channel(&path, &[], &[]).await?.read_to_string(&mut text)?;
//!     assert_eq!(text, "hello");
//!     assert_eq!(fs.to_absolute_path(&path).to_string(), "/work/notes.txt");
//!     Ok(())
//! }
//! ```
//!
//! # Flavors
//!
//! [`Configuration::unix`], [`Configuration::macos`] and
//! [`Configuration::windows`] select path syntax and name case sensitivity.

mod config;
mod error;
mod facade;
mod fs;
mod host;
mod logging_impl;
mod path;

pub use config::{Configuration, DEFAULT_MAX_FILE_SIZE, DEFAULT_NAME, OsFlavor};
pub use error::{Error, Result, fs_errors};
pub use facade::SandboxFs;
pub use fs::{
    AccessMode, AttributeMap, AttributeValue, AttributeView, CopyOption, DirectoryStream,
    EntryFilter, FileAttribute, FileSystemProvider, LinkOption, MemoryChannel, MemoryFs,
    OpenOption, Permissions, SeekableChannel, URI_SCHEME, accept_all, follows_links,
};
pub use host::HostFileSystem;
pub use logging_impl::LogConfig;
pub use path::{PathSyntax, VfsPath};

/// Re-exported so custom engines can implement [`FileSystemProvider`].
pub use async_trait::async_trait;

/// Create a facade over a fresh in-memory engine built from `config`.
pub fn create(config: Configuration) -> Result<SandboxFs> {
    SandboxFs::create(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_rejects_bad_config() {
        let err = create(Configuration::unix().working_directory("relative"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_facade_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SandboxFs>();
        assert_send_sync::<MemoryFs>();
    }
}
