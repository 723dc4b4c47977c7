//! In-memory filesystem engine
//!
//! Provides the engine capability trait and its implementation:
//! - `FileSystemProvider`: primitives the facade dispatches to
//! - `MemoryFs`: node-table filesystem with Unix, macOS and Windows flavors

mod attributes;
mod channel;
mod memory;
mod stream;
mod traits;

pub use attributes::{AttributeMap, AttributeValue, AttributeView, FileAttribute, Permissions};
pub use channel::{MemoryChannel, SeekableChannel};
pub use memory::{MemoryFs, URI_SCHEME};
pub use stream::{DirectoryStream, EntryFilter, accept_all};
pub use traits::{AccessMode, CopyOption, FileSystemProvider, LinkOption, OpenOption, follows_links};
