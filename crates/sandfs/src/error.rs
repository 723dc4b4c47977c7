//! Error types for sandfs
//!
//! Engine failures (not found, already exists, not a directory, ...) travel as
//! [`std::io::Error`] inside [`Error::Io`] so hosts can match on
//! [`std::io::ErrorKind`] exactly as they would for a real filesystem. The
//! remaining variants cover conditions with no io equivalent.

use std::io::ErrorKind;

use thiserror::Error;

/// Result type alias using sandfs's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// sandfs error types.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error raised by the filesystem engine.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested operation or option combination is not supported.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A path string or URI could not be parsed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// An argument (attribute name, attribute value, option set) was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The filesystem engine has been closed.
    #[error("filesystem is closed")]
    Closed,
}

impl Error {
    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The io error kind, if this is an engine io failure.
    pub fn io_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Io(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// True if this error reports an unsupported operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Constructors for the io errors raised by filesystem engines.
///
/// Messages carry the virtual path, never a host path.
pub mod fs_errors {
    use std::fmt::Display;
    use std::io::{Error as IoError, ErrorKind};

    use super::Error;

    pub fn not_found(path: impl Display) -> Error {
        IoError::new(ErrorKind::NotFound, format!("{path}: no such file or directory")).into()
    }

    pub fn already_exists(path: impl Display) -> Error {
        IoError::new(ErrorKind::AlreadyExists, format!("{path}: file exists")).into()
    }

    pub fn not_a_directory(path: impl Display) -> Error {
        IoError::new(ErrorKind::NotADirectory, format!("{path}: not a directory")).into()
    }

    pub fn is_a_directory(path: impl Display) -> Error {
        IoError::new(ErrorKind::IsADirectory, format!("{path}: is a directory")).into()
    }

    pub fn directory_not_empty(path: impl Display) -> Error {
        IoError::new(
            ErrorKind::DirectoryNotEmpty,
            format!("{path}: directory not empty"),
        )
        .into()
    }

    pub fn not_a_link(path: impl Display) -> Error {
        IoError::new(ErrorKind::InvalidInput, format!("{path}: not a symbolic link")).into()
    }

    pub fn not_a_regular_file(path: impl Display) -> Error {
        IoError::new(ErrorKind::NotFound, format!("{path}: not a regular file")).into()
    }

    pub fn too_many_links(path: impl Display) -> Error {
        IoError::other(format!("{path}: too many levels of symbolic links")).into()
    }

    pub fn invalid_input(path: impl Display, reason: &str) -> Error {
        IoError::new(ErrorKind::InvalidInput, format!("{path}: {reason}")).into()
    }
}
