//! Virtual path model.
//!
//! [`VfsPath`] is the structured path value that flows between the host, the
//! facade and the engine: an optional root plus a list of names. It is
//! deliberately independent of [`std::path::Path`] so that a Windows-flavored
//! filesystem behaves the same on every host OS.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Characters escaped in the path portion of a filesystem URI.
const URI_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Characters that may not appear in a Windows file name.
const WINDOWS_RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Path syntax of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSyntax {
    /// `/`-separated paths with a single `/` root.
    Unix,
    /// `\`-separated paths with drive (`C:\`) or UNC (`\\host\share\`) roots.
    /// `/` is accepted as a separator when parsing.
    Windows,
}

impl PathSyntax {
    /// Canonical name separator.
    pub fn separator(self) -> char {
        match self {
            PathSyntax::Unix => '/',
            PathSyntax::Windows => '\\',
        }
    }

    fn parse(self, input: &str) -> Result<(Option<String>, Vec<String>)> {
        if input.contains('\0') {
            return Err(Error::InvalidPath(format!("{input:?}: nul character")));
        }
        match self {
            PathSyntax::Unix => {
                let root = input.starts_with('/').then(|| "/".to_string());
                let names = input
                    .split('/')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok((root, names))
            }
            PathSyntax::Windows => parse_windows(input),
        }
    }
}

fn parse_windows(input: &str) -> Result<(Option<String>, Vec<String>)> {
    let normalized = input.replace('/', "\\");
    let invalid = |reason: &str| Error::InvalidPath(format!("{input}: {reason}"));

    let (root, rest) = if let Some(unc) = normalized.strip_prefix("\\\\") {
        let mut parts = unc.splitn(3, '\\');
        let host = parts.next().unwrap_or_default();
        let share = parts.next().unwrap_or_default();
        if host.is_empty() || share.is_empty() {
            return Err(invalid("UNC path is missing a host or share name"));
        }
        (
            Some(format!("\\\\{host}\\{share}\\")),
            parts.next().unwrap_or_default().to_string(),
        )
    } else if normalized.starts_with('\\') {
        return Err(invalid("paths rooted at the current drive are not supported"));
    } else {
        let bytes = normalized.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            if bytes.get(2) != Some(&b'\\') {
                return Err(invalid("drive-relative paths are not supported"));
            }
            let drive = (bytes[0] as char).to_ascii_uppercase();
            (Some(format!("{drive}:\\")), normalized[3..].to_string())
        } else {
            (None, normalized)
        }
    };

    let mut names = Vec::new();
    for name in rest.split('\\').filter(|name| !name.is_empty()) {
        if let Some(c) = name
            .chars()
            .find(|c| WINDOWS_RESERVED.contains(c) || c.is_control())
        {
            return Err(invalid(&format!("illegal character {c:?} in name")));
        }
        names.push(name.to_string());
    }
    Ok((root, names))
}

/// A path in a virtual filesystem.
///
/// Absolute iff it has a root. Names are kept exactly as given: `.` and `..`
/// survive parsing and joining and are interpreted by the engine during
/// lookup.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VfsPath {
    syntax: PathSyntax,
    root: Option<String>,
    names: Vec<String>,
}

impl VfsPath {
    /// Parse a path string using `syntax`.
    pub fn parse(syntax: PathSyntax, input: &str) -> Result<Self> {
        let (root, names) = syntax.parse(input)?;
        Ok(Self {
            syntax,
            root,
            names,
        })
    }

    /// Build a path from already-validated parts.
    pub(crate) fn from_parts(syntax: PathSyntax, root: Option<String>, names: Vec<String>) -> Self {
        Self {
            syntax,
            root,
            names,
        }
    }

    /// Parse the path component of a filesystem URI (`/a/b`, `/C:/a/b`).
    pub(crate) fn from_uri_path(syntax: PathSyntax, encoded: &str) -> Result<Self> {
        let decoded = percent_decode_str(encoded)
            .decode_utf8()
            .map_err(|e| Error::InvalidPath(format!("{encoded}: {e}")))?;
        if !decoded.starts_with('/') {
            return Err(Error::InvalidPath(format!("{decoded}: URI path must be absolute")));
        }
        match syntax {
            PathSyntax::Unix => Self::parse(syntax, &decoded),
            PathSyntax::Windows => {
                let local = if decoded.starts_with("//") {
                    &decoded[..]
                } else {
                    &decoded[1..]
                };
                let path = Self::parse(syntax, local)?;
                if !path.is_absolute() {
                    return Err(Error::InvalidPath(format!("{decoded}: URI path has no root")));
                }
                Ok(path)
            }
        }
    }

    /// Percent-encoded path component for a filesystem URI.
    pub(crate) fn to_uri_path(&self) -> String {
        let mut out = match (self.syntax, &self.root) {
            (PathSyntax::Windows, Some(root)) if root.starts_with("\\\\") => {
                root.replace('\\', "/")
            }
            (PathSyntax::Windows, Some(root)) => format!("/{}", root.replace('\\', "/")),
            _ => String::from("/"),
        };
        out.push_str(&self.names.join("/"));
        utf8_percent_encode(&out, URI_PATH).to_string()
    }

    pub fn syntax(&self) -> PathSyntax {
        self.syntax
    }

    /// True if the path has a root component.
    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    /// True for the empty relative path.
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.names.is_empty()
    }

    /// Root component (`/`, `C:\`, `\\host\share\`).
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// The root as a path of its own.
    pub fn root_path(&self) -> Option<VfsPath> {
        self.root
            .as_ref()
            .map(|root| Self::from_parts(self.syntax, Some(root.clone()), Vec::new()))
    }

    /// Name components, root excluded.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Last name component.
    pub fn file_name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    /// The path without its last name, or `None` for roots and single names.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.names.is_empty() || (self.root.is_none() && self.names.len() == 1) {
            return None;
        }
        let names = self.names[..self.names.len() - 1].to_vec();
        Some(Self::from_parts(self.syntax, self.root.clone(), names))
    }

    /// Resolve `other` against this path.
    ///
    /// An absolute `other` is returned as is, an empty `other` yields `self`,
    /// otherwise the names of `other` are appended in order. No `.`/`..`
    /// normalization takes place.
    pub fn join(&self, other: &VfsPath) -> VfsPath {
        if other.is_absolute() {
            return other.clone();
        }
        let mut names = self.names.clone();
        names.extend(other.names.iter().cloned());
        Self::from_parts(self.syntax, self.root.clone(), names)
    }

    /// Append a single name.
    pub(crate) fn join_name(&self, name: &str) -> VfsPath {
        let mut names = self.names.clone();
        names.push(name.to_string());
        Self::from_parts(self.syntax, self.root.clone(), names)
    }

    /// True if `prefix`'s root and names lead this path.
    pub fn starts_with(&self, prefix: &VfsPath) -> bool {
        self.root == prefix.root && self.names.starts_with(&prefix.names)
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(root) = &self.root {
            f.write_str(root)?;
        }
        let sep = self.syntax.separator().to_string();
        f.write_str(&self.names.join(&sep))
    }
}

impl fmt::Debug for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VfsPath({:?})", self.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn unix(s: &str) -> VfsPath {
        VfsPath::parse(PathSyntax::Unix, s).unwrap()
    }

    fn windows(s: &str) -> VfsPath {
        VfsPath::parse(PathSyntax::Windows, s).unwrap()
    }

    #[test]
    fn test_unix_parse_and_display() {
        let p = unix("/a//b/c/");
        assert!(p.is_absolute());
        assert_eq!(p.names(), ["a", "b", "c"]);
        assert_eq!(p.to_string(), "/a/b/c");

        let rel = unix("x/./y/..");
        assert!(!rel.is_absolute());
        assert_eq!(rel.to_string(), "x/./y/..");
    }

    #[test]
    fn test_empty_path() {
        let p = unix("");
        assert!(p.is_empty());
        assert_eq!(p.to_string(), "");
        assert_eq!(unix("/a").join(&p), unix("/a"));
    }

    #[test]
    fn test_nul_rejected() {
        assert!(VfsPath::parse(PathSyntax::Unix, "a\0b").is_err());
    }

    #[test]
    fn test_join_appends_in_order() {
        assert_eq!(unix("/a").join(&unix("b/c")).to_string(), "/a/b/c");
        assert_eq!(unix("/a").join(&unix("../b")).to_string(), "/a/../b");
        assert_eq!(unix("/a").join(&unix("/z")), unix("/z"));
    }

    #[test]
    fn test_parent_and_file_name() {
        let p = unix("/a/b");
        assert_eq!(p.file_name(), Some("b"));
        assert_eq!(p.parent(), Some(unix("/a")));
        assert_eq!(unix("/a").parent(), Some(unix("/")));
        assert_eq!(unix("/").parent(), None);
        assert_eq!(unix("a").parent(), None);
    }

    #[test]
    fn test_windows_drive_paths() {
        let p = windows("c:/work\\dir");
        assert_eq!(p.root(), Some("C:\\"));
        assert_eq!(p.to_string(), "C:\\work\\dir");
        assert_eq!(windows("foo\\bar").to_string(), "foo\\bar");
    }

    #[test]
    fn test_windows_unc_root() {
        let p = windows("\\\\server\\share\\docs");
        assert_eq!(p.root(), Some("\\\\server\\share\\"));
        assert_eq!(p.names(), ["docs"]);
    }

    #[test]
    fn test_windows_rejections() {
        for bad in ["\\foo", "C:foo", "C:\\a|b", "\\\\host"] {
            assert!(
                VfsPath::parse(PathSyntax::Windows, bad).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_uri_path_round_trip() {
        let p = unix("/dir with space/file#1");
        let encoded = p.to_uri_path();
        assert_eq!(encoded, "/dir%20with%20space/file%231");
        assert_eq!(VfsPath::from_uri_path(PathSyntax::Unix, &encoded).unwrap(), p);

        let w = windows("C:\\work\\a");
        assert_eq!(w.to_uri_path(), "/C:/work/a");
        assert_eq!(
            VfsPath::from_uri_path(PathSyntax::Windows, "/C:/work/a").unwrap(),
            w
        );
    }

    #[test]
    fn test_starts_with() {
        assert!(unix("/a/b/c").starts_with(&unix("/a/b")));
        assert!(!unix("/a/bc").starts_with(&unix("/a/b")));
        assert!(!unix("a/b").starts_with(&unix("/a")));
    }
}
