//! File attribute views.
//!
//! Attributes are addressed as `view:name` strings. `read_attributes` accepts
//! a comma-separated list of names (or `*`) after an optional view prefix;
//! the default view is `basic`. A view must be enabled in the engine
//! configuration before it can be read or written.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attribute name to value, keyed by plain names (no view prefix).
pub type AttributeMap = BTreeMap<String, AttributeValue>;

const BASIC: &[&str] = &[
    "lastModifiedTime",
    "lastAccessTime",
    "creationTime",
    "size",
    "isRegularFile",
    "isDirectory",
    "isSymbolicLink",
    "isOther",
    "fileKey",
];
const OWNER: &[&str] = &["owner"];
const POSIX: &[&str] = &["permissions", "group"];
const UNIX: &[&str] = &["ino", "mode", "nlink"];
const DOS: &[&str] = &["readonly", "hidden", "system", "archive"];

/// A named group of attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeView {
    /// Times, size, type flags and file key. Always available.
    Basic,
    /// File owner name.
    Owner,
    /// Basic + owner + permissions and group.
    Posix,
    /// Posix + inode number, raw mode and link count.
    Unix,
    /// Basic + DOS flag bits.
    Dos,
}

impl AttributeView {
    pub fn name(self) -> &'static str {
        match self {
            AttributeView::Basic => "basic",
            AttributeView::Owner => "owner",
            AttributeView::Posix => "posix",
            AttributeView::Unix => "unix",
            AttributeView::Dos => "dos",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "basic" => AttributeView::Basic,
            "owner" => AttributeView::Owner,
            "posix" => AttributeView::Posix,
            "unix" => AttributeView::Unix,
            "dos" => AttributeView::Dos,
            _ => return None,
        })
    }

    /// Every attribute name readable through this view, in output order.
    fn attribute_names(self) -> Vec<&'static str> {
        let groups: &[&[&str]] = match self {
            AttributeView::Basic => &[BASIC],
            AttributeView::Owner => &[OWNER],
            AttributeView::Posix => &[BASIC, OWNER, POSIX],
            AttributeView::Unix => &[BASIC, OWNER, POSIX, UNIX],
            AttributeView::Dos => &[BASIC, DOS],
        };
        groups.iter().flat_map(|g| g.iter().copied()).collect()
    }
}

impl fmt::Display for AttributeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// POSIX permission bits (`0o777` mask), written as `rwxr-x---`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Permissions(u32);

impl Permissions {
    pub fn from_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    pub fn mode(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars = ['r', 'w', 'x'];
        for bit in (0..9).rev() {
            let c = if self.0 & (1 << bit) != 0 {
                chars[2 - bit % 3]
            } else {
                '-'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for Permissions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 9 {
            return Err(Error::invalid_argument(format!(
                "invalid permission string {s:?}"
            )));
        }
        let mut mode = 0;
        for (i, c) in chars.iter().enumerate() {
            let expected = ['r', 'w', 'x'][i % 3];
            match *c {
                '-' => {}
                c if c == expected => mode |= 1 << (8 - i),
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "invalid permission string {s:?}"
                    )));
                }
            }
        }
        Ok(Self(mode))
    }
}

impl From<Permissions> for String {
    fn from(p: Permissions) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for Permissions {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(u64),
    Time(SystemTime),
    Text(String),
    Permissions(Permissions),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            AttributeValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<SystemTime> {
        match self {
            AttributeValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_permissions(&self) -> Option<Permissions> {
        match self {
            AttributeValue::Permissions(p) => Some(*p),
            _ => None,
        }
    }
}

/// An attribute applied when a file, directory or link is created.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttribute {
    /// `view:name`, e.g. `posix:permissions`.
    pub name: String,
    pub value: AttributeValue,
}

impl FileAttribute {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Initial POSIX permissions.
    pub fn permissions(permissions: Permissions) -> Self {
        Self::new("posix:permissions", AttributeValue::Permissions(permissions))
    }
}

/// Kind of node an attribute snapshot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeType {
    File,
    Directory,
    Symlink,
}

/// DOS flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DosFlags {
    pub readonly: bool,
    pub hidden: bool,
    pub system: bool,
    pub archive: bool,
}

/// Mutable per-node attributes.
#[derive(Debug, Clone)]
pub(crate) struct NodeAttributes {
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub permissions: Permissions,
    pub owner: String,
    pub group: String,
    pub dos: DosFlags,
}

impl NodeAttributes {
    pub fn new(permissions: Permissions, owner: &str, group: &str) -> Self {
        let now = SystemTime::now();
        Self {
            created: now,
            modified: now,
            accessed: now,
            permissions,
            owner: owner.to_string(),
            group: group.to_string(),
            dos: DosFlags::default(),
        }
    }

    /// Copy everything except the creation time, as copy-with-attributes does.
    pub fn copy_from(&mut self, other: &NodeAttributes) {
        let created = self.created;
        *self = other.clone();
        self.created = created;
    }
}

/// Everything needed to answer an attribute read for one node.
pub(crate) struct AttributeSnapshot<'a> {
    pub node_type: NodeType,
    pub size: u64,
    pub file_key: u64,
    pub links: u64,
    pub attrs: &'a NodeAttributes,
}

impl AttributeSnapshot<'_> {
    fn value(&self, name: &str) -> Option<AttributeValue> {
        use AttributeValue as V;
        Some(match name {
            "lastModifiedTime" => V::Time(self.attrs.modified),
            "lastAccessTime" => V::Time(self.attrs.accessed),
            "creationTime" => V::Time(self.attrs.created),
            "size" => V::Int(self.size),
            "isRegularFile" => V::Bool(self.node_type == NodeType::File),
            "isDirectory" => V::Bool(self.node_type == NodeType::Directory),
            "isSymbolicLink" => V::Bool(self.node_type == NodeType::Symlink),
            "isOther" => V::Bool(false),
            "fileKey" | "ino" => V::Int(self.file_key),
            "owner" => V::Text(self.attrs.owner.clone()),
            "group" => V::Text(self.attrs.group.clone()),
            "permissions" => V::Permissions(self.attrs.permissions),
            "mode" => V::Int(self.type_bits() | u64::from(self.attrs.permissions.mode())),
            "nlink" => V::Int(self.links),
            "readonly" => V::Bool(self.attrs.dos.readonly),
            "hidden" => V::Bool(self.attrs.dos.hidden),
            "system" => V::Bool(self.attrs.dos.system),
            "archive" => V::Bool(self.attrs.dos.archive),
            _ => return None,
        })
    }

    fn type_bits(&self) -> u64 {
        match self.node_type {
            NodeType::File => 0o100000,
            NodeType::Directory => 0o040000,
            NodeType::Symlink => 0o120000,
        }
    }
}

/// Parsed `view:name` reference to a single attribute.
fn split_view(spec: &str) -> (&str, &str) {
    spec.split_once(':').unwrap_or(("basic", spec))
}

fn enabled_view(name: &str, enabled: &BTreeSet<AttributeView>) -> Result<AttributeView> {
    AttributeView::from_name(name)
        .filter(|view| enabled.contains(view))
        .ok_or_else(|| Error::unsupported(format!("attribute view '{name}' is not available")))
}

/// Answer a `read_attributes` request against `snapshot`.
pub(crate) fn read(
    spec: &str,
    enabled: &BTreeSet<AttributeView>,
    snapshot: &AttributeSnapshot<'_>,
) -> Result<AttributeMap> {
    let (view_name, list) = split_view(spec);
    let view = enabled_view(view_name, enabled)?;
    let known = view.attribute_names();

    let mut out = AttributeMap::new();
    for name in list.split(',').map(str::trim) {
        if name == "*" {
            for n in &known {
                if let Some(value) = snapshot.value(n) {
                    out.insert((*n).to_string(), value);
                }
            }
            continue;
        }
        if !known.contains(&name) {
            return Err(Error::invalid_argument(format!(
                "'{name}' is not an attribute of the '{view}' view"
            )));
        }
        if let Some(value) = snapshot.value(name) {
            out.insert(name.to_string(), value);
        }
    }
    Ok(out)
}

/// Apply a `set_attribute` request (or an initial creation attribute) to `attrs`.
pub(crate) fn set(
    spec: &str,
    value: &AttributeValue,
    enabled: &BTreeSet<AttributeView>,
    attrs: &mut NodeAttributes,
    at_creation: bool,
) -> Result<()> {
    let (view_name, name) = split_view(spec);
    let view = enabled_view(view_name, enabled)?;
    if !view.attribute_names().contains(&name) {
        return Err(Error::invalid_argument(format!(
            "'{name}' is not an attribute of the '{view}' view"
        )));
    }
    let mismatch = || Error::invalid_argument(format!("invalid value for '{spec}': {value:?}"));

    match name {
        "lastModifiedTime" | "lastAccessTime" | "creationTime" if !at_creation => {
            let time = value.as_time().ok_or_else(mismatch)?;
            match name {
                "lastModifiedTime" => attrs.modified = time,
                "lastAccessTime" => attrs.accessed = time,
                _ => attrs.created = time,
            }
        }
        "owner" => attrs.owner = value.as_text().ok_or_else(mismatch)?.to_string(),
        "group" => attrs.group = value.as_text().ok_or_else(mismatch)?.to_string(),
        "permissions" => attrs.permissions = value.as_permissions().ok_or_else(mismatch)?,
        "readonly" => attrs.dos.readonly = value.as_bool().ok_or_else(mismatch)?,
        "hidden" => attrs.dos.hidden = value.as_bool().ok_or_else(mismatch)?,
        "system" => attrs.dos.system = value.as_bool().ok_or_else(mismatch)?,
        "archive" => attrs.dos.archive = value.as_bool().ok_or_else(mismatch)?,
        _ if at_creation => {
            return Err(Error::unsupported(format!(
                "'{spec}' cannot be set when creating a file"
            )));
        }
        _ => {
            return Err(Error::invalid_argument(format!("'{spec}' is read-only")));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn views(list: &[AttributeView]) -> BTreeSet<AttributeView> {
        list.iter().copied().collect()
    }

    fn attrs() -> NodeAttributes {
        NodeAttributes::new(Permissions::from_mode(0o644), "user", "group")
    }

    #[test]
    fn test_permissions_text_form() {
        let p: Permissions = "rwxr-x---".parse().unwrap();
        assert_eq!(p.mode(), 0o750);
        assert_eq!(Permissions::from_mode(0o644).to_string(), "rw-r--r--");
        assert!("rwxrwxrw".parse::<Permissions>().is_err());
        assert!("rwxrwxrwz".parse::<Permissions>().is_err());
    }

    #[test]
    fn test_read_basic_subset() {
        let a = attrs();
        let snap = AttributeSnapshot {
            node_type: NodeType::File,
            size: 5,
            file_key: 7,
            links: 1,
            attrs: &a,
        };
        let map = read("size,isRegularFile", &views(&[AttributeView::Basic]), &snap).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["size"], AttributeValue::Int(5));
        assert_eq!(map["isRegularFile"], AttributeValue::Bool(true));
    }

    #[test]
    fn test_read_disabled_view_is_unsupported() {
        let a = attrs();
        let snap = AttributeSnapshot {
            node_type: NodeType::Directory,
            size: 0,
            file_key: 1,
            links: 2,
            attrs: &a,
        };
        let err = read("posix:*", &views(&[AttributeView::Basic]), &snap).unwrap_err();
        assert!(err.is_unsupported());

        let err = read("basic:nope", &views(&[AttributeView::Basic]), &snap).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_unix_mode_includes_type_bits() {
        let a = attrs();
        let snap = AttributeSnapshot {
            node_type: NodeType::File,
            size: 0,
            file_key: 3,
            links: 2,
            attrs: &a,
        };
        let enabled = views(&[AttributeView::Basic, AttributeView::Unix]);
        let map = read("unix:mode,nlink", &enabled, &snap).unwrap();
        assert_eq!(map["mode"], AttributeValue::Int(0o100644));
        assert_eq!(map["nlink"], AttributeValue::Int(2));
    }

    #[test]
    fn test_set_rules() {
        let enabled = views(&[AttributeView::Basic, AttributeView::Posix]);
        let mut a = attrs();

        set(
            "posix:permissions",
            &AttributeValue::Permissions(Permissions::from_mode(0o600)),
            &enabled,
            &mut a,
            false,
        )
        .unwrap();
        assert_eq!(a.permissions.mode(), 0o600);

        let err = set("size", &AttributeValue::Int(1), &enabled, &mut a, false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = set(
            "lastModifiedTime",
            &AttributeValue::Time(SystemTime::now()),
            &enabled,
            &mut a,
            true,
        )
        .unwrap_err();
        assert!(err.is_unsupported());

        let err = set(
            "posix:group",
            &AttributeValue::Bool(true),
            &enabled,
            &mut a,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
