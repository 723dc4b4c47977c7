//! Engine configuration.
//!
//! A [`Configuration`] selects the emulated OS flavor, the filesystem roots,
//! the engine's default working directory and the attribute views the engine
//! supports. It is handed to [`crate::create`] once and never consulted by the
//! facade itself.
//!
//! # Example
//!
//! ```rust
//! use sandfs::{AttributeView, Configuration};
//!
//! let config = Configuration::unix()
//!     .name("tenant-a")
//!     .working_directory("/home/user")
//!     .attribute_view(AttributeView::Posix);
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fs::{AttributeView, Permissions};
use crate::path::{PathSyntax, VfsPath};

/// Default URI authority for engines that are not given a name.
pub const DEFAULT_NAME: &str = "sandfs";

/// Default maximum single file size: 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_000_000;

/// Emulated operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFlavor {
    /// Unix paths, case-sensitive names.
    Unix,
    /// Unix paths, case-insensitive names.
    MacOs,
    /// Windows paths, case-insensitive names.
    Windows,
}

impl OsFlavor {
    pub fn syntax(self) -> PathSyntax {
        match self {
            OsFlavor::Unix | OsFlavor::MacOs => PathSyntax::Unix,
            OsFlavor::Windows => PathSyntax::Windows,
        }
    }

    /// True if names are compared without regard to case.
    pub fn case_insensitive(self) -> bool {
        !matches!(self, OsFlavor::Unix)
    }
}

/// In-memory engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Authority used in `sandfs://<name>/...` URIs.
    pub name: String,
    pub flavor: OsFlavor,
    /// Root directories, e.g. `["/"]` or `["C:\\", "D:\\"]`.
    pub roots: Vec<String>,
    /// Engine default working directory. Created at startup.
    pub working_directory: String,
    /// Enabled attribute views. `basic` is always added.
    pub attribute_views: BTreeSet<AttributeView>,
    pub default_permissions: Permissions,
    pub default_owner: String,
    pub default_group: String,
    /// Largest size a file may grow to through a channel.
    pub max_file_size: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::unix()
    }
}

impl Configuration {
    fn with_flavor(flavor: OsFlavor, root: &str, working_directory: &str) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            flavor,
            roots: vec![root.to_string()],
            working_directory: working_directory.to_string(),
            attribute_views: BTreeSet::from([AttributeView::Basic]),
            default_permissions: Permissions::from_mode(0o644),
            default_owner: "user".to_string(),
            default_group: "group".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Unix-like filesystem: root `/`, working directory `/work`.
    pub fn unix() -> Self {
        Self::with_flavor(OsFlavor::Unix, "/", "/work")
    }

    /// macOS-like filesystem: Unix paths with case-insensitive lookup.
    pub fn macos() -> Self {
        Self::with_flavor(OsFlavor::MacOs, "/", "/work")
    }

    /// Windows-like filesystem: root `C:\`, working directory `C:\work`.
    pub fn windows() -> Self {
        Self::with_flavor(OsFlavor::Windows, "C:\\", "C:\\work")
    }

    /// Set the URI authority.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the root directories.
    pub fn roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Set the engine default working directory.
    pub fn working_directory(mut self, path: impl Into<String>) -> Self {
        self.working_directory = path.into();
        self
    }

    /// Enable an additional attribute view.
    pub fn attribute_view(mut self, view: AttributeView) -> Self {
        self.attribute_views.insert(view);
        self
    }

    pub fn default_permissions(mut self, permissions: Permissions) -> Self {
        self.default_permissions = permissions;
        self
    }

    /// Cap the size of a single file.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn default_owner(mut self, owner: impl Into<String>) -> Self {
        self.default_owner = owner.into();
        self
    }

    pub fn default_group(mut self, group: impl Into<String>) -> Self {
        self.default_group = group.into();
        self
    }

    /// Parsed roots, in configuration order.
    pub(crate) fn root_paths(&self) -> Result<Vec<VfsPath>> {
        let syntax = self.flavor.syntax();
        self.roots
            .iter()
            .map(|root| {
                let path = VfsPath::parse(syntax, root)?;
                if !path.is_absolute() || !path.names().is_empty() {
                    return Err(Error::Config(format!("'{root}' is not a root directory")));
                }
                Ok(path)
            })
            .collect()
    }

    /// Parsed default working directory.
    pub(crate) fn working_directory_path(&self) -> Result<VfsPath> {
        let path = VfsPath::parse(self.flavor.syntax(), &self.working_directory)?;
        if !path.is_absolute() {
            return Err(Error::Config(format!(
                "working directory '{}' must be absolute",
                self.working_directory
            )));
        }
        if path.names().iter().any(|n| n == "." || n == "..") {
            return Err(Error::Config(format!(
                "working directory '{}' must be normalized",
                self.working_directory
            )));
        }
        Ok(path)
    }

    /// Attribute views with `basic` forced on.
    pub(crate) fn views(&self) -> BTreeSet<AttributeView> {
        let mut views = self.attribute_views.clone();
        views.insert(AttributeView::Basic);
        views
    }

    /// Check that roots and working directory are consistent.
    pub fn validate(&self) -> Result<()> {
        // The name becomes the URI host, so it must survive a URI round trip.
        let valid_host = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid_host {
            return Err(Error::Config(format!("invalid filesystem name '{}'", self.name)));
        }
        let roots = self.root_paths()?;
        if roots.is_empty() {
            return Err(Error::Config("at least one root is required".to_string()));
        }
        if let Some(dup) = roots
            .iter()
            .enumerate()
            .find(|(i, r)| roots[..*i].iter().any(|o| o.root() == r.root()))
        {
            return Err(Error::Config(format!("duplicate root '{}'", dup.1)));
        }
        let cwd = self.working_directory_path()?;
        if !roots.iter().any(|r| r.root() == cwd.root()) {
            return Err(Error::Config(format!(
                "working directory '{cwd}' is not under a configured root"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_presets_validate() {
        assert!(Configuration::unix().validate().is_ok());
        assert!(Configuration::macos().validate().is_ok());
        assert!(Configuration::windows().validate().is_ok());
    }

    #[test]
    fn test_working_directory_must_be_under_root() {
        let config = Configuration::windows().working_directory("D:\\work");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Configuration::windows()
            .roots(["C:\\", "D:\\"])
            .working_directory("D:\\work");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_working_directory_rejected() {
        let config = Configuration::unix().working_directory("work");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_roots_rejected() {
        assert!(Configuration::unix().roots(["/a"]).validate().is_err());
        assert!(Configuration::unix().roots(Vec::<String>::new()).validate().is_err());
        assert!(Configuration::unix().roots(["/", "/"]).validate().is_err());
    }

    #[test]
    fn test_name_must_be_a_uri_host() {
        for name in ["tenant-a", "sandfs", "team.tenant-1"] {
            assert!(Configuration::unix().name(name).validate().is_ok(), "{name}");
        }
        for name in ["", "tenant@a", "a:b", "a?b", "a#b", "a/b", "a\\b", "a b", "a%20"] {
            let err = Configuration::unix().name(name).validate().unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{name}");
        }
    }

    #[test]
    fn test_max_file_size_defaults_and_overrides() {
        assert_eq!(Configuration::unix().max_file_size, DEFAULT_MAX_FILE_SIZE);
        let config = Configuration::windows().max_file_size(1024);
        assert_eq!(config.max_file_size, 1024);
        let back: Configuration =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back.max_file_size, 1024);
    }

    #[test]
    fn test_basic_view_always_present() {
        let mut config = Configuration::unix();
        config.attribute_views.clear();
        assert!(config.views().contains(&AttributeView::Basic));
    }

    #[test]
    fn test_json_round_trip() {
        let config = Configuration::macos()
            .name("tenant")
            .attribute_view(AttributeView::Unix)
            .default_permissions("rwx------".parse().unwrap());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"flavor\":\"mac_os\""));
        assert!(json.contains("\"rwx------\""));
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Configuration =
            serde_json::from_str(r#"{"working_directory": "/home/user"}"#).unwrap();
        assert_eq!(config.flavor, OsFlavor::Unix);
        assert_eq!(config.roots, vec!["/".to_string()]);
        assert_eq!(config.working_directory, "/home/user");
    }
}
