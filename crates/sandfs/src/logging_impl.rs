//! Logging infrastructure for sandfs
//!
//! Paths handed to the facade come from sandboxed workloads, so they are
//! formatted through [`LogConfig`] before they reach a log field.
//!
//! # Log Levels
//!
//! - **WARN**: Rejected access checks, channel fallbacks, failed cleanups
//! - **DEBUG**: Dispatched operations, working directory changes, engine lifecycle
//! - **TRACE**: Path resolution
//!
//! # Security
//!
//! Path names matching common secret patterns are redacted, control
//! characters are escaped and long paths are truncated.

use std::borrow::Cow;
use std::collections::HashSet;

use crate::path::VfsPath;

const REDACTED: &str = "[REDACTED]";

/// Configuration for logging behavior
///
/// By default, path names that look sensitive are redacted from logs.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact sensitive path names (default: true)
    pub redact_sensitive: bool,

    /// Substrings marking a path name as sensitive (case-insensitive)
    pub redact_names: HashSet<String>,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        let redact_names = [
            "password",
            "passwd",
            "secret",
            "token",
            "credential",
            "private",
            ".ssh",
            ".gnupg",
            ".aws",
            ".env",
            "id_rsa",
            "id_ed25519",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        Self {
            redact_sensitive: true,
            redact_names,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable sensitive data redaction (UNSAFE - use only for debugging)
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Add a custom name pattern to redact
    pub fn redact_name(mut self, pattern: &str) -> Self {
        self.redact_names.insert(pattern.to_lowercase());
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Check if a single path name should be redacted
    pub fn should_redact_name(&self, name: &str) -> bool {
        if !self.redact_sensitive {
            return false;
        }
        let lower = name.to_lowercase();
        self.redact_names.iter().any(|p| lower.contains(p.as_str())) || is_likely_secret(name)
    }

    /// Format a path for a log field.
    pub fn format_path(&self, path: &VfsPath) -> String {
        let display = if self.redact_sensitive
            && path.names().iter().any(|n| self.should_redact_name(n))
        {
            let names: Vec<&str> = path
                .names()
                .iter()
                .map(|n| {
                    if self.should_redact_name(n) {
                        REDACTED
                    } else {
                        n.as_str()
                    }
                })
                .collect();
            format!(
                "{}{}",
                path.root().unwrap_or_default(),
                names.join(&path.syntax().separator().to_string())
            )
        } else {
            path.to_string()
        };
        self.truncate(&sanitize_for_log(&display)).into_owned()
    }

    /// Truncate value if it exceeds max length
    ///
    /// Handles UTF-8 char boundaries properly to avoid panics on multi-byte chars.
    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Check if a name looks like an embedded secret (API key prefixes)
fn is_likely_secret(name: &str) -> bool {
    let prefixes = [
        "sk-", "sk_live_", "sk_test_", "ghp_", "gho_", "ghs_", "xoxb-", "xoxp-", "AKIA", "eyJ",
    ];
    prefixes
        .iter()
        .any(|p| name.starts_with(p) && name.len() > p.len() + 10)
}

/// Escape characters that could be used for log injection.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
