//! Resource records: what a managed file, directory or snapshot looks like in
//! desired state and in persisted state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};

/// Default directory for files and snapshots.
pub const DEFAULT_DIRECTORY: &str = ".";
/// Default mode for managed files.
pub const DEFAULT_FILE_PERMISSIONS: &str = "0600";
/// Default mode for managed directories.
pub const DEFAULT_DIRECTORY_PERMISSIONS: &str = "0700";

/// Parses an octal permissions string such as `"0600"` or `"755"`.
pub fn parse_mode(permissions: &str) -> ProvisionResult<u32> {
    let digits = permissions.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    if digits.is_empty() {
        return Err(ProvisionError::InvalidPermissions {
            value: permissions.to_string(),
        });
    }
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| ProvisionError::InvalidPermissions {
            value: permissions.to_string(),
        })
}

/// Renders permission bits as alternate-form octal (`0644`, or `0` for none).
pub fn format_mode(mode: u32) -> String {
    let mode = mode & 0o777;
    if mode == 0 {
        "0".to_string()
    } else {
        format!("0{:o}", mode)
    }
}

/// True if both strings denote the same mode; falls back to string equality
/// when either does not parse.
pub fn same_mode(a: &str, b: &str) -> bool {
    match (parse_mode(a), parse_mode(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// One managed file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedFile {
    /// File name inside `directory`.
    pub name: String,
    /// Directory path holding the file.
    #[serde(default = "default_directory")]
    pub directory: String,
    /// File contents.
    pub contents: String,
    /// Octal mode string.
    #[serde(default = "default_file_permissions")]
    pub permissions: String,
    /// HMAC-SHA256 of contents; caller-supplied only when protected.
    #[serde(default, rename = "id")]
    pub identifier: String,
    /// Explicit HMAC key; always empty in state for unprotected files.
    #[serde(default, rename = "hmac_secret_key")]
    pub secret_key: String,
    /// Whether `identifier` must be supplied and verified.
    #[serde(default)]
    pub protected: bool,
}

fn default_directory() -> String {
    DEFAULT_DIRECTORY.to_string()
}

fn default_file_permissions() -> String {
    DEFAULT_FILE_PERMISSIONS.to_string()
}

fn default_directory_permissions() -> String {
    DEFAULT_DIRECTORY_PERMISSIONS.to_string()
}

impl ManagedFile {
    /// An unprotected file in the current directory with mode `0600`.
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: default_directory(),
            contents: contents.into(),
            permissions: default_file_permissions(),
            identifier: String::new(),
            secret_key: String::new(),
            protected: false,
        }
    }

    /// Sets the directory.
    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Sets the mode string.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Marks the file protected with the given identifier.
    pub fn protected_by(mut self, identifier: impl Into<String>) -> Self {
        self.protected = true;
        self.identifier = identifier.into();
        self
    }

    /// Sets the explicit HMAC key.
    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = key.into();
        self
    }

    /// Full path of the file.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.name)
    }
}

// Contents and key are sensitive and stay out of logs.
impl fmt::Debug for ManagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedFile")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("contents", &format_args!("<{} bytes>", self.contents.len()))
            .field("permissions", &self.permissions)
            .field("identifier", &self.identifier)
            .field(
                "secret_key",
                &if self.secret_key.is_empty() { "" } else { "<redacted>" },
            )
            .field("protected", &self.protected)
            .finish()
    }
}

/// One managed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDirectory {
    /// Declared directory path; changing it forces replacement.
    pub path: String,
    /// Octal mode string.
    #[serde(default = "default_directory_permissions")]
    pub permissions: String,
    /// SHA-256 of `path`.
    #[serde(default, rename = "id")]
    pub identifier: String,
    /// Outermost directory created by this resource, empty if none was.
    #[serde(default, rename = "created")]
    pub top_created_segment: String,
}

impl ManagedDirectory {
    /// A directory with mode `0700`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            permissions: default_directory_permissions(),
            identifier: String::new(),
            top_created_segment: String::new(),
        }
    }

    /// Sets the mode string.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }
}

/// A trigger-gated, encoded (optionally gzipped) copy of a file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Source file name.
    pub name: String,
    /// Source file directory.
    #[serde(default = "default_directory")]
    pub directory: String,
    /// Base64 artifact, frozen until the trigger changes.
    #[serde(default, rename = "snapshot")]
    pub artifact: String,
    /// Opaque value whose change refreshes the artifact.
    #[serde(rename = "update_trigger")]
    pub trigger: String,
    /// Gzip before encoding; fixed at creation.
    #[serde(default)]
    pub compress: bool,
    /// SHA-256 of `artifact`.
    #[serde(default, rename = "id")]
    pub identifier: String,
}

impl FileSnapshot {
    /// Snapshot of `name` in the current directory, uncompressed.
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: default_directory(),
            artifact: String::new(),
            trigger: trigger.into(),
            compress: false,
            identifier: String::new(),
        }
    }

    /// Sets the source directory.
    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Enables or disables gzip.
    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

impl fmt::Debug for FileSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSnapshot")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("artifact", &format_args!("<{} bytes>", self.artifact.len()))
            .field("trigger", &self.trigger)
            .field("compress", &self.compress)
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// A trigger-gated copy of declared contents, held only in state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    /// Declared contents.
    pub contents: String,
    /// Contents captured at the last trigger change.
    #[serde(default)]
    pub snapshot: String,
    /// Opaque value whose change refreshes the snapshot.
    #[serde(rename = "update_trigger")]
    pub trigger: String,
    /// SHA-256 of the base64 encoding of `snapshot`.
    #[serde(default, rename = "id")]
    pub identifier: String,
}

impl ContentSnapshot {
    /// Declared snapshot of `contents`.
    pub fn new(contents: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            snapshot: String::new(),
            trigger: trigger.into(),
            identifier: String::new(),
        }
    }
}

impl fmt::Debug for ContentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSnapshot")
            .field("contents", &format_args!("<{} bytes>", self.contents.len()))
            .field("snapshot", &format_args!("<{} bytes>", self.snapshot.len()))
            .field("trigger", &self.trigger)
            .field("identifier", &self.identifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_accepts_common_forms() {
        assert_eq!(parse_mode("0600").unwrap(), 0o600);
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o644").unwrap(), 0o644);
        assert_eq!(parse_mode("0").unwrap(), 0);
    }

    #[test]
    fn parse_mode_rejects_garbage() {
        for bad in ["", "rw-r--r--", "0800", "77777", "0o"] {
            assert!(
                matches!(parse_mode(bad), Err(ProvisionError::InvalidPermissions { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn format_mode_is_alternate_octal() {
        assert_eq!(format_mode(0o600), "0600");
        assert_eq!(format_mode(0o755), "0755");
        assert_eq!(format_mode(0o40755), "0755");
        assert_eq!(format_mode(0), "0");
    }

    #[test]
    fn same_mode_ignores_leading_zero() {
        assert!(same_mode("600", "0600"));
        assert!(!same_mode("0600", "0644"));
        assert!(same_mode("weird", "weird"));
        assert!(!same_mode("weird", "0600"));
    }

    #[test]
    fn file_defaults_and_path() {
        let file = ManagedFile::new("a.txt", "hi").in_directory("some/dir");
        assert_eq!(file.permissions, "0600");
        assert!(!file.protected);
        assert_eq!(file.path(), PathBuf::from("some/dir/a.txt"));
    }

    #[test]
    fn file_debug_hides_secrets() {
        let file = ManagedFile::new("a.txt", "top secret").with_secret_key("k3y");
        let dbg = format!("{:?}", file);
        assert!(!dbg.contains("top secret"));
        assert!(!dbg.contains("k3y"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn file_state_field_names() {
        let json = r#"{"name":"a","contents":"x","id":"abc","protected":true,"hmac_secret_key":"k"}"#;
        let file: ManagedFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.directory, ".");
        assert_eq!(file.permissions, "0600");
        assert_eq!(file.identifier, "abc");
        assert_eq!(file.secret_key, "k");
        assert!(file.protected);
    }

    #[test]
    fn directory_defaults() {
        let dir = ManagedDirectory::new("a/b");
        assert_eq!(dir.permissions, "0700");
        assert!(dir.top_created_segment.is_empty());
    }
}
