//! Storage backend contracts consumed by the engines.
//!
//! Engines depend only on these traits; `OsBackend` talks to the real
//! filesystem and `MemoryBackend` keeps a tree in memory for deterministic
//! tests.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ProvisionResult;

/// Live state of a file as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReality {
    /// Alternate-form octal mode, e.g. `0600`.
    pub permissions: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

/// File CRUD plus the snapshot codec steps.
///
/// `read` must fail with [`crate::ProvisionError::NotFound`] when the file
/// does not exist.
pub trait FileBackend {
    /// Writes a new file with the given mode.
    fn create(&self, directory: &str, name: &str, data: &[u8], permissions: &str)
        -> ProvisionResult<()>;

    /// Reads mode and contents.
    fn read(&self, directory: &str, name: &str) -> ProvisionResult<FileReality>;

    /// Moves the file if its location changed, then rewrites contents and mode.
    fn update(
        &self,
        old_directory: &str,
        old_name: &str,
        new_directory: &str,
        new_name: &str,
        data: &[u8],
        permissions: &str,
    ) -> ProvisionResult<()>;

    /// Removes the file.
    fn delete(&self, directory: &str, name: &str) -> ProvisionResult<()>;

    /// Gzips `directory/name` into `directory/out_name`.
    fn compress(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()>;

    /// Base64-encodes `directory/name` into `directory/out_name`.
    fn encode(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()>;

    /// SHA-256 of the file contents, as lowercase hex.
    fn hash(&self, directory: &str, name: &str) -> ProvisionResult<String>;
}

impl<T: FileBackend + ?Sized> FileBackend for &T {
    fn create(&self, directory: &str, name: &str, data: &[u8], permissions: &str)
        -> ProvisionResult<()> {
        (**self).create(directory, name, data, permissions)
    }

    fn read(&self, directory: &str, name: &str) -> ProvisionResult<FileReality> {
        (**self).read(directory, name)
    }

    fn update(
        &self,
        old_directory: &str,
        old_name: &str,
        new_directory: &str,
        new_name: &str,
        data: &[u8],
        permissions: &str,
    ) -> ProvisionResult<()> {
        (**self).update(old_directory, old_name, new_directory, new_name, data, permissions)
    }

    fn delete(&self, directory: &str, name: &str) -> ProvisionResult<()> {
        (**self).delete(directory, name)
    }

    fn compress(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()> {
        (**self).compress(directory, name, out_name)
    }

    fn encode(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()> {
        (**self).encode(directory, name, out_name)
    }

    fn hash(&self, directory: &str, name: &str) -> ProvisionResult<String> {
        (**self).hash(directory, name)
    }
}

/// Metadata for one entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Size in bytes.
    pub size: u64,
    /// Alternate-form octal mode.
    pub permissions: String,
    /// Last modification time, RFC 3339 UTC.
    pub last_modified: String,
    /// Whether the entry is itself a directory.
    pub is_directory: bool,
}

/// Live state of a directory as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryReality {
    /// Alternate-form octal mode.
    pub permissions: String,
    /// Entries keyed by file name.
    pub entries: BTreeMap<String, EntryInfo>,
}

/// Directory CRUD.
///
/// `read` must fail with [`crate::ProvisionError::NotFound`] when the path
/// does not exist.
pub trait DirectoryBackend {
    /// Creates `path` and any missing parents; returns the outermost
    /// directory created, or `None` if the path already existed.
    fn create(&self, path: &str, permissions: &str) -> ProvisionResult<Option<String>>;

    /// Reads mode and the entry listing.
    fn read(&self, path: &str) -> ProvisionResult<DirectoryReality>;

    /// Changes the mode of `path`.
    fn update(&self, path: &str, permissions: &str) -> ProvisionResult<()>;

    /// Recursively removes `path`; an empty path is a no-op.
    fn delete(&self, path: &str) -> ProvisionResult<()>;

    /// Writes a plain file inside a directory. Test support only.
    fn create_file(&self, path: &str, data: &[u8], permissions: &str) -> ProvisionResult<()>;
}

impl<T: DirectoryBackend + ?Sized> DirectoryBackend for &T {
    fn create(&self, path: &str, permissions: &str) -> ProvisionResult<Option<String>> {
        (**self).create(path, permissions)
    }

    fn read(&self, path: &str) -> ProvisionResult<DirectoryReality> {
        (**self).read(path)
    }

    fn update(&self, path: &str, permissions: &str) -> ProvisionResult<()> {
        (**self).update(path, permissions)
    }

    fn delete(&self, path: &str) -> ProvisionResult<()> {
        (**self).delete(path)
    }

    fn create_file(&self, path: &str, data: &[u8], permissions: &str) -> ProvisionResult<()> {
        (**self).create_file(path, data, permissions)
    }
}

/// What currently occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// Anything that is not a directory.
    File,
}

/// Primitive operations the directory enumerator walks with.
pub trait PathSegments {
    /// What exists at `path`, or `None` if nothing does.
    fn probe(&self, path: &Path) -> ProvisionResult<Option<EntryKind>>;

    /// Creates exactly one directory; the parent already exists.
    fn make_segment(&self, path: &Path, mode: u32) -> ProvisionResult<()>;

    /// Removes one empty directory made by [`make_segment`](Self::make_segment).
    fn remove_segment(&self, path: &Path) -> ProvisionResult<()>;
}
