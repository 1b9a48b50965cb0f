//! Read-only lookups: live file identity, directory listings, and decoding
//! of stored snapshot artifacts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::{DirectoryBackend, EntryInfo, FileBackend};
use crate::codec;
use crate::error::{ProvisionError, ProvisionResult};
use crate::identity::{content_digest, path_digest, sha256_hex};
use crate::secret::{resolve_key, KeySource, SecretSource, UNPROTECTED_HMAC_SECRET};

/// Live view of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// File name.
    pub name: String,
    /// Directory holding the file.
    pub directory: String,
    /// Contents as UTF-8 text.
    pub contents: String,
    /// Alternate-form octal mode.
    pub permissions: String,
    /// HMAC-SHA256 of `contents`.
    #[serde(rename = "id")]
    pub identifier: String,
    /// Which tier supplied the key.
    #[serde(skip)]
    pub key_source: Option<KeySource>,
}

/// Reads a file and identifies it with the explicit key, else the
/// environment key, else the fallback constant.
pub fn read_file_data<B, S>(
    backend: &B,
    secrets: &S,
    directory: &str,
    name: &str,
    explicit_key: &str,
) -> ProvisionResult<FileData>
where
    B: FileBackend + ?Sized,
    S: SecretSource + ?Sized,
{
    let reality = backend.read(directory, name)?;
    let contents = String::from_utf8(reality.data).map_err(|_| ProvisionError::InvalidContent {
        path: Path::new(directory).join(name),
    })?;
    let key = resolve_key(explicit_key, &secrets, Some(UNPROTECTED_HMAC_SECRET));
    Ok(FileData {
        name: name.to_string(),
        directory: directory.to_string(),
        identifier: content_digest(contents.as_bytes(), key.value())?,
        contents,
        permissions: reality.permissions,
        key_source: Some(key.source()),
    })
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name.
    pub name: String,
    /// Entry metadata.
    #[serde(flatten)]
    pub info: EntryInfo,
}

/// Live view of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryData {
    /// Path as given.
    pub path: String,
    /// SHA-256 of `path`.
    #[serde(rename = "id")]
    pub identifier: String,
    /// Alternate-form octal mode.
    pub permissions: String,
    /// Entries sorted by name.
    pub entries: Vec<DirectoryEntry>,
}

/// Lists a directory.
pub fn read_directory_data<B>(backend: &B, path: &str) -> ProvisionResult<DirectoryData>
where
    B: DirectoryBackend + ?Sized,
{
    let reality = backend.read(path)?;
    let entries = reality
        .entries
        .into_iter()
        .map(|(name, info)| DirectoryEntry { name, info })
        .collect();
    Ok(DirectoryData {
        path: path.to_string(),
        identifier: path_digest(path),
        permissions: reality.permissions,
        entries,
    })
}

/// Decoded form of a snapshot artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSnapshot {
    /// SHA-256 of the artifact text.
    #[serde(rename = "id")]
    pub identifier: String,
    /// Original contents.
    pub data: String,
}

/// Base64-decodes `artifact`, gunzipping afterwards when `decompress` is set.
pub fn decode_snapshot(artifact: &str, decompress: bool) -> ProvisionResult<DecodedSnapshot> {
    let mut bytes = codec::decode(artifact)?;
    if decompress {
        bytes = codec::decompress(&bytes)?;
    }
    let data = String::from_utf8(bytes)
        .map_err(|e| ProvisionError::Codec(format!("decoded snapshot is not UTF-8: {}", e)))?;
    Ok(DecodedSnapshot {
        identifier: sha256_hex(artifact.as_bytes()),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use crate::secret::StaticSecret;

    const BASIC: &str = "this is a basic test";
    const BASIC_ID: &str = "3de642fb91d2fb0ce02fe66c3d19ebdf44cbc6a2ebcc2dad22f1950b67c1217f";

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_directory("d", "0750")
            .unwrap()
            .with_file("d/basic.txt", BASIC.as_bytes(), "0644")
            .unwrap()
    }

    #[test]
    fn file_identity_uses_fallback_without_keys() {
        let data = read_file_data(&backend(), &StaticSecret::none(), "d", "basic.txt", "").unwrap();
        assert_eq!(data.identifier, BASIC_ID);
        assert_eq!(data.permissions, "0644");
        assert_eq!(data.contents, BASIC);
        assert_eq!(data.key_source, Some(KeySource::Fallback));
    }

    #[test]
    fn file_identity_key_precedence() {
        let backend = backend();
        let env = StaticSecret::key("env-key");

        let data = read_file_data(&backend, &env, "d", "basic.txt", "").unwrap();
        assert_eq!(data.identifier, content_digest(BASIC.as_bytes(), "env-key").unwrap());

        let data = read_file_data(&backend, &env, "d", "basic.txt", "explicit").unwrap();
        assert_eq!(data.identifier, content_digest(BASIC.as_bytes(), "explicit").unwrap());
        assert_eq!(data.key_source, Some(KeySource::Explicit));
    }

    #[test]
    fn binary_file_is_invalid_content() {
        let backend = backend().with_file("d/blob", &[0xff, 0xfe], "0644").unwrap();
        let err = read_file_data(&backend, &StaticSecret::none(), "d", "blob", "").unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidContent { path } if path == Path::new("d/blob")));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_file_data(&backend(), &StaticSecret::none(), "d", "nope", "").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn directory_listing_is_sorted() {
        let backend = backend();
        backend.create_file("d/a.txt", b"1", "0600").unwrap();
        let data = read_directory_data(&backend, "d").unwrap();
        assert_eq!(data.identifier, path_digest("d"));
        assert_eq!(data.permissions, "0750");
        let names: Vec<_> = data.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "basic.txt"]);
    }

    #[test]
    fn decode_plain_artifact() {
        let artifact = "dGhlc2UgY29udGVudHMgYXJlIHRoZSBkZWZhdWx0IGZvciB0ZXN0aW5n";
        let decoded = decode_snapshot(artifact, false).unwrap();
        assert_eq!(decoded.data, "these contents are the default for testing");
        assert_eq!(
            decoded.identifier,
            "ba8cd27d74eb572956e09da49530c5ab2dd66ee946956e9d55a4cd09b76ab527"
        );
    }

    #[test]
    fn decode_compressed_artifact() {
        let artifact = codec::encode(&codec::compress(b"zipped").unwrap());
        assert_eq!(decode_snapshot(&artifact, true).unwrap().data, "zipped");
        assert!(matches!(
            decode_snapshot(&artifact, false),
            Err(ProvisionError::Codec(_))
        ));
    }
}
