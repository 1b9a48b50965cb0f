//! Content identity: keyed HMAC-SHA256 digests for files, plain SHA-256 for
//! paths and snapshot artifacts.

use std::io::Read;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{ProtectionError, ProvisionResult};

type HmacSha256 = Hmac<Sha256>;

const READ_BUF_SIZE: usize = 8192;

fn keyed(key: &str) -> Result<HmacSha256, ProtectionError> {
    HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| ProtectionError::InvalidKey {
        reason: e.to_string(),
    })
}

/// HMAC-SHA256 of `content` keyed by `key`, as lowercase hex.
pub fn content_digest(content: &[u8], key: &str) -> Result<String, ProtectionError> {
    let mut mac = keyed(key)?;
    mac.update(content);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Streaming form of [`content_digest`].
pub fn content_digest_reader<R: Read>(mut reader: R, key: &str) -> ProvisionResult<String> {
    let mut mac = keyed(key)?;
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        mac.update(&buf[..n]);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `supplied` against the HMAC of `content` in constant time.
///
/// Only the canonical lowercase hex rendering matches.
pub fn digest_matches(content: &[u8], key: &str, supplied: &str) -> Result<bool, ProtectionError> {
    if supplied.bytes().any(|b| b.is_ascii_uppercase()) {
        return Ok(false);
    }
    let Ok(tag) = hex::decode(supplied) else {
        return Ok(false);
    };
    let mut mac = keyed(key)?;
    mac.update(content);
    Ok(mac.verify_slice(&tag).is_ok())
}

/// Plain SHA-256 of `data`, as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Streaming SHA-256 of everything `reader` yields.
pub fn sha256_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Identifier of a directory resource: SHA-256 of its declared path string.
pub fn path_digest(path: &str) -> String {
    sha256_hex(path.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::UNPROTECTED_HMAC_SECRET;

    #[test]
    fn unprotected_basic_content_identifier() {
        assert_eq!(
            content_digest(b"this is a basic test", UNPROTECTED_HMAC_SECRET).unwrap(),
            "3de642fb91d2fb0ce02fe66c3d19ebdf44cbc6a2ebcc2dad22f1950b67c1217f"
        );
    }

    #[test]
    fn directory_identifier_is_sha256_of_path() {
        assert_eq!(
            path_digest("path/to/new/directory"),
            "2d020a0327fe0a114bf587a2b24894d67654203b0bd4428546ad5bf4ed7ed6a7"
        );
    }

    #[test]
    fn snapshot_identifier_is_sha256_of_artifact() {
        assert_eq!(
            sha256_hex(b"dGhlc2UgY29udGVudHMgYXJlIHRoZSBkZWZhdWx0IGZvciB0ZXN0aW5n"),
            "ba8cd27d74eb572956e09da49530c5ab2dd66ee946956e9d55a4cd09b76ab527"
        );
    }

    #[test]
    fn reader_matches_slice() {
        let data = vec![7u8; READ_BUF_SIZE * 3 + 11];
        let a = content_digest(&data, "k").unwrap();
        let b = content_digest_reader(&data[..], "k").unwrap();
        assert_eq!(a, b);
        assert_eq!(sha256_hex(&data), sha256_reader(&data[..]).unwrap());
    }

    #[test]
    fn key_changes_digest() {
        assert_ne!(content_digest(b"abc", "one").unwrap(), content_digest(b"abc", "two").unwrap());
    }

    #[test]
    fn empty_key_is_a_valid_key() {
        let id = content_digest(b"abc", "").unwrap();
        assert_eq!(id.len(), 64);
        assert!(digest_matches(b"abc", "", &id).unwrap());
    }

    #[test]
    fn keys_longer_than_a_block_are_accepted() {
        let key = "k".repeat(500);
        let id = content_digest(b"abc", &key).unwrap();
        assert!(digest_matches(b"abc", &key, &id).unwrap());
    }

    #[test]
    fn digest_matches_rejects_bad_hex_and_wrong_values() {
        let id = content_digest(b"abc", "k").unwrap();
        assert!(digest_matches(b"abc", "k", &id).unwrap());
        assert!(!digest_matches(b"abd", "k", &id).unwrap());
        assert!(!digest_matches(b"abc", "k", "not-hex").unwrap());
        assert!(!digest_matches(b"abc", "k", "").unwrap());
    }
}
