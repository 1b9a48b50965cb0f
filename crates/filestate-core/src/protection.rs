//! Protection invariant linking a declared identifier, a key and content.
//!
//! A protected file carries a caller-supplied identifier that must equal
//! `HMAC-SHA256(contents, key)`. The same check guards create, update and
//! delete, so a file whose recorded identity no longer matches its contents
//! is never silently rewritten or destroyed.

use crate::error::ProtectionError;
use crate::identity::{content_digest, digest_matches};
use crate::secret::HMAC_KEY_ENV;

/// Validates the protection rules in order; the first violation wins.
pub fn validate_protected(
    protected: bool,
    identifier: &str,
    key: &str,
    content: &[u8],
) -> Result<(), ProtectionError> {
    validate_protected_with(protected, identifier, key, content, HMAC_KEY_ENV)
}

/// As [`validate_protected`], naming `env_var` when the key is missing.
pub fn validate_protected_with(
    protected: bool,
    identifier: &str,
    key: &str,
    content: &[u8],
    env_var: &str,
) -> Result<(), ProtectionError> {
    if !protected && !identifier.is_empty() {
        return Err(ProtectionError::IdentifierWithoutProtection);
    }
    if protected && identifier.is_empty() {
        return Err(ProtectionError::MissingIdentifier);
    }
    if protected && key.is_empty() {
        return Err(ProtectionError::MissingKey {
            env_var: env_var.to_string(),
        });
    }
    if !protected && !key.is_empty() {
        return Err(ProtectionError::KeyWithoutProtection);
    }
    if protected && !digest_matches(content, key, identifier)? {
        return Err(ProtectionError::IdentifierMismatch {
            supplied: identifier.to_string(),
            calculated: content_digest(content, key)?,
        });
    }
    Ok(())
}
