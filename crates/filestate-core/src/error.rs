//! Error types for the filestate core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// A violated protection rule.
///
/// Rule variants are listed in the order the validator checks them; the
/// first violation wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtectionError {
    /// An identifier was supplied but protection is disabled.
    #[error(
        "protected is false, but an id was provided; either set 'protected' to true or remove 'id' from the configuration"
    )]
    IdentifierWithoutProtection,

    /// Protection is enabled but nothing to check against was supplied.
    #[error("protected is true, but no id was provided; provide an 'id' when protecting a file")]
    MissingIdentifier,

    /// Protection is enabled but neither the argument nor the environment carried a key.
    #[error(
        "protected is true, but no hmac secret key is available; set 'hmac_secret_key' or the {env_var} environment variable"
    )]
    MissingKey {
        /// Environment variable that was consulted.
        env_var: String,
    },

    /// A key was supplied for an unprotected file, where it would be silently ignored.
    #[error(
        "protected is false, but an hmac_secret_key was provided; either set 'protected' to true or remove the key"
    )]
    KeyWithoutProtection,

    /// The supplied identifier does not match the digest of the contents.
    #[error(
        "id mismatch: user-supplied id {supplied} does not match id calculated from contents {calculated}; \
         check the key (`openssl dgst -sha256 -hmac \"$KEY\" \"$FILE\"`) and the contents"
    )]
    IdentifierMismatch {
        /// Identifier given in configuration or state.
        supplied: String,
        /// Identifier recomputed from contents and key.
        calculated: String,
    },

    /// The MAC rejected the key material.
    #[error("hmac secret key rejected: {reason}")]
    InvalidKey {
        /// Reason given by the MAC.
        reason: String,
    },
}

/// Error variants for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Protection invariant violated; nothing was written.
    #[error("validation failed: {0}")]
    Validation(#[from] ProtectionError),

    /// The resource no longer exists in the backend.
    #[error("not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The path exists but has the wrong type.
    #[error("conflict: '{}' exists and is not a directory", path.display())]
    Conflict {
        /// Conflicting path.
        path: PathBuf,
    },

    /// Storage layer failure.
    #[error("backend error: {0}")]
    Backend(#[from] std::io::Error),

    /// Compression or encoding failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// A permissions string is not a valid octal mode.
    #[error("invalid permissions '{value}': expected an octal mode such as 0600")]
    InvalidPermissions {
        /// Rejected value.
        value: String,
    },

    /// File contents are not valid UTF-8.
    #[error("contents of '{}' are not valid UTF-8", path.display())]
    InvalidContent {
        /// Offending file.
        path: PathBuf,
    },
}

impl ProvisionError {
    /// True if this error reports a resource that vanished from the backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProvisionError::NotFound { .. })
    }

    pub(crate) fn backend(msg: impl Into<String>) -> Self {
        ProvisionError::Backend(std::io::Error::new(std::io::ErrorKind::Other, msg.into()))
    }
}
