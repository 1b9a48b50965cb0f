//! Error types for manifest, state and driver operations.

use std::path::PathBuf;

use filestate_core::ProvisionError;
use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Failures outside the resource engines themselves.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Two manifest entries share an address.
    #[error("duplicate resource address '{address}' in manifest")]
    DuplicateAddress {
        /// Repeated address.
        address: String,
    },

    /// The manifest is not valid TOML or has unknown fields.
    #[error("failed to parse manifest {}: {source}", path.display())]
    Manifest {
        /// Manifest file.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },

    /// The state document is not valid JSON.
    #[error("failed to parse state {}: {source}", path.display())]
    State {
        /// State file.
        path: PathBuf,
        /// Parser error.
        source: serde_json::Error,
    },

    /// The state document was written by an incompatible version.
    #[error("unsupported state version {found} (expected {expected})")]
    StateVersion {
        /// Version in the file.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },

    /// A resource step failed.
    #[error("{address}: {source}")]
    Resource {
        /// Address of the failing resource.
        address: String,
        /// Engine error.
        source: ProvisionError,
    },

    /// Reading or writing the manifest or state failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing state failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DriverError {
    pub(crate) fn resource(address: &str, source: ProvisionError) -> Self {
        DriverError::Resource {
            address: address.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_names_address() {
        let err = DriverError::resource(
            "file.config",
            ProvisionError::NotFound {
                path: PathBuf::from("a/b"),
            },
        );
        assert_eq!(err.to_string(), "file.config: not found: a/b");
    }

    #[test]
    fn test_version_message() {
        let err = DriverError::StateVersion {
            found: 7,
            expected: 1,
        };
        assert_eq!(err.to_string(), "unsupported state version 7 (expected 1)");
    }
}
