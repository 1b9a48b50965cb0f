//! Desired-state manifest.
//!
//! ```toml
//! [[directory]]
//! address = "conf_dir"
//! path = "conf/app"
//!
//! [[file]]
//! address = "app_config"
//! name = "app.conf"
//! directory = "conf/app"
//! contents = "listen = 8080\n"
//! permissions = "0640"
//! ```

use std::collections::HashSet;
use std::path::Path;

use filestate_core::{ContentSnapshot, FileSnapshot, ManagedDirectory, ManagedFile};
use serde::Deserialize;

use crate::error::{DriverError, DriverResult};
use crate::resource::Resource;

/// One declared entry: an address plus the record's own fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Declared<T> {
    /// Unique key of this resource in state.
    pub address: String,
    /// Declared record.
    #[serde(flatten)]
    pub resource: T,
}

/// Parsed manifest, one array per resource kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// `[[file]]` entries.
    #[serde(default)]
    pub file: Vec<Declared<ManagedFile>>,
    /// `[[directory]]` entries.
    #[serde(default)]
    pub directory: Vec<Declared<ManagedDirectory>>,
    /// `[[file_snapshot]]` entries.
    #[serde(default)]
    pub file_snapshot: Vec<Declared<FileSnapshot>>,
    /// `[[snapshot]]` entries.
    #[serde(default)]
    pub snapshot: Vec<Declared<ContentSnapshot>>,
}

impl Manifest {
    /// Reads and parses a manifest file.
    pub fn load(path: &Path) -> DriverResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|source| DriverError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// All declared resources in creation order.
    ///
    /// Fails if an address repeats, across kinds as well as within one.
    pub fn resources(&self) -> DriverResult<Vec<(String, Resource)>> {
        let mut out = Vec::new();
        out.extend(
            self.directory
                .iter()
                .map(|d| (d.address.clone(), Resource::Directory(d.resource.clone()))),
        );
        out.extend(
            self.file
                .iter()
                .map(|d| (d.address.clone(), Resource::File(d.resource.clone()))),
        );
        out.extend(
            self.file_snapshot
                .iter()
                .map(|d| (d.address.clone(), Resource::FileSnapshot(d.resource.clone()))),
        );
        out.extend(
            self.snapshot
                .iter()
                .map(|d| (d.address.clone(), Resource::Snapshot(d.resource.clone()))),
        );

        let mut seen = HashSet::new();
        for (address, _) in &out {
            if !seen.insert(address.as_str()) {
                return Err(DriverError::DuplicateAddress {
                    address: address.clone(),
                });
            }
        }
        Ok(out)
    }
}
