//! Persisted state: one JSON document keyed by resource address.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::resource::Resource;

/// Version written by this build.
pub const STATE_VERSION: u32 = 1;

/// Recorded results of the last successful step for each resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Document format version.
    pub version: u32,
    /// Records keyed by address.
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
        }
    }
}

/// Loads and atomically saves a [`State`] file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads state; a missing file is an empty state.
    pub fn load(&self) -> DriverResult<State> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(State::default()),
            Err(e) => return Err(e.into()),
        };
        let state: State = serde_json::from_str(&contents).map_err(|source| DriverError::State {
            path: self.path.clone(),
            source,
        })?;
        if state.version != STATE_VERSION {
            return Err(DriverError::StateVersion {
                found: state.version,
                expected: STATE_VERSION,
            });
        }
        Ok(state)
    }

    /// Writes to a sibling temp file, then renames over the target.
    ///
    /// State can hold file contents and keys, so it is created `0600`.
    pub fn save(&self, state: &State) -> DriverResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp)?;
            file.write_all(&json)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), resources = state.resources.len(), "Saved state");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}
