//! A managed resource of any kind, as stored in state.

use filestate_core::{ContentSnapshot, FileSnapshot, ManagedDirectory, ManagedFile};
use serde::{Deserialize, Serialize};

/// Tagged union over the four record types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    /// A managed file.
    File(ManagedFile),
    /// A managed directory.
    Directory(ManagedDirectory),
    /// A trigger-gated copy of a file.
    FileSnapshot(FileSnapshot),
    /// A trigger-gated copy of declared contents.
    Snapshot(ContentSnapshot),
}

impl Resource {
    /// Kind name as used in manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::File(_) => "file",
            Resource::Directory(_) => "directory",
            Resource::FileSnapshot(_) => "file_snapshot",
            Resource::Snapshot(_) => "snapshot",
        }
    }

    /// Creation order: directories before the files inside them, files
    /// before the snapshots taken of them. Deletion runs in reverse.
    pub fn rank(&self) -> u8 {
        match self {
            Resource::Directory(_) => 0,
            Resource::File(_) => 1,
            Resource::FileSnapshot(_) => 2,
            Resource::Snapshot(_) => 3,
        }
    }
}
