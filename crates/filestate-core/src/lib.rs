#![warn(missing_docs)]

//! Filestate core: local files, directories and snapshots managed as declarative resources
//!
//! Identity:  contents + key → HMAC-SHA256 (files), path → SHA-256 (directories), artifact → SHA-256 (snapshots)
//! Lifecycle: plan + prior state + live reality → Action → engine create/read/update/delete → new state

pub mod backend;
pub mod codec;
pub mod datasource;
pub mod directory;
pub mod directory_resource;
pub mod error;
pub mod file;
pub mod identity;
pub mod memory_backend;
pub mod model;
pub mod os_backend;
pub mod protection;
pub mod reconcile;
pub mod secret;
pub mod snapshot;

pub use backend::{DirectoryBackend, DirectoryReality, EntryInfo, EntryKind, FileBackend, FileReality, PathSegments};
pub use datasource::{decode_snapshot, read_directory_data, read_file_data, DecodedSnapshot, DirectoryData, FileData};
pub use directory::{ensure_path, top_created_segment};
pub use directory_resource::DirectoryEngine;
pub use error::{ProtectionError, ProvisionError, ProvisionResult};
pub use file::FileEngine;
pub use identity::{content_digest, digest_matches, path_digest, sha256_hex};
pub use memory_backend::MemoryBackend;
pub use model::{ContentSnapshot, FileSnapshot, ManagedDirectory, ManagedFile};
pub use os_backend::OsBackend;
pub use protection::validate_protected;
pub use reconcile::{plan, Action, ReadOutcome, Reconcile};
pub use secret::{resolve_key, EnvSecret, KeySource, ResolvedKey, SecretSource, StaticSecret, HMAC_KEY_ENV};
pub use snapshot::{CachedArtifact, ContentSnapshotEngine, Ensured, FileSnapshotEngine, PriorArtifact, SnapshotCache};
