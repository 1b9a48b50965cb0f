//! In-memory backend for deterministic tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::backend::{
    DirectoryBackend, DirectoryReality, EntryInfo, EntryKind, FileBackend, FileReality,
    PathSegments,
};
use crate::codec;
use crate::directory::{ensure_path, top_created_segment};
use crate::error::{ProvisionError, ProvisionResult};
use crate::identity::sha256_hex;
use crate::model::{format_mode, parse_mode};

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        mode: u32,
        modified: DateTime<Utc>,
    },
    Dir {
        mode: u32,
        modified: DateTime<Utc>,
    },
}

impl Node {
    fn mode(&self) -> u32 {
        match self {
            Node::File { mode, .. } | Node::Dir { mode, .. } => *mode,
        }
    }
}

/// A filesystem tree held in a map keyed by full path.
///
/// Parents of files are not required to exist. Every mutating call bumps
/// [`MemoryBackend::mutations`], which lets tests assert that nothing was
/// written.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
    mutations: AtomicU64,
}

fn file_path(directory: &str, name: &str) -> PathBuf {
    Path::new(directory).join(name)
}

fn poisoned() -> ProvisionError {
    ProvisionError::backend("memory backend lock poisoned")
}

impl MemoryBackend {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing directory, e.g. one that predates any resource.
    pub fn with_directory(self, path: &str, permissions: &str) -> ProvisionResult<Self> {
        let mode = parse_mode(permissions)?;
        self.nodes.write().map_err(|_| poisoned())?.insert(
            PathBuf::from(path),
            Node::Dir {
                mode,
                modified: Utc::now(),
            },
        );
        Ok(self)
    }

    /// Seeds an existing file without counting a mutation.
    pub fn with_file(self, path: &str, data: &[u8], permissions: &str) -> ProvisionResult<Self> {
        let mode = parse_mode(permissions)?;
        self.nodes.write().map_err(|_| poisoned())?.insert(
            PathBuf::from(path),
            Node::File {
                data: data.to_vec(),
                mode,
                modified: Utc::now(),
            },
        );
        Ok(self)
    }

    /// Number of mutating calls served so far.
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    /// Whether anything exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.nodes
            .read()
            .map(|nodes| nodes.contains_key(Path::new(path)))
            .unwrap_or(false)
    }

    /// Raw file bytes at `path`, if it holds a file.
    pub fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        let nodes = self.nodes.read().ok()?;
        match nodes.get(Path::new(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    fn load_file(&self, path: &Path) -> ProvisionResult<(Vec<u8>, u32)> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        match nodes.get(path) {
            Some(Node::File { data, mode, .. }) => Ok((data.clone(), *mode)),
            Some(Node::Dir { .. }) => Err(ProvisionError::backend(format!(
                "{} is a directory",
                path.display()
            ))),
            None => Err(ProvisionError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn store_file(&self, path: PathBuf, data: Vec<u8>, mode: u32) -> ProvisionResult<()> {
        self.bump();
        self.nodes.write().map_err(|_| poisoned())?.insert(
            path,
            Node::File {
                data,
                mode,
                modified: Utc::now(),
            },
        );
        Ok(())
    }
}

impl FileBackend for MemoryBackend {
    fn create(
        &self,
        directory: &str,
        name: &str,
        data: &[u8],
        permissions: &str,
    ) -> ProvisionResult<()> {
        let mode = parse_mode(permissions)?;
        self.store_file(file_path(directory, name), data.to_vec(), mode)
    }

    fn read(&self, directory: &str, name: &str) -> ProvisionResult<FileReality> {
        let (data, mode) = self.load_file(&file_path(directory, name))?;
        Ok(FileReality {
            permissions: format_mode(mode),
            data,
        })
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
        let mode = parse_mode(permissions)?;
        let old_path = file_path(old_directory, old_name);
        let new_path = file_path(new_directory, new_name);
        self.load_file(&old_path)?;
        if old_path != new_path {
            self.nodes.write().map_err(|_| poisoned())?.remove(&old_path);
        }
        self.store_file(new_path, data.to_vec(), mode)
    }

    fn delete(&self, directory: &str, name: &str) -> ProvisionResult<()> {
        let path = file_path(directory, name);
        self.load_file(&path)?;
        self.bump();
        self.nodes.write().map_err(|_| poisoned())?.remove(&path);
        Ok(())
    }

    fn compress(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()> {
        let (data, _) = self.load_file(&file_path(directory, name))?;
        let packed = codec::compress(&data)?;
        self.store_file(file_path(directory, out_name), packed, 0o644)
    }

    fn encode(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()> {
        let (data, _) = self.load_file(&file_path(directory, name))?;
        let encoded = codec::encode(&data).into_bytes();
        self.store_file(file_path(directory, out_name), encoded, 0o644)
    }

    fn hash(&self, directory: &str, name: &str) -> ProvisionResult<String> {
        let (data, _) = self.load_file(&file_path(directory, name))?;
        Ok(sha256_hex(&data))
    }
}

impl PathSegments for MemoryBackend {
    fn probe(&self, path: &Path) -> ProvisionResult<Option<EntryKind>> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        Ok(nodes.get(path).map(|node| match node {
            Node::Dir { .. } => EntryKind::Directory,
            Node::File { .. } => EntryKind::File,
        }))
    }

    fn make_segment(&self, path: &Path, mode: u32) -> ProvisionResult<()> {
        self.bump();
        self.nodes.write().map_err(|_| poisoned())?.insert(
            path.to_path_buf(),
            Node::Dir {
                mode,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn remove_segment(&self, path: &Path) -> ProvisionResult<()> {
        self.bump();
        self.nodes.write().map_err(|_| poisoned())?.remove(path);
        Ok(())
    }
}

impl DirectoryBackend for MemoryBackend {
    fn create(&self, path: &str, permissions: &str) -> ProvisionResult<Option<String>> {
        let mode = parse_mode(permissions)?;
        let created = ensure_path(self, Path::new(path), mode)?;
        Ok(top_created_segment(&created))
    }

    fn read(&self, path: &str) -> ProvisionResult<DirectoryReality> {
        let dir = Path::new(path);
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        let mode = match nodes.get(dir) {
            Some(Node::Dir { mode, .. }) => *mode,
            Some(Node::File { .. }) => {
                return Err(ProvisionError::backend(format!(
                    "{} is not a directory",
                    dir.display()
                )))
            }
            None => {
                return Err(ProvisionError::NotFound {
                    path: dir.to_path_buf(),
                })
            }
        };

        let mut entries = BTreeMap::new();
        for (child, node) in nodes.iter() {
            if child.parent() != Some(dir) {
                continue;
            }
            let Some(name) = child.file_name() else {
                continue;
            };
            let (size, modified, is_directory) = match node {
                Node::File { data, modified, .. } => (data.len() as u64, modified, false),
                Node::Dir { modified, .. } => (0, modified, true),
            };
            entries.insert(
                name.to_string_lossy().into_owned(),
                EntryInfo {
                    size,
                    permissions: format_mode(node.mode()),
                    last_modified: modified.to_rfc3339_opts(SecondsFormat::Secs, true),
                    is_directory,
                },
            );
        }
        Ok(DirectoryReality {
            permissions: format_mode(mode),
            entries,
        })
    }

    fn update(&self, path: &str, permissions: &str) -> ProvisionResult<()> {
        let new_mode = parse_mode(permissions)?;
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        match nodes.get_mut(Path::new(path)) {
            Some(Node::Dir { mode, .. }) => {
                *mode = new_mode;
                self.bump();
                Ok(())
            }
            Some(Node::File { .. }) => Err(ProvisionError::Conflict {
                path: PathBuf::from(path),
            }),
            None => Err(ProvisionError::NotFound {
                path: PathBuf::from(path),
            }),
        }
    }

    fn delete(&self, path: &str) -> ProvisionResult<()> {
        if path.is_empty() {
            return Ok(());
        }
        let root = Path::new(path);
        self.bump();
        self.nodes
            .write()
            .map_err(|_| poisoned())?
            .retain(|key, _| !key.starts_with(root));
        Ok(())
    }

    fn create_file(&self, path: &str, data: &[u8], permissions: &str) -> ProvisionResult<()> {
        let mode = parse_mode(permissions)?;
        self.store_file(PathBuf::from(path), data.to_vec(), mode)
    }
}
