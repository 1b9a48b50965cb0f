//! Backend over the local filesystem.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::backend::{
    DirectoryBackend, DirectoryReality, EntryInfo, EntryKind, FileBackend, FileReality,
    PathSegments,
};
use crate::codec::{compress_stream, encode_stream};
use crate::directory::{ensure_path, top_created_segment};
use crate::error::{ProvisionError, ProvisionResult};
use crate::identity::sha256_reader;
use crate::model::{format_mode, parse_mode};

/// Direct `std::fs` backend. Stateless; paths are used as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsBackend;

impl OsBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

fn file_path(directory: &str, name: &str) -> PathBuf {
    Path::new(directory).join(name)
}

fn map_io(path: &Path, err: io::Error) -> ProvisionError {
    if err.kind() == io::ErrorKind::NotFound {
        ProvisionError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ProvisionError::Backend(err)
    }
}

fn write_with_mode(path: &Path, data: &[u8], mode: u32) -> ProvisionResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| map_io(path, e))?;
    file.write_all(data)?;
    file.sync_all()?;
    // Creation mode is masked by the umask; set it explicitly.
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

fn mode_of(path: &Path) -> ProvisionResult<String> {
    let metadata = fs::metadata(path).map_err(|e| map_io(path, e))?;
    Ok(format_mode(metadata.permissions().mode()))
}

fn rfc3339(time: std::time::SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl FileBackend for OsBackend {
    fn create(
        &self,
        directory: &str,
        name: &str,
        data: &[u8],
        permissions: &str,
    ) -> ProvisionResult<()> {
        let mode = parse_mode(permissions)?;
        let path = file_path(directory, name);
        write_with_mode(&path, data, mode)?;
        debug!(path = %path.display(), bytes = data.len(), "Created file");
        Ok(())
    }

    fn read(&self, directory: &str, name: &str) -> ProvisionResult<FileReality> {
        let path = file_path(directory, name);
        let data = fs::read(&path).map_err(|e| map_io(&path, e))?;
        let permissions = mode_of(&path)?;
        Ok(FileReality { permissions, data })
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
        if old_path != new_path {
            fs::rename(&old_path, &new_path).map_err(|e| map_io(&old_path, e))?;
            debug!(from = %old_path.display(), to = %new_path.display(), "Moved file");
        }
        write_with_mode(&new_path, data, mode)?;
        debug!(path = %new_path.display(), bytes = data.len(), "Updated file");
        Ok(())
    }

    fn delete(&self, directory: &str, name: &str) -> ProvisionResult<()> {
        let path = file_path(directory, name);
        fs::remove_file(&path).map_err(|e| map_io(&path, e))?;
        debug!(path = %path.display(), "Deleted file");
        Ok(())
    }

    fn compress(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()> {
        let src = file_path(directory, name);
        let dst = file_path(directory, out_name);
        let input = File::open(&src).map_err(|e| map_io(&src, e))?;
        let output = File::create(&dst).map_err(|e| map_io(&dst, e))?;
        let mut writer = compress_stream(BufReader::new(input), BufWriter::new(output))?;
        writer.flush()?;
        Ok(())
    }

    fn encode(&self, directory: &str, name: &str, out_name: &str) -> ProvisionResult<()> {
        let src = file_path(directory, name);
        let dst = file_path(directory, out_name);
        let input = File::open(&src).map_err(|e| map_io(&src, e))?;
        let output = File::create(&dst).map_err(|e| map_io(&dst, e))?;
        let mut writer = encode_stream(BufReader::new(input), BufWriter::new(output))?;
        writer.flush()?;
        Ok(())
    }

    fn hash(&self, directory: &str, name: &str) -> ProvisionResult<String> {
        let path = file_path(directory, name);
        let file = File::open(&path).map_err(|e| map_io(&path, e))?;
        Ok(sha256_reader(BufReader::new(file))?)
    }
}

impl PathSegments for OsBackend {
    fn probe(&self, path: &Path) -> ProvisionResult<Option<EntryKind>> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProvisionError::Backend(e)),
        }
    }

    fn make_segment(&self, path: &Path, mode: u32) -> ProvisionResult<()> {
        fs::create_dir(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    fn remove_segment(&self, path: &Path) -> ProvisionResult<()> {
        match fs::remove_dir(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(ProvisionError::Backend(e)),
            _ => Ok(()),
        }
    }
}

impl DirectoryBackend for OsBackend {
    fn create(&self, path: &str, permissions: &str) -> ProvisionResult<Option<String>> {
        let mode = parse_mode(permissions)?;
        let created = ensure_path(self, Path::new(path), mode)?;
        Ok(top_created_segment(&created))
    }

    fn read(&self, path: &str) -> ProvisionResult<DirectoryReality> {
        let dir = Path::new(path);
        let permissions = mode_of(dir)?;
        let mut entries = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(|e| map_io(dir, e))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.insert(
                entry.file_name().to_string_lossy().into_owned(),
                EntryInfo {
                    size: meta.len(),
                    permissions: format_mode(meta.permissions().mode()),
                    last_modified: rfc3339(meta.modified()?),
                    is_directory: meta.is_dir(),
                },
            );
        }
        Ok(DirectoryReality {
            permissions,
            entries,
        })
    }

    fn update(&self, path: &str, permissions: &str) -> ProvisionResult<()> {
        let mode = parse_mode(permissions)?;
        let dir = Path::new(path);
        fs::set_permissions(dir, fs::Permissions::from_mode(mode)).map_err(|e| map_io(dir, e))?;
        debug!(path, permissions, "Changed directory mode");
        Ok(())
    }

    fn delete(&self, path: &str) -> ProvisionResult<()> {
        if path.is_empty() {
            return Ok(());
        }
        match fs::remove_dir_all(path) {
            Ok(()) => {
                debug!(path, "Removed directory tree");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProvisionError::Backend(e)),
        }
    }

    fn create_file(&self, path: &str, data: &[u8], permissions: &str) -> ProvisionResult<()> {
        let mode = parse_mode(permissions)?;
        write_with_mode(Path::new(path), data, mode)
    }
}
