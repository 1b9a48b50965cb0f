//! Trigger-gated snapshots.
//!
//! A snapshot artifact is computed once and then frozen. It is recomputed
//! only when the declared trigger differs from the stored one; changes to
//! the source alone never reach the artifact.

use tracing::{debug, warn};

use crate::backend::FileBackend;
use crate::codec;
use crate::error::{ProvisionError, ProvisionResult};
use crate::identity::sha256_hex;
use crate::model::{ContentSnapshot, FileSnapshot};
use crate::reconcile::ReadOutcome;

const COMPRESSED_PREFIX: &str = "compressed_";
const ENCODED_PREFIX: &str = "encoded_";

/// An artifact together with its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Base64 text of the (optionally gzipped) source.
    pub artifact: String,
    /// SHA-256 of `artifact`.
    pub identifier: String,
}

/// The previously stored artifact and the trigger it was taken under.
#[derive(Debug, Clone, Copy)]
pub struct PriorArtifact<'a> {
    /// Trigger recorded in state.
    pub trigger: &'a str,
    /// Artifact recorded in state.
    pub artifact: &'a str,
    /// Identifier recorded in state.
    pub identifier: &'a str,
}

/// Outcome of [`SnapshotCache::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    /// Artifact to persist.
    pub cached: CachedArtifact,
    /// Whether it was recomputed.
    pub changed: bool,
}

/// Intermediate files in the source directory, removed on every exit path.
struct TempFiles<'a, B: FileBackend + ?Sized> {
    backend: &'a B,
    directory: &'a str,
    names: Vec<String>,
}

impl<'a, B: FileBackend + ?Sized> TempFiles<'a, B> {
    fn new(backend: &'a B, directory: &'a str) -> Self {
        Self {
            backend,
            directory,
            names: Vec::new(),
        }
    }

    fn track(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    fn remove(&self, name: &str) -> ProvisionResult<()> {
        match self.backend.delete(self.directory, name) {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }

    /// Removes every tracked file, surfacing the first failure.
    fn finish(mut self) -> ProvisionResult<()> {
        let names = std::mem::take(&mut self.names);
        let mut first_err = None;
        for name in &names {
            if let Err(e) = self.remove(name) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl<B: FileBackend + ?Sized> Drop for TempFiles<'_, B> {
    fn drop(&mut self) {
        for name in &self.names {
            if let Err(e) = self.remove(name) {
                warn!(directory = self.directory, file = %name, error = %e, "Failed to remove snapshot temp file");
            }
        }
    }
}

/// Computes and gates snapshot artifacts through a [`FileBackend`].
pub struct SnapshotCache<B> {
    backend: B,
}

impl<B: FileBackend> SnapshotCache<B> {
    /// Cache over `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Encodes `directory/name`, gzipping first when `compress` is set.
    ///
    /// Intermediate files are removed before returning, on success or
    /// failure.
    pub fn compute(
        &self,
        directory: &str,
        name: &str,
        compress: bool,
    ) -> ProvisionResult<CachedArtifact> {
        let mut temps = TempFiles::new(&self.backend, directory);

        let source = if compress {
            let out = format!("{COMPRESSED_PREFIX}{name}");
            temps.track(&out);
            self.backend.compress(directory, name, &out)?;
            out
        } else {
            name.to_string()
        };

        let encoded = format!("{ENCODED_PREFIX}{name}");
        temps.track(&encoded);
        self.backend.encode(directory, &source, &encoded)?;

        let reality = self.backend.read(directory, &encoded)?;
        let artifact = String::from_utf8(reality.data).map_err(|_| ProvisionError::InvalidContent {
            path: std::path::Path::new(directory).join(&encoded),
        })?;
        let identifier = self.backend.hash(directory, &encoded)?;
        temps.finish()?;

        debug!(directory, name, compress, id = %identifier, bytes = artifact.len(), "Computed snapshot artifact");
        Ok(CachedArtifact {
            artifact,
            identifier,
        })
    }

    /// Returns the prior artifact unchanged while the trigger holds,
    /// otherwise recomputes it.
    pub fn ensure(
        &self,
        directory: &str,
        name: &str,
        trigger: &str,
        prior: Option<PriorArtifact<'_>>,
        compress: bool,
    ) -> ProvisionResult<Ensured> {
        match prior {
            Some(prior) if prior.trigger == trigger => {
                debug!(directory, name, trigger, "Snapshot trigger unchanged, keeping artifact");
                Ok(Ensured {
                    cached: CachedArtifact {
                        artifact: prior.artifact.to_string(),
                        identifier: prior.identifier.to_string(),
                    },
                    changed: false,
                })
            }
            _ => Ok(Ensured {
                cached: self.compute(directory, name, compress)?,
                changed: true,
            }),
        }
    }
}

/// Create/read/update/delete for [`FileSnapshot`] records.
pub struct FileSnapshotEngine<B> {
    cache: SnapshotCache<B>,
}

impl<B: FileBackend> FileSnapshotEngine<B> {
    /// Engine over `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            cache: SnapshotCache::new(backend),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &SnapshotCache<B> {
        &self.cache
    }

    /// Always captures the source.
    pub fn create(&self, plan: &FileSnapshot) -> ProvisionResult<FileSnapshot> {
        let ensured = self
            .cache
            .ensure(&plan.directory, &plan.name, &plan.trigger, None, plan.compress)?;
        Ok(FileSnapshot {
            artifact: ensured.cached.artifact,
            identifier: ensured.cached.identifier,
            ..plan.clone()
        })
    }

    /// The artifact is frozen outside updates, so state is returned as is.
    pub fn read(&self, state: &FileSnapshot) -> ProvisionResult<ReadOutcome<FileSnapshot>> {
        Ok(ReadOutcome::Present(state.clone()))
    }

    /// Recaptures only when the trigger changed, with the compression
    /// setting recorded at creation.
    pub fn update(
        &self,
        plan: &FileSnapshot,
        prior: &FileSnapshot,
    ) -> ProvisionResult<FileSnapshot> {
        let ensured = self.cache.ensure(
            &plan.directory,
            &plan.name,
            &plan.trigger,
            Some(PriorArtifact {
                trigger: &prior.trigger,
                artifact: &prior.artifact,
                identifier: &prior.identifier,
            }),
            prior.compress,
        )?;
        Ok(FileSnapshot {
            name: plan.name.clone(),
            directory: plan.directory.clone(),
            artifact: ensured.cached.artifact,
            trigger: plan.trigger.clone(),
            compress: prior.compress,
            identifier: ensured.cached.identifier,
        })
    }

    /// Nothing outside state to remove.
    pub fn delete(&self, _state: &FileSnapshot) -> ProvisionResult<()> {
        Ok(())
    }
}

/// Create/read/update/delete for [`ContentSnapshot`] records. Pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSnapshotEngine;

impl ContentSnapshotEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    fn capture(contents: &str) -> CachedArtifact {
        CachedArtifact {
            artifact: contents.to_string(),
            identifier: sha256_hex(codec::encode(contents.as_bytes()).as_bytes()),
        }
    }

    /// Captures the declared contents.
    pub fn create(&self, plan: &ContentSnapshot) -> ProvisionResult<ContentSnapshot> {
        let cached = Self::capture(&plan.contents);
        Ok(ContentSnapshot {
            snapshot: cached.artifact,
            identifier: cached.identifier,
            ..plan.clone()
        })
    }

    /// No live state to observe.
    pub fn read(&self, state: &ContentSnapshot) -> ProvisionResult<ReadOutcome<ContentSnapshot>> {
        Ok(ReadOutcome::Present(state.clone()))
    }

    /// Recaptures only when the trigger changed.
    pub fn update(
        &self,
        plan: &ContentSnapshot,
        prior: &ContentSnapshot,
    ) -> ProvisionResult<ContentSnapshot> {
        let cached = if plan.trigger == prior.trigger {
            CachedArtifact {
                artifact: prior.snapshot.clone(),
                identifier: prior.identifier.clone(),
            }
        } else {
            Self::capture(&plan.contents)
        };
        Ok(ContentSnapshot {
            contents: plan.contents.clone(),
            snapshot: cached.artifact,
            trigger: plan.trigger.clone(),
            identifier: cached.identifier,
        })
    }

    /// Nothing outside state to remove.
    pub fn delete(&self, _state: &ContentSnapshot) -> ProvisionResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;

    const CONTENTS: &str = "these contents are the default for testing";
    const ENCODED: &str = "dGhlc2UgY29udGVudHMgYXJlIHRoZSBkZWZhdWx0IGZvciB0ZXN0aW5n";
    const ENCODED_ID: &str = "ba8cd27d74eb572956e09da49530c5ab2dd66ee946956e9d55a4cd09b76ab527";

    fn engine_with_source(contents: &str) -> FileSnapshotEngine<MemoryBackend> {
        let backend = MemoryBackend::new()
            .with_file("./src.txt", contents.as_bytes(), "0600")
            .unwrap();
        FileSnapshotEngine::new(backend)
    }

    fn rewrite_source(engine: &FileSnapshotEngine<MemoryBackend>, contents: &str) {
        FileBackend::create(engine.cache().backend(), ".", "src.txt", contents.as_bytes(), "0600")
            .unwrap();
    }

    #[test]
    fn create_encodes_source() {
        let engine = engine_with_source(CONTENTS);
        let record = engine.create(&FileSnapshot::new("src.txt", "first")).unwrap();
        assert_eq!(record.artifact, ENCODED);
        assert_eq!(record.identifier, ENCODED_ID);
    }

    #[test]
    fn temp_files_are_removed() {
        let engine = engine_with_source(CONTENTS);
        engine
            .create(&FileSnapshot::new("src.txt", "first").compressed(true))
            .unwrap();
        let backend = engine.cache().backend();
        assert!(!backend.exists("./compressed_src.txt"));
        assert!(!backend.exists("./encoded_src.txt"));
        assert!(backend.exists("./src.txt"));
    }

    #[test]
    fn temp_files_are_removed_on_failure() {
        let engine = FileSnapshotEngine::new(MemoryBackend::new());
        let err = engine.create(&FileSnapshot::new("missing.txt", "t")).unwrap_err();
        assert!(err.is_not_found());
        assert!(!engine.cache().backend().exists("./encoded_missing.txt"));
    }

    #[test]
    fn compressed_artifact_decodes_to_source() {
        let engine = engine_with_source(CONTENTS);
        let record = engine
            .create(&FileSnapshot::new("src.txt", "first").compressed(true))
            .unwrap();
        let data = codec::decompress(&codec::decode(&record.artifact).unwrap()).unwrap();
        assert_eq!(data, CONTENTS.as_bytes());
        assert_eq!(record.identifier, sha256_hex(record.artifact.as_bytes()));
    }

    #[test]
    fn unchanged_trigger_keeps_artifact_despite_source_drift() {
        let engine = engine_with_source(CONTENTS);
        let prior = engine.create(&FileSnapshot::new("src.txt", "first")).unwrap();
        rewrite_source(&engine, "something entirely different");

        let next = engine
            .update(&FileSnapshot::new("src.txt", "first"), &prior)
            .unwrap();
        assert_eq!(next.artifact, ENCODED);
        assert_eq!(next.identifier, ENCODED_ID);
    }

    #[test]
    fn changed_trigger_recomputes() {
        let engine = engine_with_source(CONTENTS);
        let prior = engine.create(&FileSnapshot::new("src.txt", "first")).unwrap();
        rewrite_source(&engine, "hello");

        let next = engine
            .update(&FileSnapshot::new("src.txt", "second"), &prior)
            .unwrap();
        assert_eq!(next.artifact, "aGVsbG8=");
        assert_eq!(next.identifier, sha256_hex(b"aGVsbG8="));
        assert_eq!(next.trigger, "second");
    }

    #[test]
    fn update_uses_compress_flag_from_creation() {
        let engine = engine_with_source(CONTENTS);
        let prior = engine
            .create(&FileSnapshot::new("src.txt", "first").compressed(true))
            .unwrap();
        let next = engine
            .update(&FileSnapshot::new("src.txt", "second"), &prior)
            .unwrap();
        assert!(next.compress);
        assert_ne!(next.artifact, ENCODED);
    }

    #[test]
    fn failed_recompute_is_surfaced_and_prior_untouched() {
        let engine = engine_with_source(CONTENTS);
        let prior = engine.create(&FileSnapshot::new("src.txt", "first")).unwrap();
        FileBackend::delete(engine.cache().backend(), ".", "src.txt").unwrap();

        let before = prior.clone();
        assert!(engine
            .update(&FileSnapshot::new("src.txt", "second"), &prior)
            .is_err());
        assert_eq!(prior, before);
    }

    #[test]
    fn ensure_reports_changed_flag() {
        let engine = engine_with_source(CONTENTS);
        let cache = engine.cache();
        let first = cache.ensure(".", "src.txt", "t", None, false).unwrap();
        assert!(first.changed);

        let prior = PriorArtifact {
            trigger: "t",
            artifact: &first.cached.artifact,
            identifier: &first.cached.identifier,
        };
        let again = cache.ensure(".", "src.txt", "t", Some(prior), false).unwrap();
        assert!(!again.changed);
        assert_eq!(again.cached, first.cached);
    }

    #[test]
    fn read_and_delete_are_noops() {
        let engine = engine_with_source(CONTENTS);
        let record = engine.create(&FileSnapshot::new("src.txt", "first")).unwrap();
        let before = engine.cache().backend().mutations();
        assert_eq!(
            engine.read(&record).unwrap(),
            ReadOutcome::Present(record.clone())
        );
        engine.delete(&record).unwrap();
        assert_eq!(engine.cache().backend().mutations(), before);
    }

    #[test]
    fn content_snapshot_identity() {
        let engine = ContentSnapshotEngine::new();
        let record = engine.create(&ContentSnapshot::new(CONTENTS, "t1")).unwrap();
        assert_eq!(record.snapshot, CONTENTS);
        assert_eq!(record.identifier, ENCODED_ID);
    }

    #[test]
    fn content_snapshot_trigger_gating() {
        let engine = ContentSnapshotEngine::new();
        let prior = engine.create(&ContentSnapshot::new(CONTENTS, "t1")).unwrap();

        let held = engine.update(&ContentSnapshot::new("new", "t1"), &prior).unwrap();
        assert_eq!(held.contents, "new");
        assert_eq!(held.snapshot, CONTENTS);
        assert_eq!(held.identifier, ENCODED_ID);

        let moved = engine.update(&ContentSnapshot::new("new", "t2"), &held).unwrap();
        assert_eq!(moved.snapshot, "new");
        assert_eq!(moved.identifier, sha256_hex(codec::encode(b"new").as_bytes()));
    }
}
