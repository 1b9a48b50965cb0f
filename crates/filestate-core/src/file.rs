//! Lifecycle of a managed file.
//!
//! Protected files are checked against their declared identifier before any
//! write or removal. Unprotected files get an identifier derived with the
//! fallback key and never persist a key.

use tracing::debug;

use crate::backend::FileBackend;
use crate::error::{ProvisionError, ProvisionResult};
use crate::identity::content_digest;
use crate::model::{same_mode, ManagedFile};
use crate::protection::validate_protected_with;
use crate::reconcile::ReadOutcome;
use crate::secret::{
    resolve_key, KeySource, ResolvedKey, SecretSource, StaticSecret, UNPROTECTED_HMAC_SECRET,
};

/// Create/read/update/delete for [`ManagedFile`] records.
pub struct FileEngine<B, S> {
    backend: B,
    secrets: S,
}

impl<B: FileBackend, S: SecretSource> FileEngine<B, S> {
    /// Engine over `backend`, taking environment keys from `secrets`.
    pub fn new(backend: B, secrets: S) -> Self {
        Self { backend, secrets }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Writes the planned file and returns the record to persist.
    ///
    /// Nothing is written if validation fails.
    pub fn create(&self, plan: &ManagedFile) -> ProvisionResult<ManagedFile> {
        let record = self.normalize(plan)?;
        self.backend.create(
            &record.directory,
            &record.name,
            record.contents.as_bytes(),
            &record.permissions,
        )?;
        debug!(path = %record.path().display(), id = %record.identifier, "Created file resource");
        Ok(record)
    }

    /// Refreshes `state` from the backend.
    ///
    /// Drifted contents are adopted and re-identified with the effective key;
    /// protection is not re-checked here.
    pub fn read(&self, state: &ManagedFile) -> ProvisionResult<ReadOutcome<ManagedFile>> {
        let reality = match self.backend.read(&state.directory, &state.name) {
            Ok(reality) => reality,
            Err(e) if e.is_not_found() => {
                debug!(path = %state.path().display(), "File resource vanished");
                return Ok(ReadOutcome::Removed);
            }
            Err(e) => return Err(e),
        };

        let mut record = state.clone();
        if reality.data != state.contents.as_bytes() {
            let contents =
                String::from_utf8(reality.data).map_err(|_| ProvisionError::InvalidContent {
                    path: state.path(),
                })?;
            let key = self.effective_key(state);
            record.identifier = content_digest(contents.as_bytes(), key.value())?;
            record.contents = contents;
            debug!(path = %state.path().display(), id = %record.identifier, "File contents drifted");
        }
        if !same_mode(&reality.permissions, &state.permissions) {
            debug!(
                path = %state.path().display(),
                stored = %state.permissions,
                live = %reality.permissions,
                "File permissions drifted"
            );
            record.permissions = reality.permissions;
        }
        Ok(ReadOutcome::Present(record))
    }

    /// Converges `prior` to `plan`; the result carries the plan's values.
    pub fn update(&self, plan: &ManagedFile, prior: &ManagedFile) -> ProvisionResult<ManagedFile> {
        let record = self.normalize(plan)?;
        if prior.protected {
            self.validate(prior)?;
        }

        let moved = prior.directory != record.directory || prior.name != record.name;
        let rewritten = prior.contents != record.contents;
        let chmod = !same_mode(&prior.permissions, &record.permissions);
        if moved || rewritten || chmod {
            self.backend.update(
                &prior.directory,
                &prior.name,
                &record.directory,
                &record.name,
                record.contents.as_bytes(),
                &record.permissions,
            )?;
            debug!(
                from = %prior.path().display(),
                to = %record.path().display(),
                moved,
                rewritten,
                chmod,
                "Updated file resource"
            );
        } else {
            debug!(path = %record.path().display(), "File unchanged on disk, skipping write");
        }
        Ok(record)
    }

    /// Removes the file, refusing if a protected identity does not verify.
    pub fn delete(&self, state: &ManagedFile) -> ProvisionResult<()> {
        if state.protected {
            self.validate(state)?;
        }
        self.backend.delete(&state.directory, &state.name)?;
        debug!(path = %state.path().display(), "Deleted file resource");
        Ok(())
    }

    fn normalize(&self, plan: &ManagedFile) -> ProvisionResult<ManagedFile> {
        let mut record = plan.clone();
        if plan.protected {
            let key = self.validate(plan)?;
            if key != KeySource::Explicit {
                record.secret_key.clear();
            }
        } else {
            record.identifier = content_digest(plan.contents.as_bytes(), UNPROTECTED_HMAC_SECRET)?;
            record.secret_key.clear();
        }
        Ok(record)
    }

    fn validate(&self, record: &ManagedFile) -> ProvisionResult<KeySource> {
        let key = resolve_key(&record.secret_key, &self.secrets, None);
        validate_protected_with(
            true,
            &record.identifier,
            key.value(),
            record.contents.as_bytes(),
            &self.secrets.describe(),
        )?;
        Ok(key.source())
    }

    fn effective_key(&self, record: &ManagedFile) -> ResolvedKey {
        if record.protected {
            resolve_key(&record.secret_key, &self.secrets, None)
        } else {
            resolve_key("", &StaticSecret::none(), Some(UNPROTECTED_HMAC_SECRET))
        }
    }
}
