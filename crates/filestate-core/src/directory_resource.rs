//! Lifecycle of a managed directory.

use tracing::debug;

use crate::backend::DirectoryBackend;
use crate::error::ProvisionResult;
use crate::identity::path_digest;
use crate::model::{same_mode, ManagedDirectory};
use crate::reconcile::ReadOutcome;

/// Create/read/update/delete for [`ManagedDirectory`] records.
///
/// Identity is the SHA-256 of the path, so no key is involved.
pub struct DirectoryEngine<B> {
    backend: B,
}

impl<B: DirectoryBackend> DirectoryEngine<B> {
    /// Engine over `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates the directory and any missing parents.
    pub fn create(&self, plan: &ManagedDirectory) -> ProvisionResult<ManagedDirectory> {
        let created = self.backend.create(&plan.path, &plan.permissions)?;
        let record = ManagedDirectory {
            path: plan.path.clone(),
            permissions: plan.permissions.clone(),
            identifier: path_digest(&plan.path),
            top_created_segment: created.unwrap_or_default(),
        };
        debug!(
            path = %record.path,
            id = %record.identifier,
            created = %record.top_created_segment,
            "Created directory resource"
        );
        Ok(record)
    }

    /// Refreshes permissions; a vanished directory is reported as removed.
    pub fn read(&self, state: &ManagedDirectory) -> ProvisionResult<ReadOutcome<ManagedDirectory>> {
        let reality = match self.backend.read(&state.path) {
            Ok(reality) => reality,
            Err(e) if e.is_not_found() => {
                debug!(path = %state.path, "Directory resource vanished");
                return Ok(ReadOutcome::Removed);
            }
            Err(e) => return Err(e),
        };
        let mut record = state.clone();
        if !same_mode(&reality.permissions, &state.permissions) {
            record.permissions = reality.permissions;
        }
        Ok(ReadOutcome::Present(record))
    }

    /// Applies a permissions change. Everything else is replace-only.
    pub fn update(
        &self,
        plan: &ManagedDirectory,
        prior: &ManagedDirectory,
    ) -> ProvisionResult<ManagedDirectory> {
        if !same_mode(&plan.permissions, &prior.permissions) {
            self.backend.update(&prior.path, &plan.permissions)?;
            debug!(path = %prior.path, permissions = %plan.permissions, "Updated directory resource");
        }
        Ok(ManagedDirectory {
            permissions: plan.permissions.clone(),
            ..prior.clone()
        })
    }

    /// Removes the outermost directory this resource created. A directory
    /// that already existed at create time is left alone.
    pub fn delete(&self, state: &ManagedDirectory) -> ProvisionResult<()> {
        self.backend.delete(&state.top_created_segment)?;
        debug!(path = %state.path, removed = %state.top_created_segment, "Deleted directory resource");
        Ok(())
    }
}
