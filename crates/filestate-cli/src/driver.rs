//! Refresh, plan, apply and destroy over a manifest and a state store.

use filestate_core::{
    plan, Action, ContentSnapshotEngine, DirectoryBackend, DirectoryEngine, FileBackend,
    FileEngine, FileSnapshotEngine, ProvisionResult, ReadOutcome, SecretSource,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{DriverError, DriverResult};
use crate::resource::Resource;
use crate::state::{State, StateStore};

/// One planned step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    /// Resource address.
    pub address: String,
    /// Resource kind.
    pub kind: &'static str,
    /// What apply would do.
    pub action: Action,
}

/// Counts of what an apply or destroy did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Resources created.
    pub created: usize,
    /// Resources updated in place.
    pub updated: usize,
    /// Resources deleted then recreated.
    pub replaced: usize,
    /// Resources deleted.
    pub deleted: usize,
    /// Resources already converged.
    pub unchanged: usize,
}

/// Dispatches each resource to its engine.
///
/// All engines share one backend and one secret source.
pub struct Driver<'a, B, S> {
    files: FileEngine<&'a B, &'a S>,
    directories: DirectoryEngine<&'a B>,
    file_snapshots: FileSnapshotEngine<&'a B>,
    snapshots: ContentSnapshotEngine,
}

impl<'a, B, S> Driver<'a, B, S>
where
    B: FileBackend + DirectoryBackend,
    S: SecretSource,
{
    /// Driver over `backend`, reading environment keys from `secrets`.
    pub fn new(backend: &'a B, secrets: &'a S) -> Self {
        Self {
            files: FileEngine::new(backend, secrets),
            directories: DirectoryEngine::new(backend),
            file_snapshots: FileSnapshotEngine::new(backend),
            snapshots: ContentSnapshotEngine::new(),
        }
    }

    fn read(&self, prior: &Resource) -> ProvisionResult<ReadOutcome<Resource>> {
        Ok(match prior {
            Resource::File(r) => wrap(self.files.read(r)?, Resource::File),
            Resource::Directory(r) => wrap(self.directories.read(r)?, Resource::Directory),
            Resource::FileSnapshot(r) => wrap(self.file_snapshots.read(r)?, Resource::FileSnapshot),
            Resource::Snapshot(r) => wrap(self.snapshots.read(r)?, Resource::Snapshot),
        })
    }

    fn create(&self, declared: &Resource) -> ProvisionResult<Resource> {
        Ok(match declared {
            Resource::File(r) => Resource::File(self.files.create(r)?),
            Resource::Directory(r) => Resource::Directory(self.directories.create(r)?),
            Resource::FileSnapshot(r) => Resource::FileSnapshot(self.file_snapshots.create(r)?),
            Resource::Snapshot(r) => Resource::Snapshot(self.snapshots.create(r)?),
        })
    }

    // Only reached for matching kinds; a kind change plans as Replace.
    fn update(&self, declared: &Resource, prior: &Resource) -> ProvisionResult<Resource> {
        match (declared, prior) {
            (Resource::File(d), Resource::File(p)) => Ok(Resource::File(self.files.update(d, p)?)),
            (Resource::Directory(d), Resource::Directory(p)) => {
                Ok(Resource::Directory(self.directories.update(d, p)?))
            }
            (Resource::FileSnapshot(d), Resource::FileSnapshot(p)) => {
                Ok(Resource::FileSnapshot(self.file_snapshots.update(d, p)?))
            }
            (Resource::Snapshot(d), Resource::Snapshot(p)) => {
                Ok(Resource::Snapshot(self.snapshots.update(d, p)?))
            }
            _ => {
                self.delete(prior)?;
                self.create(declared)
            }
        }
    }

    fn delete(&self, prior: &Resource) -> ProvisionResult<()> {
        match prior {
            Resource::File(r) => self.files.delete(r),
            Resource::Directory(r) => self.directories.delete(r),
            Resource::FileSnapshot(r) => self.file_snapshots.delete(r),
            Resource::Snapshot(r) => self.snapshots.delete(r),
        }
    }

    /// Refreshes every record in `state` against reality, returning the
    /// addresses dropped because their resource vanished.
    pub fn refresh(&self, state: &mut State) -> DriverResult<Vec<String>> {
        let mut removed = Vec::new();
        let addresses: Vec<String> = state.resources.keys().cloned().collect();
        for address in addresses {
            let Some(prior) = state.resources.get(&address) else {
                continue;
            };
            match self
                .read(prior)
                .map_err(|e| DriverError::resource(&address, e))?
            {
                ReadOutcome::Present(record) => {
                    state.resources.insert(address, record);
                }
                ReadOutcome::Removed => {
                    info!(address = %address, "Resource vanished, dropping from state");
                    state.resources.remove(&address);
                    removed.push(address);
                }
            }
        }
        Ok(removed)
    }

    /// Actions apply would take: deletes first, then declared resources
    /// in creation order.
    pub fn plan(&self, declared: &[(String, Resource)], state: &State) -> Vec<PlannedChange> {
        let mut changes: Vec<PlannedChange> = orphans(declared, state)
            .into_iter()
            .map(|(address, prior)| PlannedChange {
                address: address.clone(),
                kind: prior.kind(),
                action: Action::Delete,
            })
            .collect();

        for (address, resource) in declared {
            let action = decide(resource, state.resources.get(address));
            changes.push(PlannedChange {
                address: address.clone(),
                kind: resource.kind(),
                action,
            });
        }
        changes
    }

    /// Converges reality and state to `declared`, saving after every step.
    pub fn apply(
        &self,
        declared: &[(String, Resource)],
        state: &mut State,
        store: &StateStore,
    ) -> DriverResult<ApplyReport> {
        let mut report = ApplyReport::default();

        let doomed: Vec<(String, Resource)> = orphans(declared, state)
            .into_iter()
            .map(|(a, r)| (a.clone(), r.clone()))
            .collect();
        for (address, prior) in doomed {
            self.delete(&prior)
                .map_err(|e| DriverError::resource(&address, e))?;
            state.resources.remove(&address);
            store.save(state)?;
            info!(address = %address, kind = prior.kind(), "Deleted");
            report.deleted += 1;
        }

        for (address, resource) in declared {
            let prior = state.resources.get(address).cloned();
            let action = decide(resource, prior.as_ref());
            let record = match (action, prior.as_ref()) {
                (Action::Create, _) => Some(self.create(resource)),
                (Action::Update, Some(prior)) => Some(self.update(resource, prior)),
                (Action::Replace, Some(prior)) => {
                    // State never keeps a record whose resource is gone.
                    self.delete(prior)
                        .map_err(|e| DriverError::resource(address, e))?;
                    state.resources.remove(address);
                    store.save(state)?;
                    Some(self.create(resource))
                }
                _ => None,
            };
            let Some(record) = record else {
                debug!(address = %address, "Already converged");
                report.unchanged += 1;
                continue;
            };
            let record = record.map_err(|e| DriverError::resource(address, e))?;
            state.resources.insert(address.clone(), record);
            store.save(state)?;
            info!(address = %address, kind = resource.kind(), %action, "Applied");
            match action {
                Action::Create => report.created += 1,
                Action::Update => report.updated += 1,
                Action::Replace => report.replaced += 1,
                _ => {}
            }
        }
        Ok(report)
    }

    /// Deletes every recorded resource, newest kinds first.
    pub fn destroy(&self, state: &mut State, store: &StateStore) -> DriverResult<ApplyReport> {
        let mut report = ApplyReport::default();
        let doomed: Vec<(String, Resource)> = orphans(&[], state)
            .into_iter()
            .map(|(a, r)| (a.clone(), r.clone()))
            .collect();
        for (address, prior) in doomed {
            self.delete(&prior)
                .map_err(|e| DriverError::resource(&address, e))?;
            state.resources.remove(&address);
            store.save(state)?;
            info!(address = %address, kind = prior.kind(), "Destroyed");
            report.deleted += 1;
        }
        Ok(report)
    }
}

fn wrap<T>(outcome: ReadOutcome<T>, into: impl FnOnce(T) -> Resource) -> ReadOutcome<Resource> {
    match outcome {
        ReadOutcome::Present(record) => ReadOutcome::Present(into(record)),
        ReadOutcome::Removed => ReadOutcome::Removed,
    }
}

fn decide(declared: &Resource, prior: Option<&Resource>) -> Action {
    let Some(prior) = prior else {
        return Action::Create;
    };
    match (declared, prior) {
        (Resource::File(d), Resource::File(p)) => plan(Some(d), Some(p)),
        (Resource::Directory(d), Resource::Directory(p)) => plan(Some(d), Some(p)),
        (Resource::FileSnapshot(d), Resource::FileSnapshot(p)) => plan(Some(d), Some(p)),
        (Resource::Snapshot(d), Resource::Snapshot(p)) => plan(Some(d), Some(p)),
        _ => Action::Replace,
    }
}

/// Recorded resources no longer declared, in deletion order.
fn orphans<'s>(declared: &[(String, Resource)], state: &'s State) -> Vec<(&'s String, &'s Resource)> {
    let mut out: Vec<_> = state
        .resources
        .iter()
        .filter(|(address, _)| !declared.iter().any(|(a, _)| a == *address))
        .collect();
    out.sort_by(|(a1, r1), (a2, r2)| r2.rank().cmp(&r1.rank()).then_with(|| a2.cmp(a1)));
    out
}
