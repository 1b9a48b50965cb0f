//! Convergence planning: declared record versus prior state.
//!
//! Each record type names the fields that can only change by replacement
//! and the fields that can be updated in place. Live reality enters through
//! the engines' `read`, which refreshes the prior record before planning.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{same_mode, ContentSnapshot, FileSnapshot, ManagedDirectory, ManagedFile};

/// What the driver must do to converge one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Declared but not in state.
    Create,
    /// Present in both; an in-place field changed.
    Update,
    /// Present in both; a replace-forcing field changed. Delete then Create.
    Replace,
    /// Present in both with nothing to do, or absent from both.
    NoOp,
    /// In state but no longer declared.
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::NoOp => "no-op",
            Action::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Result of refreshing a record against live reality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// The resource exists; the record reflects what was observed.
    Present(T),
    /// The resource vanished externally; drop it from state.
    Removed,
}

impl<T> ReadOutcome<T> {
    /// The refreshed record, if the resource still exists.
    pub fn into_present(self) -> Option<T> {
        match self {
            ReadOutcome::Present(record) => Some(record),
            ReadOutcome::Removed => None,
        }
    }
}

/// Field classification for one record type.
pub trait Reconcile {
    /// Resource kind, used in logs.
    const KIND: &'static str;

    /// True if moving from `prior` to `self` needs a fresh resource.
    fn requires_replacement(&self, prior: &Self) -> bool;

    /// True if any in-place updatable field differs.
    fn differs(&self, prior: &Self) -> bool;
}

/// Decides the action for one address.
pub fn plan<T: Reconcile>(declared: Option<&T>, prior: Option<&T>) -> Action {
    let action = match (declared, prior) {
        (None, None) => Action::NoOp,
        (Some(_), None) => Action::Create,
        (None, Some(_)) => Action::Delete,
        (Some(declared), Some(prior)) => {
            if declared.requires_replacement(prior) {
                Action::Replace
            } else if declared.differs(prior) {
                Action::Update
            } else {
                Action::NoOp
            }
        }
    };
    debug!(kind = T::KIND, %action, "Planned resource action");
    action
}

impl Reconcile for ManagedFile {
    const KIND: &'static str = "file";

    fn requires_replacement(&self, prior: &Self) -> bool {
        // Unprotected records never persist a key.
        self.protected != prior.protected
            || (self.protected && self.secret_key != prior.secret_key)
    }

    // Unprotected identifiers are always derived, so only a protected
    // declaration carries an identifier worth comparing.
    fn differs(&self, prior: &Self) -> bool {
        self.name != prior.name
            || self.directory != prior.directory
            || self.contents != prior.contents
            || !same_mode(&self.permissions, &prior.permissions)
            || (self.protected && self.identifier != prior.identifier)
    }
}

impl Reconcile for ManagedDirectory {
    const KIND: &'static str = "directory";

    fn requires_replacement(&self, prior: &Self) -> bool {
        self.path != prior.path
    }

    fn differs(&self, prior: &Self) -> bool {
        !same_mode(&self.permissions, &prior.permissions)
    }
}

impl Reconcile for FileSnapshot {
    const KIND: &'static str = "file_snapshot";

    fn requires_replacement(&self, prior: &Self) -> bool {
        self.name != prior.name
            || self.directory != prior.directory
            || self.compress != prior.compress
    }

    fn differs(&self, prior: &Self) -> bool {
        self.trigger != prior.trigger
    }
}

impl Reconcile for ContentSnapshot {
    const KIND: &'static str = "snapshot";

    fn requires_replacement(&self, _prior: &Self) -> bool {
        false
    }

    fn differs(&self, prior: &Self) -> bool {
        self.contents != prior.contents || self.trigger != prior.trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_drives_create_and_delete() {
        let file = ManagedFile::new("a", "x");
        assert_eq!(plan(Some(&file), None), Action::Create);
        assert_eq!(plan(None, Some(&file)), Action::Delete);
        assert_eq!(plan::<ManagedFile>(None, None), Action::NoOp);
    }

    #[test]
    fn unprotected_file_ignores_derived_identifier() {
        let declared = ManagedFile::new("a", "x");
        let mut prior = declared.clone();
        prior.identifier = "derived-at-create".to_string();
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::NoOp);
    }

    #[test]
    fn file_content_and_mode_update_in_place() {
        let prior = ManagedFile::new("a", "x");
        let declared = ManagedFile::new("a", "y");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::Update);

        let declared = ManagedFile::new("a", "x").with_permissions("644");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::Update);

        let declared = ManagedFile::new("a", "x").with_permissions("600");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::NoOp);

        let declared = ManagedFile::new("b", "x").in_directory("elsewhere");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::Update);
    }

    #[test]
    fn file_protection_change_replaces() {
        let prior = ManagedFile::new("a", "x");
        let declared = ManagedFile::new("a", "x").protected_by("abc");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::Replace);

        let prior = ManagedFile::new("a", "x").protected_by("abc");
        let declared = prior.clone().with_secret_key("k");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::Replace);
    }

    #[test]
    fn unprotected_key_is_not_compared() {
        let prior = ManagedFile::new("a", "x");
        let declared = ManagedFile::new("a", "x").with_secret_key("k");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::NoOp);
    }

    #[test]
    fn protected_identifier_change_updates() {
        let prior = ManagedFile::new("a", "x").protected_by("abc");
        let declared = ManagedFile::new("a", "x").protected_by("def");
        assert_eq!(plan(Some(&declared), Some(&prior)), Action::Update);
    }

    #[test]
    fn directory_rules() {
        let prior = ManagedDirectory::new("a/b");
        assert_eq!(
            plan(Some(&ManagedDirectory::new("a/c")), Some(&prior)),
            Action::Replace
        );
        assert_eq!(
            plan(
                Some(&ManagedDirectory::new("a/b").with_permissions("0755")),
                Some(&prior)
            ),
            Action::Update
        );
        let mut stored = prior.clone();
        stored.identifier = "id".to_string();
        stored.top_created_segment = "a".to_string();
        assert_eq!(
            plan(Some(&ManagedDirectory::new("a/b")), Some(&stored)),
            Action::NoOp
        );
    }

    #[test]
    fn file_snapshot_rules() {
        let mut prior = FileSnapshot::new("src", "t1");
        prior.artifact = "frozen".to_string();
        prior.identifier = "id".to_string();

        assert_eq!(
            plan(Some(&FileSnapshot::new("src", "t1")), Some(&prior)),
            Action::NoOp
        );
        assert_eq!(
            plan(Some(&FileSnapshot::new("src", "t2")), Some(&prior)),
            Action::Update
        );
        assert_eq!(
            plan(
                Some(&FileSnapshot::new("src", "t1").compressed(true)),
                Some(&prior)
            ),
            Action::Replace
        );
        assert_eq!(
            plan(
                Some(&FileSnapshot::new("src", "t1").in_directory("other")),
                Some(&prior)
            ),
            Action::Replace
        );
    }

    #[test]
    fn content_snapshot_never_replaces() {
        let prior = ContentSnapshot::new("a", "t1");
        assert_eq!(
            plan(Some(&ContentSnapshot::new("b", "t1")), Some(&prior)),
            Action::Update
        );
        assert_eq!(
            plan(Some(&ContentSnapshot::new("a", "t2")), Some(&prior)),
            Action::Update
        );
        assert_eq!(
            plan(Some(&ContentSnapshot::new("a", "t1")), Some(&prior)),
            Action::NoOp
        );
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::NoOp.to_string(), "no-op");
        assert_eq!(Action::Replace.to_string(), "replace");
    }
}
