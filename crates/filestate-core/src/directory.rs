//! Recursive directory creation that records what it created.
//!
//! The outermost created segment is the unit of teardown: removing it
//! recursively removes everything this resource made and nothing that
//! existed before.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::backend::{EntryKind, PathSegments};
use crate::error::{ProvisionError, ProvisionResult};

/// Creates `path` and every missing parent with `mode`.
///
/// Returns the created directories outermost first. An existing directory
/// yields an empty list; an existing non-directory anywhere on the path is a
/// [`ProvisionError::Conflict`].
pub fn ensure_path<S>(segments: &S, path: &Path, mode: u32) -> ProvisionResult<Vec<PathBuf>>
where
    S: PathSegments + ?Sized,
{
    match segments.probe(path)? {
        Some(EntryKind::Directory) => return Ok(Vec::new()),
        Some(EntryKind::File) => {
            return Err(ProvisionError::Conflict {
                path: path.to_path_buf(),
            })
        }
        None => {}
    }

    // Walk upwards until an existing ancestor; `parent()` strictly shortens
    // the path, and the root always counts as existing.
    let mut missing = vec![path.to_path_buf()];
    let mut current = path;
    while let Some(parent) = current.parent() {
        if is_root(parent) {
            break;
        }
        match segments.probe(parent)? {
            Some(EntryKind::Directory) => break,
            Some(EntryKind::File) => {
                return Err(ProvisionError::Conflict {
                    path: parent.to_path_buf(),
                })
            }
            None => {
                missing.push(parent.to_path_buf());
                current = parent;
            }
        }
    }

    let mut created = Vec::with_capacity(missing.len());
    for segment in missing.into_iter().rev() {
        if let Err(e) = segments.make_segment(&segment, mode) {
            roll_back(segments, &created);
            return Err(e);
        }
        debug!(path = %segment.display(), mode = format_args!("{:o}", mode), "Created directory segment");
        created.push(segment);
    }
    Ok(created)
}

// Innermost first, so each removal sees an empty directory.
fn roll_back<S>(segments: &S, created: &[PathBuf])
where
    S: PathSegments + ?Sized,
{
    for segment in created.iter().rev() {
        match segments.remove_segment(segment) {
            Ok(()) => debug!(path = %segment.display(), "Rolled back directory segment"),
            Err(e) => warn!(path = %segment.display(), error = %e, "Failed to roll back directory segment"),
        }
    }
}

fn is_root(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new(".") || path.parent().is_none()
}

/// Outermost directory from an [`ensure_path`] result.
pub fn top_created_segment(created: &[PathBuf]) -> Option<String> {
    created
        .first()
        .map(|segment| segment.to_string_lossy().into_owned())
}
