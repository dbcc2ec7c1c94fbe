//! The workspace root: the single directory every clone lives under.

use crate::errors::WorkspaceError;
use crate::repo::LocalName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validated, canonical workspace root.
///
/// Construct it once at startup with [`Workspace::prepare`]; afterwards it is
/// read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the root if it is missing, then resolve it to a canonical
    /// directory path.
    pub fn prepare(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let path = path.as_ref();
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|source| WorkspaceError::CreateFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let root = path
            .canonicalize()
            .map_err(|source| WorkspaceError::ResolveFailed {
                path: path.to_path_buf(),
                source,
            })?;

        if !root.is_dir() {
            return Err(WorkspaceError::NotADirectory(root));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a repository's working copy. `LocalName` is a single
    /// validated segment, so the result is always a direct child of the root.
    pub fn path_for(&self, name: &LocalName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Whether a working copy (or anything else) already occupies `name`.
    /// Dangling symlinks count as occupied.
    pub fn is_occupied(&self, name: &LocalName) -> bool {
        std::fs::symlink_metadata(self.path_for(name)).is_ok()
    }
}
