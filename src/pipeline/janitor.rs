//! Clean stage: best-effort recursive removal of a working copy.
//!
//! Version-control tooling leaves read-only files behind. Each entry whose
//! removal fails with a permission error gets the owner write bit restored on
//! it and on its parent inside the working copy, then is retried exactly
//! once. A second failure is remembered, and removal carries on with the rest
//! of the tree. The workspace root's own permissions are never changed.

use crate::pipeline::outcome::StageOutcome;
use crate::repo::LocalName;
use crate::workspace::Workspace;
use async_trait::async_trait;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[async_trait]
pub trait Cleaner: Send + Sync {
    async fn remove(&self, name: &LocalName) -> StageOutcome;
}

/// Removes working copies from the workspace root.
#[derive(Debug, Clone)]
pub struct FilesystemJanitor {
    workspace: Workspace,
}

impl FilesystemJanitor {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Synchronous removal; [`Cleaner::remove`] runs this on the blocking pool.
    pub fn remove_blocking(&self, name: &LocalName) -> StageOutcome {
        let target = self.workspace.path_for(name);

        let meta = match std::fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            // Nothing to clean is not distinguished from success here.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return StageOutcome::Succeeded,
            Err(e) => return StageOutcome::Failed(removal_failure(&target, &e)),
        };

        // A symlink is removed itself; its target is outside our ownership.
        if !meta.is_dir() {
            return match remove_with_retry(&target, false, &target) {
                Ok(()) => StageOutcome::Succeeded,
                Err(e) => StageOutcome::Failed(removal_failure(&target, &e)),
            };
        }

        let mut first_error: Option<String> = None;
        for entry in WalkDir::new(&target).follow_links(false).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(&target).to_path_buf();
                    let err = io::Error::other(e.to_string());
                    record(&mut first_error, &path, &err);
                    continue;
                }
            };

            let is_dir = entry.file_type().is_dir();
            if let Err(e) = remove_with_retry(entry.path(), is_dir, &target) {
                record(&mut first_error, entry.path(), &e);
            }
        }

        match first_error {
            None => {
                debug!(local_name = %name, "removed working copy");
                StageOutcome::Succeeded
            }
            Some(message) => StageOutcome::Failed(message),
        }
    }
}

#[async_trait]
impl Cleaner for FilesystemJanitor {
    async fn remove(&self, name: &LocalName) -> StageOutcome {
        let janitor = self.clone();
        let name = name.clone();
        match tokio::task::spawn_blocking(move || janitor.remove_blocking(&name)).await {
            Ok(outcome) => outcome,
            Err(e) => StageOutcome::Failed(format!("cleanup task failed: {}", e)),
        }
    }
}

fn record(first_error: &mut Option<String>, path: &Path, err: &io::Error) {
    warn!(path = %path.display(), error = %err, "failed to remove entry");
    if first_error.is_none() {
        *first_error = Some(removal_failure(path, err));
    }
}

fn removal_failure(path: &Path, err: &io::Error) -> String {
    format!("Failed to delete {}: {}", path.display(), err)
}

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Remove one entry; on a permission error make it and its parent writable
/// and try exactly one more time. Only paths under `target` are touched.
fn remove_with_retry(path: &Path, is_dir: bool, target: &Path) -> io::Result<()> {
    match remove_entry(path, is_dir) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            clear_readonly(path);
            if let Some(parent) = path.parent().filter(|p| p.starts_with(target)) {
                clear_readonly(parent);
            }
            remove_entry(path, is_dir)
        }
        other => other,
    }
}

#[cfg(unix)]
fn clear_readonly(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    let mode = perms.mode();
    if mode & 0o200 == 0 {
        perms.set_mode(mode | 0o200);
        if let Err(e) = std::fs::set_permissions(path, perms) {
            debug!(path = %path.display(), error = %e, "could not restore owner write bit");
        }
    }
}

#[cfg(not(unix))]
fn clear_readonly(path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        if let Err(e) = std::fs::set_permissions(path, perms) {
            debug!(path = %path.display(), error = %e, "could not clear read-only flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populated(workspace: &Workspace, name: &str) -> LocalName {
        let name = LocalName::new(name).unwrap();
        let dir = workspace.path_for(&name);
        std::fs::create_dir_all(dir.join(".git/objects/ab")).unwrap();
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("Makefile"), "all:\n").unwrap();
        std::fs::write(dir.join("src/main.cpp"), "int main(){}").unwrap();
        std::fs::write(dir.join(".git/objects/ab/cdef"), "blob").unwrap();
        name
    }

    #[test]
    fn test_remove_tree() {
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "pa1-team1");
        let janitor = FilesystemJanitor::new(workspace.clone());

        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
        assert!(!workspace.path_for(&name).exists());
        assert!(workspace.root().exists());
    }

    #[test]
    fn test_remove_read_only_files() {
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "readonly");
        let object = workspace.path_for(&name).join(".git/objects/ab/cdef");
        let mut perms = std::fs::metadata(&object).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&object, perms).unwrap();

        let janitor = FilesystemJanitor::new(workspace.clone());
        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
        assert!(!workspace.path_for(&name).exists());
    }

    #[test]
    fn test_remove_absent_is_success_and_idempotent() {
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "twice");
        let janitor = FilesystemJanitor::new(workspace);

        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
    }

    #[test]
    fn test_remove_leaves_siblings() {
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let gone = populated(&workspace, "gone");
        let kept = populated(&workspace, "gone-but-not-this");
        let janitor = FilesystemJanitor::new(workspace.clone());

        janitor.remove_blocking(&gone);
        assert!(workspace.path_for(&kept).join("Makefile").exists());
    }

    #[cfg(unix)]
    fn running_as_root() -> bool {
        // SAFETY: geteuid has no preconditions.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_removed_on_retry() {
        if running_as_root() {
            return;
        }
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "locked");
        let pack = workspace.path_for(&name).join(".git/objects/pack");
        std::fs::create_dir(&pack).unwrap();
        std::fs::write(pack.join("pack-1.idx"), "idx").unwrap();
        set_mode(&pack, 0o555);

        let janitor = FilesystemJanitor::new(workspace.clone());
        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
        assert!(!workspace.path_for(&name).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_retry_reports_and_keeps_going() {
        use std::os::unix::fs::PermissionsExt;

        if running_as_root() {
            return;
        }
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "stuck");
        let target = workspace.path_for(&name);
        // The working copy itself cannot be unlinked from a read-only root,
        // and the root is never made writable.
        set_mode(workspace.root(), 0o555);

        let janitor = FilesystemJanitor::new(workspace.clone());
        let outcome = janitor.remove_blocking(&name);
        let mode = std::fs::metadata(workspace.root()).unwrap().permissions().mode();
        set_mode(workspace.root(), 0o755);

        match outcome {
            StageOutcome::Failed(message) => {
                assert!(message.starts_with("Failed to delete"));
                assert!(message.contains("stuck"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(mode & 0o777, 0o555);
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_retry_grants_owner_write_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let file = dir.path().join("object");
        std::fs::write(&file, "blob").unwrap();
        set_mode(&file, 0o444);

        clear_readonly(&file);
        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_target_survives() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("precious"), "keep").unwrap();

        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "linked");
        std::os::unix::fs::symlink(outside.path(), workspace.path_for(&name).join("escape"))
            .unwrap();

        let janitor = FilesystemJanitor::new(workspace.clone());
        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
        assert!(outside.path().join("precious").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_root_symlink_removes_only_link() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("precious"), "keep").unwrap();

        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = LocalName::new("sneaky").unwrap();
        std::os::unix::fs::symlink(outside.path(), workspace.path_for(&name)).unwrap();

        let janitor = FilesystemJanitor::new(workspace.clone());
        assert_eq!(janitor.remove_blocking(&name), StageOutcome::Succeeded);
        assert!(std::fs::symlink_metadata(workspace.path_for(&name)).is_err());
        assert!(outside.path().join("precious").exists());
    }

    #[tokio::test]
    async fn test_async_remove() {
        let root = tempdir().unwrap();
        let workspace = Workspace::prepare(root.path()).unwrap();
        let name = populated(&workspace, "async");
        let janitor = FilesystemJanitor::new(workspace.clone());

        assert_eq!(janitor.remove(&name).await, StageOutcome::Succeeded);
        assert!(!workspace.path_for(&name).exists());
    }
}
