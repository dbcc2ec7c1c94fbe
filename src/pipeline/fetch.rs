//! Fetch stage: clone one repository into the workspace root.

use crate::pipeline::command::{self, CommandOutcome};
use crate::pipeline::janitor::{Cleaner, FilesystemJanitor};
use crate::pipeline::outcome::StageOutcome;
use crate::repo::RepositoryRef;
use crate::workspace::Workspace;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Failure text for a working copy that is already on disk.
pub const DIRECTORY_EXISTS: &str = "directory already exists";

/// Clones a repository into the workspace. Never errors: every failure is
/// returned as a `StageOutcome::Failed`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, repo: &RepositoryRef) -> StageOutcome;
}

/// Fetcher backed by the `git clone` command line.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    workspace: Workspace,
    program: String,
    timeout: Option<Duration>,
}

impl GitFetcher {
    pub fn new(workspace: Workspace, program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            workspace,
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(&self, repo: &RepositoryRef) -> StageOutcome {
        let name = repo.local_name();

        // A directory left by an earlier run, or by another worker cloning a
        // repository with the same name, is terminal for this repository.
        if self.workspace.is_occupied(name) {
            debug!(url = repo.url(), local_name = %name, "working copy already present");
            return StageOutcome::failed(DIRECTORY_EXISTS);
        }

        // The URL is the only positional argument; the clone tool names the
        // target directory the same way `LocalName` does.
        let args = vec!["clone".to_string(), "--".to_string(), repo.url().to_string()];
        let outcome =
            command::run_captured(&self.program, &args, self.workspace.root(), self.timeout).await;

        match outcome {
            CommandOutcome::Success { .. } => {
                info!(url = repo.url(), local_name = %name, "cloned");
                StageOutcome::Succeeded
            }
            timed_out @ CommandOutcome::TimedOut { .. } => {
                // The directory was free before the clone, so whatever is
                // there now is the killed clone's partial working copy.
                let janitor = FilesystemJanitor::new(self.workspace.clone());
                if let StageOutcome::Failed(message) = janitor.remove(name).await {
                    warn!(url = repo.url(), local_name = %name, error = %message, "partial clone left behind");
                }
                StageOutcome::Failed(timed_out.failure_message(&self.program))
            }
            other => StageOutcome::Failed(other.failure_message(&self.program)),
        }
    }
}
