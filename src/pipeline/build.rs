//! Build stage: run the project's clean + build cycle.

use crate::pipeline::command::{self, CommandOutcome};
use crate::pipeline::outcome::StageOutcome;
use crate::repo::LocalName;
use crate::workspace::Workspace;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Failure text for a working copy with no build descriptor.
pub const DESCRIPTOR_NOT_FOUND: &str = "build descriptor not found";

#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, name: &LocalName) -> StageOutcome;
}

/// Builder driving a Makefile-style tool: `<program> clean`, then
/// `<program> -j<jobs>`.
#[derive(Debug, Clone)]
pub struct MakeBuildRunner {
    workspace: Workspace,
    program: String,
    descriptor: String,
    jobs: usize,
    timeout: Option<Duration>,
}

impl MakeBuildRunner {
    pub fn new(
        workspace: Workspace,
        program: impl Into<String>,
        descriptor: impl Into<String>,
        jobs: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            workspace,
            program: program.into(),
            descriptor: descriptor.into(),
            jobs: jobs.max(1),
            timeout,
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    async fn run_step(&self, args: &[String], project_dir: &std::path::Path) -> CommandOutcome {
        command::run_captured(&self.program, args, project_dir, self.timeout).await
    }
}

#[async_trait]
impl Builder for MakeBuildRunner {
    async fn build(&self, name: &LocalName) -> StageOutcome {
        let project_dir = self.workspace.path_for(name);
        if !project_dir.join(&self.descriptor).is_file() {
            return StageOutcome::failed(DESCRIPTOR_NOT_FOUND);
        }

        let clean = self.run_step(&["clean".to_string()], &project_dir).await;
        if !clean.is_success() {
            warn!(local_name = %name, "clean step failed, skipping build");
            return StageOutcome::Failed(clean.failure_message(&self.program));
        }

        let build = self
            .run_step(&[format!("-j{}", self.jobs)], &project_dir)
            .await;
        match build {
            CommandOutcome::Success { .. } => {
                info!(local_name = %name, "compiled");
                StageOutcome::Succeeded
            }
            other => StageOutcome::Failed(other.failure_message(&self.program)),
        }
    }
}
