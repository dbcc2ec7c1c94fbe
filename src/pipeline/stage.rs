//! Per-repository sequencer: Fetch → Build → Clean.
//!
//! ```text
//! START -> FETCH
//! FETCH success -> BUILD -> CLEAN -> END     (Clean runs whatever Build did)
//! FETCH failure -> SKIPPED -> END
//! ```

use crate::config::PipelineSettings;
use crate::pipeline::build::{Builder, MakeBuildRunner};
use crate::pipeline::fetch::{Fetcher, GitFetcher};
use crate::pipeline::janitor::{Cleaner, FilesystemJanitor};
use crate::pipeline::outcome::{RepositoryReport, Stage, StageOutcome};
use crate::repo::RepositoryRef;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns one repository URL into its report. Implementations never fail:
/// every problem is recorded in the returned report.
#[async_trait]
pub trait RepositoryProcessor: Send + Sync {
    async fn process(&self, url: &str) -> RepositoryReport;
}

/// The production processor, wiring a fetcher, builder and cleaner together.
#[derive(Clone)]
pub struct PipelineStage {
    fetcher: Arc<dyn Fetcher>,
    builder: Arc<dyn Builder>,
    cleaner: Arc<dyn Cleaner>,
}

impl PipelineStage {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        builder: Arc<dyn Builder>,
        cleaner: Arc<dyn Cleaner>,
    ) -> Self {
        Self {
            fetcher,
            builder,
            cleaner,
        }
    }

    /// Build the git/make/filesystem pipeline described by `settings`.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let workspace = settings.workspace.clone();
        let fetcher = GitFetcher::new(
            workspace.clone(),
            settings.clone_program.clone(),
            settings.command_timeout,
        );
        let builder = MakeBuildRunner::new(
            workspace.clone(),
            settings.build_program.clone(),
            settings.build_descriptor.clone(),
            settings.build_jobs,
            settings.command_timeout,
        );
        let cleaner = FilesystemJanitor::new(workspace);
        Self::new(Arc::new(fetcher), Arc::new(builder), Arc::new(cleaner))
    }
}

#[async_trait]
impl RepositoryProcessor for PipelineStage {
    async fn process(&self, url: &str) -> RepositoryReport {
        let mut report = RepositoryReport::new();

        let repo = match RepositoryRef::parse(url) {
            Ok(repo) => repo,
            Err(e) => {
                warn!(url, error = %e, "rejected repository reference");
                report.push(
                    Stage::Fetch,
                    StageOutcome::Failed(format!("invalid repository reference: {}", e)),
                );
                report.push(Stage::Build, StageOutcome::Skipped);
                return report;
            }
        };

        info!(url, "processing");
        let fetched = self.fetcher.fetch(&repo).await;
        let cloned = fetched.is_success();
        report.push(Stage::Fetch, fetched);

        if !cloned {
            report.push(Stage::Build, StageOutcome::Skipped);
            return report;
        }

        let built = self.builder.build(repo.local_name()).await;
        report.push(Stage::Build, built);

        // Clean runs after every successful clone, whatever Build returned.
        let cleaned = self.cleaner.remove(repo.local_name()).await;
        if let StageOutcome::Failed(message) = &cleaned {
            warn!(url, error = %message, "cleanup incomplete");
        }
        report.push(Stage::Clean, cleaned);

        report
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{CallLog, stage};
    use super::*;
    use crate::pipeline::outcome::SKIPPED_AFTER_CLONE_ERROR;

    #[tokio::test]
    async fn test_success_runs_all_three_stages_once() {
        let log = Arc::new(CallLog::default());
        let stage = stage(&log, vec![], vec![]);

        let report = stage.process("https://host/org/pa1-team2.git").await;
        assert_eq!(
            report.lines(),
            vec!["cloned successfully", "compiled successfully", "removed working copy"]
        );
        for s in [Stage::Fetch, Stage::Build, Stage::Clean] {
            assert_eq!(log.count(s, "pa1-team2"), 1);
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_build_and_clean() {
        let log = Arc::new(CallLog::default());
        let stage = stage(&log, vec!["pa1-team1"], vec![]);

        let report = stage.process("https://host/org/pa1-team1.git").await;
        assert_eq!(
            report.lines(),
            vec!["directory already exists", SKIPPED_AFTER_CLONE_ERROR]
        );
        assert_eq!(log.count(Stage::Build, "pa1-team1"), 0);
        assert_eq!(log.count(Stage::Clean, "pa1-team1"), 0);
    }

    #[tokio::test]
    async fn test_build_failure_still_cleans() {
        let log = Arc::new(CallLog::default());
        let stage = stage(&log, vec![], vec!["broken"]);

        let report = stage.process("https://host/org/broken.git").await;
        assert_eq!(report.len(), 3);
        assert!(report.outcome_of(Stage::Build).unwrap().is_failure());
        assert_eq!(log.count(Stage::Clean, "broken"), 1);
    }

    #[tokio::test]
    async fn test_invalid_reference_never_reaches_fetcher() {
        let log = Arc::new(CallLog::default());
        let stage = stage(&log, vec![], vec![]);

        let report = stage.process("https://host/org/..").await;
        assert_eq!(report.len(), 2);
        assert!(report.lines()[0].starts_with("invalid repository reference"));
        assert!(log.calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_stage_clone_without_descriptor_still_cleans() {
        use crate::pipeline::testing::write_script;
        use crate::workspace::Workspace;
        use tempfile::tempdir;

        let tools = tempdir().unwrap();
        let git = write_script(
            tools.path(),
            "git",
            "#!/bin/sh\nname=$(basename \"$3\" .git)\nmkdir \"$name\" && touch \"$name/README\"\n",
        );
        let root = tempdir().unwrap();
        let settings = PipelineSettings {
            workspace: Workspace::prepare(root.path()).unwrap(),
            clone_program: git.to_string_lossy().into_owned(),
            ..PipelineSettings::for_tests()
        };

        let report = PipelineStage::from_settings(&settings)
            .process("https://host/org/no-makefile.git")
            .await;
        assert_eq!(
            report.lines(),
            vec![
                "cloned successfully",
                "build descriptor not found",
                "removed working copy"
            ]
        );
        assert!(!root.path().join("no-makefile").exists());
    }
}
