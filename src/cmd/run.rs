//! Pool execution: `repobuild run <LIST>`.

use anyhow::{Context, Result};
use repobuild::config::{CliOverrides, Isolation, PipelineSettings, RepobuildToml};
use repobuild::input::{filter_by_prefix, load_repository_list};
use repobuild::pipeline::{
    PipelineStage, PoolEvent, ProcessLauncher, TaskLauncher, WorkerLauncher, WorkerPool,
};
use repobuild::ui::{RunProgress, print_summary};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::super::{Cli, RunArgs};

pub async fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut urls = load_repository_list(&args.list)?;
    if let Some(prefix) = &args.prefix {
        urls = filter_by_prefix(urls, prefix);
    }
    if urls.is_empty() {
        println!("No repositories to build.");
        return Ok(());
    }

    let overrides = CliOverrides {
        workspace: args.workspace.clone(),
        workers: args.workers,
        jobs: args.jobs,
        isolation: args.isolation,
        timeout_secs: args.timeout,
    };
    let (toml, config_path) = RepobuildToml::load_or_default(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded configuration");
    }
    let toml = toml.with_env()?.with_overrides(&overrides);
    for warning in toml.validate() {
        warn!("{}", warning);
    }
    let settings = toml.resolve()?;

    info!(
        repositories = urls.len(),
        workers = settings.workers,
        build_jobs = settings.build_jobs,
        isolation = %settings.isolation,
        workspace = %settings.workspace.root().display(),
        "starting run"
    );

    let launcher = build_launcher(cli, &settings)?;

    let (event_tx, mut event_rx) = mpsc::channel::<PoolEvent>(100);
    let progress = RunProgress::new(urls.len() as u64, cli.verbose);
    let ui_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            progress.handle_event(&event);
        }
        progress.finish();
    });

    let pool = WorkerPool::new(settings.workers).with_event_channel(event_tx);
    let result = pool.run(&urls, launcher.as_ref()).await;
    drop(pool);
    ui_task.await.ok();

    let report = result.context("Worker pool failed")?;
    print_summary(&report, &urls);

    if let Some(path) = &args.output {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    let missing = report.missing(&urls).len();
    if missing > 0 {
        anyhow::bail!(
            "{} of {} repositories have no result; the run is incomplete",
            missing,
            urls.len()
        );
    }

    Ok(())
}

fn build_launcher(cli: &Cli, settings: &PipelineSettings) -> Result<Box<dyn WorkerLauncher>> {
    match settings.isolation {
        Isolation::Process => {
            let mut args = vec!["--log-format".to_string(), cli.log_format.to_string()];
            if cli.verbose {
                args.push("--verbose".to_string());
            }
            Ok(Box::new(
                ProcessLauncher::current_exe(settings.clone())?.with_args(args),
            ))
        }
        Isolation::Task => Ok(Box::new(TaskLauncher::new(Arc::new(
            PipelineStage::from_settings(settings),
        )))),
    }
}
