//! Worker pool: partitions the URL list, runs one worker per partition and
//! merges every worker's results into a single `RunReport`.
//!
//! Workers never share state. Each one streams `(url, report)` pairs into a
//! single mpsc channel and the pool is the only writer of the run report.

use crate::errors::PoolError;
use crate::pipeline::outcome::{BuildStatus, RepositoryReport, RunReport};
use crate::pipeline::partition::partition;
use crate::pipeline::stage::RepositoryProcessor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RESULT_CHANNEL_CAPACITY: usize = 256;

/// One repository's report, tagged with the worker that produced it.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub worker: usize,
    pub url: String,
    pub report: RepositoryReport,
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Completed { processed: usize },
    Crashed { reason: String },
}

/// Progress events for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    WorkerStarted {
        worker: usize,
        assigned: usize,
    },
    RepositoryFinished {
        worker: usize,
        url: String,
        status: BuildStatus,
    },
    WorkerExited {
        worker: usize,
        clean: bool,
    },
}

/// Starts a worker over one partition.
///
/// The returned handle resolves once the worker is gone; results must be
/// sent through `results` before then.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(
        &self,
        worker: usize,
        urls: Vec<String>,
        results: mpsc::Sender<WorkerResult>,
    ) -> Result<JoinHandle<WorkerExit>, PoolError>;
}

/// Runs each partition as a tokio task inside this process.
pub struct TaskLauncher {
    processor: Arc<dyn RepositoryProcessor>,
}

impl TaskLauncher {
    pub fn new(processor: Arc<dyn RepositoryProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl WorkerLauncher for TaskLauncher {
    async fn launch(
        &self,
        worker: usize,
        urls: Vec<String>,
        results: mpsc::Sender<WorkerResult>,
    ) -> Result<JoinHandle<WorkerExit>, PoolError> {
        let processor = self.processor.clone();
        Ok(tokio::spawn(async move {
            let mut processed = 0;
            for url in urls {
                let report = processor.process(&url).await;
                let sent = results
                    .send(WorkerResult {
                        worker,
                        url,
                        report,
                    })
                    .await;
                if sent.is_err() {
                    return WorkerExit::Crashed {
                        reason: "result collector closed".to_string(),
                    };
                }
                processed += 1;
            }
            WorkerExit::Completed { processed }
        }))
    }
}

/// Fans a URL list out over a fixed number of workers.
pub struct WorkerPool {
    workers: usize,
    event_tx: Option<mpsc::Sender<PoolEvent>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            event_tx: None,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PoolEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every URL and return the merged report.
    ///
    /// Blocks until every started worker has exited. URLs a crashed worker
    /// never reported are absent from the result; see [`RunReport::missing`].
    pub async fn run(
        &self,
        urls: &[String],
        launcher: &dyn WorkerLauncher,
    ) -> Result<RunReport, PoolError> {
        let mut report = RunReport::new();
        let partitions = partition(urls, self.workers);
        info!(
            urls = urls.len(),
            workers = partitions.len(),
            run_id = %report.run_id,
            "starting worker pool"
        );

        let (result_tx, mut result_rx) = mpsc::channel::<WorkerResult>(RESULT_CHANNEL_CAPACITY);
        let mut handles: Vec<(usize, JoinHandle<WorkerExit>)> = Vec::new();
        let mut launch_error = None;

        for (worker, chunk) in partitions.into_iter().enumerate() {
            let assigned = chunk.len();
            match launcher.launch(worker, chunk, result_tx.clone()).await {
                Ok(handle) => {
                    debug!(worker, assigned, "worker started");
                    self.emit_event(PoolEvent::WorkerStarted { worker, assigned })
                        .await;
                    handles.push((worker, handle));
                }
                Err(e) => {
                    error!(worker, error = %e, "failed to start worker");
                    launch_error = Some(e);
                    break;
                }
            }
        }

        // The collector ends once every worker has dropped its sender.
        drop(result_tx);
        while let Some(result) = result_rx.recv().await {
            self.emit_event(PoolEvent::RepositoryFinished {
                worker: result.worker,
                url: result.url.clone(),
                status: result.report.build_status(),
            })
            .await;
            report.append(result.url, result.report);
        }

        for (worker, handle) in handles {
            let clean = match handle.await {
                Ok(WorkerExit::Completed { processed }) => {
                    debug!(worker, processed, "worker finished");
                    true
                }
                Ok(WorkerExit::Crashed { reason }) => {
                    warn!(worker, reason = %reason, "worker exited abnormally");
                    false
                }
                Err(e) => {
                    warn!(worker, error = %e, "worker task failed");
                    false
                }
            };
            self.emit_event(PoolEvent::WorkerExited { worker, clean })
                .await;
        }

        report.finish();

        if let Some(e) = launch_error {
            return Err(e);
        }

        let missing = report.missing(urls).len();
        if missing > 0 {
            warn!(missing, "some repositories were never reported");
        }
        info!(reported = report.len(), "worker pool finished");
        Ok(report)
    }

    async fn emit_event(&self, event: PoolEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}
