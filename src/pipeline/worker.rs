//! Out-of-process workers.
//!
//! The parent runs its own executable with the hidden `worker` subcommand,
//! writes one JSON [`WorkerAssignment`] to the child's stdin and reads
//! newline-delimited [`WorkerMessage`]s from its stdout. Child logs go to
//! stderr, which is inherited.

use crate::config::PipelineSettings;
use crate::errors::PoolError;
use crate::pipeline::outcome::RepositoryReport;
use crate::pipeline::pool::{WorkerExit, WorkerLauncher, WorkerResult};
use crate::pipeline::stage::{PipelineStage, RepositoryProcessor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

/// Everything a child worker needs, sent as a single JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub worker_id: usize,
    pub settings: PipelineSettings,
    pub urls: Vec<String>,
}

/// One line of worker output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Entry {
        url: String,
        report: RepositoryReport,
    },
    Done {
        processed: usize,
    },
}

/// Launches each partition as a child process.
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    settings: PipelineSettings,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, settings: PipelineSettings) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            settings,
        }
    }

    /// The currently running executable.
    pub fn current_exe(settings: PipelineSettings) -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate own executable")?;
        Ok(Self::new(program, settings))
    }

    /// Extra arguments placed before the `worker` subcommand, e.g. logging flags.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        worker: usize,
        urls: Vec<String>,
        results: mpsc::Sender<WorkerResult>,
    ) -> Result<JoinHandle<WorkerExit>, PoolError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PoolError::WorkerSpawn { worker, source })?;

        let assignment = WorkerAssignment {
            worker_id: worker,
            settings: self.settings.clone(),
            urls,
        };
        let payload = serde_json::to_vec(&assignment).map_err(|e| PoolError::Assignment {
            worker,
            message: e.to_string(),
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| PoolError::Assignment {
            worker,
            message: "stdin not captured".to_string(),
        })?;
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| PoolError::Assignment {
                worker,
                message: e.to_string(),
            })?;
        stdin.shutdown().await.map_err(|e| PoolError::Assignment {
            worker,
            message: e.to_string(),
        })?;
        drop(stdin);

        let stdout = child.stdout.take().ok_or_else(|| PoolError::Protocol {
            worker,
            message: "stdout not captured".to_string(),
        })?;

        Ok(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut reported = 0;
            let mut done = None;
            let mut protocol_error = None;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<WorkerMessage>(&line) {
                        Ok(WorkerMessage::Entry { url, report }) => {
                            reported += 1;
                            if results
                                .send(WorkerResult {
                                    worker,
                                    url,
                                    report,
                                })
                                .await
                                .is_err()
                            {
                                protocol_error = Some("result collector closed".to_string());
                                break;
                            }
                        }
                        Ok(WorkerMessage::Done { processed }) => done = Some(processed),
                        Err(e) => {
                            warn!(worker, error = %e, "malformed worker output");
                            protocol_error = Some(format!("malformed output: {}", e));
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        protocol_error = Some(format!("failed to read output: {}", e));
                        break;
                    }
                }
            }

            // Unread output is discarded; the child is killed on drop if
            // it is still running.
            if protocol_error.is_some() {
                child.start_kill().ok();
            }
            let status = child.wait().await;

            match (protocol_error, status, done) {
                (Some(reason), _, _) => WorkerExit::Crashed { reason },
                (None, Err(e), _) => WorkerExit::Crashed {
                    reason: format!("failed to wait for worker: {}", e),
                },
                (None, Ok(status), _) if !status.success() => WorkerExit::Crashed {
                    reason: match status.code() {
                        Some(code) => format!("worker exited with status {}", code),
                        None => "worker was terminated by a signal".to_string(),
                    },
                },
                (None, Ok(_), None) => WorkerExit::Crashed {
                    reason: format!("worker stopped after {} entries without finishing", reported),
                },
                (None, Ok(_), Some(processed)) => WorkerExit::Completed { processed },
            }
        }))
    }
}

/// Child side: read an assignment from `input`, process it and stream
/// results to `output`. Returns the number of repositories processed.
pub async fn run_worker<R, W>(mut input: R, output: W) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .await
        .context("Failed to read worker assignment")?;
    let assignment: WorkerAssignment =
        serde_json::from_str(&raw).context("Invalid worker assignment")?;

    let stage = PipelineStage::from_settings(&assignment.settings);
    let worker = assignment.worker_id;
    serve(assignment.worker_id, &assignment.urls, &stage, output)
        .instrument(info_span!("worker", worker))
        .await
}

/// Process `urls` in order, writing one `Entry` line per URL and a final
/// `Done` line.
pub async fn serve<W>(
    worker: usize,
    urls: &[String],
    processor: &dyn RepositoryProcessor,
    mut output: W,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    debug!(worker, urls = urls.len(), "worker accepted assignment");
    let mut processed = 0;
    for url in urls {
        let report = processor.process(url).await;
        write_message(
            &mut output,
            &WorkerMessage::Entry {
                url: url.clone(),
                report,
            },
        )
        .await?;
        processed += 1;
    }
    write_message(&mut output, &WorkerMessage::Done { processed }).await?;
    Ok(processed)
}

async fn write_message<W>(output: &mut W, message: &WorkerMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(message).context("Failed to encode worker message")?;
    line.push(b'\n');
    output
        .write_all(&line)
        .await
        .context("Failed to write worker message")?;
    output.flush().await.context("Failed to flush worker output")?;
    Ok(())
}
