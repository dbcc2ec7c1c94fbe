//! Typed error hierarchy for repobuild.
//!
//! Three enums cover the places where something can go wrong *outside* a
//! single repository's stages:
//! - `RepoRefError`: a URL that cannot be turned into a safe local name
//! - `WorkspaceError`: the workspace root cannot be used
//! - `PoolError`: worker infrastructure failures
//!
//! Per-repository clone/build/clean failures are never errors; they are
//! recorded as `StageOutcome::Failed` values in the run report.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from parsing a repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoRefError {
    #[error("repository URL is empty")]
    Empty,

    #[error("repository URL '{url}' looks like a command-line option")]
    OptionLike { url: String },

    #[error("repository URL '{url}' yields an unusable directory name '{name}'")]
    InvalidLocalName { url: String, name: String },
}

/// Errors from preparing the workspace root.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace root at {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve workspace root {path}: {source}")]
    ResolveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace root {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Errors from the worker pool. None of these describe a repository's
/// stage outcome; they mean the pool itself could not do its job.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to start worker {worker}: {source}")]
    WorkerSpawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to hand assignment to worker {worker}: {message}")]
    Assignment { worker: usize, message: String },

    #[error("Worker {worker} protocol error: {message}")]
    Protocol { worker: usize, message: String },
}
