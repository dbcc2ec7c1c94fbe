//! The repository build pipeline.
//!
//! ```text
//! WorkerPool::run(urls)
//!   └─ partition ─┬─ worker 0: PipelineStage over chunk 0 ─┐
//!                 ├─ worker 1: ...                          ├─ mpsc ─> RunReport
//!                 └─ worker N: ...                          ┘
//! PipelineStage: Fetch (GitFetcher) → Build (MakeBuildRunner) → Clean (FilesystemJanitor)
//! ```

pub mod build;
pub mod command;
pub mod fetch;
pub mod janitor;
pub mod outcome;
pub mod partition;
pub mod pool;
pub mod stage;
pub mod worker;

#[cfg(test)]
mod testing;

pub use build::{Builder, MakeBuildRunner};
pub use fetch::{Fetcher, GitFetcher};
pub use janitor::{Cleaner, FilesystemJanitor};
pub use outcome::{BuildStatus, RepositoryReport, RunReport, RunSummary, Stage, StageOutcome};
pub use pool::{PoolEvent, TaskLauncher, WorkerLauncher, WorkerPool};
pub use stage::{PipelineStage, RepositoryProcessor};
pub use worker::{ProcessLauncher, WorkerAssignment, WorkerMessage};
