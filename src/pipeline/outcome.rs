//! Stage outcomes and the reports built from them.
//!
//! A `StageOutcome` is produced once per stage execution and never mutated.
//! A `RepositoryReport` is the ordered list of those outcomes for one URL,
//! and a `RunReport` maps every processed URL to its report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Message recorded in place of Build/Clean when Fetch did not succeed.
pub const SKIPPED_AFTER_CLONE_ERROR: &str = "skipping build/clean due to clone error";

/// One of the three sequential steps applied to a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Build,
    Clean,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Build => write!(f, "build"),
            Stage::Clean => write!(f, "clean"),
        }
    }
}

/// Resolved result of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum StageOutcome {
    Skipped,
    Succeeded,
    Failed(String),
}

impl StageOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A stage paired with its outcome: one line of a repository report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

impl StageRecord {
    pub fn new(stage: Stage, outcome: StageOutcome) -> Self {
        Self { stage, outcome }
    }
}

impl fmt::Display for StageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.outcome, self.stage) {
            (StageOutcome::Failed(message), _) => f.write_str(message),
            (StageOutcome::Skipped, _) => f.write_str(SKIPPED_AFTER_CLONE_ERROR),
            (StageOutcome::Succeeded, Stage::Fetch) => f.write_str("cloned successfully"),
            (StageOutcome::Succeeded, Stage::Build) => f.write_str("compiled successfully"),
            (StageOutcome::Succeeded, Stage::Clean) => f.write_str("removed working copy"),
        }
    }
}

/// Ordered stage records for one repository. Grows by append only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryReport {
    records: Vec<StageRecord>,
}

impl RepositoryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage, outcome: StageOutcome) {
        self.records.push(StageRecord::new(stage, outcome));
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Human-readable lines, one per record.
    pub fn lines(&self) -> Vec<String> {
        self.records.iter().map(ToString::to_string).collect()
    }

    pub fn outcome_of(&self, stage: Stage) -> Option<&StageOutcome> {
        self.records
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }

    /// Compile status as the grading sheet shows it.
    pub fn build_status(&self) -> BuildStatus {
        match self.outcome_of(Stage::Build) {
            Some(StageOutcome::Succeeded) => BuildStatus::Compiled,
            Some(StageOutcome::Failed(_)) => BuildStatus::CompilationError,
            Some(StageOutcome::Skipped) | None => BuildStatus::NotBuilt,
        }
    }

    fn extend(&mut self, other: RepositoryReport) {
        self.records.extend(other.records);
    }
}

/// Per-repository compile status consumed by the reporting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Compiled,
    CompilationError,
    NotBuilt,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Compiled => write!(f, "Compiled Successfully"),
            BuildStatus::CompilationError => write!(f, "Compilation Error"),
            BuildStatus::NotBuilt => write!(f, "Not Built"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub url: String,
    pub report: RepositoryReport,
}

/// Mapping from repository URL to its report, populated by append only.
///
/// Entries keep first-arrival order; use [`RunReport::ordered_by`] to view
/// them in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RunReportData")]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    entries: Vec<RunEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Serialized shape of a [`RunReport`]; the lookup index is rebuilt on load.
#[derive(Deserialize)]
struct RunReportData {
    run_id: uuid::Uuid,
    started_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    entries: Vec<RunEntry>,
}

impl From<RunReportData> for RunReport {
    fn from(data: RunReportData) -> Self {
        let mut report = Self {
            run_id: data.run_id,
            started_at: data.started_at,
            finished_at: data.finished_at,
            entries: data.entries,
            index: HashMap::new(),
        };
        report.reindex();
        report
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add `report` under `url`. An existing entry is extended, never replaced.
    pub fn append(&mut self, url: impl Into<String>, report: RepositoryReport) {
        let url = url.into();
        match self.index.get(&url) {
            Some(&i) => self.entries[i].report.extend(report),
            None => {
                self.index.insert(url.clone(), self.entries.len());
                self.entries.push(RunEntry { url, report });
            }
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn get(&self, url: &str) -> Option<&RepositoryReport> {
        self.index.get(url).map(|&i| &self.entries[i].report)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RunEntry] {
        &self.entries
    }

    /// Compile status for `url`; `None` means the run never reported it.
    pub fn build_status(&self, url: &str) -> Option<BuildStatus> {
        self.get(url).map(RepositoryReport::build_status)
    }

    /// Input URLs with no entry: lost to a worker crash, not failed.
    pub fn missing<'a>(&self, inputs: &'a [String]) -> Vec<&'a str> {
        inputs
            .iter()
            .filter(|url| !self.contains(url))
            .map(String::as_str)
            .collect()
    }

    /// Entries in the order of `inputs`, skipping URLs without an entry.
    pub fn ordered_by<'a>(&'a self, inputs: &'a [String]) -> Vec<&'a RunEntry> {
        inputs
            .iter()
            .filter_map(|url| self.index.get(url).map(|&i| &self.entries[i]))
            .collect()
    }

    pub fn summary(&self, inputs: &[String]) -> RunSummary {
        let mut summary = RunSummary {
            total: inputs.len(),
            ..Default::default()
        };
        for url in inputs {
            match self.build_status(url) {
                Some(BuildStatus::Compiled) => summary.compiled += 1,
                Some(BuildStatus::CompilationError) => summary.compilation_errors += 1,
                Some(BuildStatus::NotBuilt) => summary.not_built += 1,
                None => summary.missing += 1,
            }
        }
        summary
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.url.clone(), i))
            .collect();
    }
}

/// Status counts over a run's inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub compiled: usize,
    pub compilation_errors: usize,
    pub not_built: usize,
    pub missing: usize,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }
}
