//! Configuration for repobuild.
//!
//! Settings come from `repobuild.toml`, then environment variables, then
//! CLI flags, each layer overriding the one before.
//!
//! # Configuration File Format
//!
//! ```toml
//! [workspace]
//! root = "workspace"
//!
//! [clone]
//! program = "git"
//!
//! [build]
//! program = "make"
//! descriptor = "Makefile"
//! jobs = 6
//!
//! [pool]
//! workers = 0          # 0 = one per CPU core
//! isolation = "process"
//! cpu_budget = 0       # 0 = twice the core count
//!
//! [limits]
//! command_timeout_secs = 0   # 0 = wait forever
//! ```

use crate::pipeline::partition::{default_cpu_budget, effective_build_jobs, resolve_worker_count};
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "repobuild.toml";

/// How workers are isolated from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// One OS process per partition (default)
    #[default]
    Process,
    /// One async task per partition inside this process
    Task,
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isolation::Process => write!(f, "process"),
            Isolation::Task => write!(f, "task"),
        }
    }
}

impl std::str::FromStr for Isolation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" => Ok(Isolation::Process),
            "task" => Ok(Isolation::Task),
            _ => anyhow::bail!("Invalid isolation '{}'. Valid values: process, task", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSection {
    /// Directory every clone is created under
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneSection {
    #[serde(default = "default_clone_program")]
    pub program: String,
}

fn default_clone_program() -> String {
    "git".to_string()
}

impl Default for CloneSection {
    fn default() -> Self {
        Self {
            program: default_clone_program(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default = "default_build_program")]
    pub program: String,
    /// File that must exist in the working copy before building
    #[serde(default = "default_build_descriptor")]
    pub descriptor: String,
    /// Fixed parallelism hint passed to the build step
    #[serde(default = "default_build_jobs")]
    pub jobs: usize,
}

fn default_build_program() -> String {
    "make".to_string()
}

fn default_build_descriptor() -> String {
    "Makefile".to_string()
}

fn default_build_jobs() -> usize {
    6
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            descriptor: default_build_descriptor(),
            jobs: default_build_jobs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSection {
    /// Worker count; 0 means one per CPU core
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub isolation: Isolation,
    /// Upper bound on workers x build jobs; 0 means twice the core count
    #[serde(default)]
    pub cpu_budget: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Kill clone/build commands after this many seconds; 0 disables
    #[serde(default)]
    pub command_timeout_secs: u64,
}

/// The complete repobuild.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepobuildToml {
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub clone: CloneSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub limits: LimitsSection,
}

impl RepobuildToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse repobuild.toml")
    }

    /// Load the file found by [`find_config_file`], or defaults when there is none.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match find_config_file(explicit)? {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize repobuild.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(root) = std::env::var("REPOBUILD_WORKSPACE") {
            self.workspace.root = PathBuf::from(root);
        }
        if let Ok(program) = std::env::var("GIT_CMD") {
            self.clone.program = program;
        }
        if let Ok(program) = std::env::var("MAKE_CMD") {
            self.build.program = program;
        }
        if let Ok(workers) = std::env::var("REPOBUILD_WORKERS") {
            self.pool.workers = workers
                .parse()
                .with_context(|| format!("REPOBUILD_WORKERS is not a number: {}", workers))?;
        }
        if let Ok(jobs) = std::env::var("REPOBUILD_BUILD_JOBS") {
            self.build.jobs = jobs
                .parse()
                .with_context(|| format!("REPOBUILD_BUILD_JOBS is not a number: {}", jobs))?;
        }
        Ok(self)
    }

    /// Apply CLI overrides on top of file and environment values.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(root) = &overrides.workspace {
            self.workspace.root = root.clone();
        }
        if let Some(workers) = overrides.workers {
            self.pool.workers = workers;
        }
        if let Some(jobs) = overrides.jobs {
            self.build.jobs = jobs;
        }
        if let Some(isolation) = overrides.isolation {
            self.pool.isolation = isolation;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.limits.command_timeout_secs = secs;
        }
        self
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workspace.root.as_os_str().is_empty() {
            warnings.push("workspace.root is empty".to_string());
        }
        if self.clone.program.trim().is_empty() {
            warnings.push("clone.program is empty".to_string());
        }
        if self.build.program.trim().is_empty() {
            warnings.push("build.program is empty".to_string());
        }
        if self.build.descriptor.trim().is_empty() || self.build.descriptor.contains(['/', '\\']) {
            warnings.push(format!(
                "build.descriptor '{}' should be a plain file name",
                self.build.descriptor
            ));
        }
        if self.build.jobs == 0 {
            warnings.push("build.jobs = 0 will be treated as 1".to_string());
        }
        if self.pool.cpu_budget != 0 && self.pool.cpu_budget < self.pool.workers {
            warnings.push(format!(
                "pool.cpu_budget ({}) is below pool.workers ({}); builds will run with -j1",
                self.pool.cpu_budget, self.pool.workers
            ));
        }

        warnings
    }

    /// Resolve into runtime settings. Prepares (and validates) the workspace
    /// root; call once at startup.
    pub fn resolve(&self) -> Result<PipelineSettings> {
        let workspace = Workspace::prepare(&self.workspace.root)
            .context("Workspace root is not usable")?;

        let workers = resolve_worker_count(Some(self.pool.workers));
        let cpu_budget = match self.pool.cpu_budget {
            0 => default_cpu_budget(),
            n => n,
        };
        let build_jobs = effective_build_jobs(self.build.jobs, workers, cpu_budget);
        let command_timeout = match self.limits.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(PipelineSettings {
            workspace,
            clone_program: resolve_program(&self.clone.program)?,
            build_program: resolve_program(&self.build.program)?,
            build_descriptor: self.build.descriptor.clone(),
            build_jobs,
            workers,
            isolation: self.pool.isolation,
            command_timeout,
        })
    }
}

/// Anchor a relative tool path like `./tools/git` to the invocation
/// directory. Commands run with the workspace or project directory as their
/// cwd, so a relative path would otherwise resolve there. Bare names are left
/// for `PATH` lookup.
fn resolve_program(program: &str) -> Result<String> {
    let path = Path::new(program);
    if path.is_absolute() || path.components().count() < 2 {
        return Ok(program.to_string());
    }
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve program path: {}", program))?;
    Ok(absolute.to_string_lossy().into_owned())
}

/// Values given on the command line, all optional.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workspace: Option<PathBuf>,
    pub workers: Option<usize>,
    pub jobs: Option<usize>,
    pub isolation: Option<Isolation>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one run. Serialisable so the pool can hand
/// it to out-of-process workers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub workspace: Workspace,
    pub clone_program: String,
    pub build_program: String,
    pub build_descriptor: String,
    /// Effective build parallelism after applying the CPU budget
    pub build_jobs: usize,
    pub workers: usize,
    pub isolation: Isolation,
    pub command_timeout: Option<Duration>,
}

impl PipelineSettings {
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            workspace: Workspace::prepare(std::env::temp_dir()).unwrap(),
            clone_program: default_clone_program(),
            build_program: default_build_program(),
            build_descriptor: default_build_descriptor(),
            build_jobs: 2,
            workers: 2,
            isolation: Isolation::Task,
            command_timeout: None,
        }
    }
}

/// Locate the config file: an explicit path (which must exist), then
/// `./repobuild.toml`, then `<config dir>/repobuild/config.toml`.
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(dir) = dirs::config_dir() {
        let user = dir.join("repobuild").join("config.toml");
        if user.is_file() {
            return Ok(Some(user));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let toml = RepobuildToml::default();
        assert_eq!(toml.workspace.root, PathBuf::from("workspace"));
        assert_eq!(toml.clone.program, "git");
        assert_eq!(toml.build.program, "make");
        assert_eq!(toml.build.descriptor, "Makefile");
        assert_eq!(toml.build.jobs, 6);
        assert_eq!(toml.pool.workers, 0);
        assert_eq!(toml.pool.isolation, Isolation::Process);
        assert_eq!(toml.limits.command_timeout_secs, 0);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml = RepobuildToml::parse(
            r#"
[workspace]
root = "/srv/myApps"

[build]
jobs = 4

[pool]
isolation = "task"
"#,
        )
        .unwrap();
        assert_eq!(toml.workspace.root, PathBuf::from("/srv/myApps"));
        assert_eq!(toml.build.jobs, 4);
        assert_eq!(toml.build.program, "make");
        assert_eq!(toml.pool.isolation, Isolation::Task);
    }

    #[test]
    fn test_parse_rejects_unknown_isolation() {
        assert!(RepobuildToml::parse("[pool]\nisolation = \"threads\"\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut toml = RepobuildToml::default();
        toml.build.jobs = 3;
        toml.save(&path).unwrap();

        let loaded = RepobuildToml::load(&path).unwrap();
        assert_eq!(loaded.build.jobs, 3);
    }

    #[test]
    fn test_cli_overrides_win() {
        let overrides = CliOverrides {
            workspace: Some(PathBuf::from("/tmp/ws")),
            workers: Some(3),
            jobs: Some(2),
            isolation: Some(Isolation::Task),
            timeout_secs: Some(600),
        };
        let toml = RepobuildToml::default().with_overrides(&overrides);
        assert_eq!(toml.workspace.root, PathBuf::from("/tmp/ws"));
        assert_eq!(toml.pool.workers, 3);
        assert_eq!(toml.build.jobs, 2);
        assert_eq!(toml.pool.isolation, Isolation::Task);
        assert_eq!(toml.limits.command_timeout_secs, 600);
    }

    #[test]
    fn test_resolve_prepares_workspace_and_budget() {
        let dir = tempdir().unwrap();
        let mut toml = RepobuildToml::default();
        toml.workspace.root = dir.path().join("apps");
        toml.pool.workers = 4;
        toml.pool.cpu_budget = 8;
        toml.build.jobs = 6;
        toml.limits.command_timeout_secs = 30;

        let settings = toml.resolve().unwrap();
        assert!(dir.path().join("apps").is_dir());
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.build_jobs, 2);
        assert_eq!(settings.command_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_resolve_rejects_file_as_workspace() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "").unwrap();
        let mut toml = RepobuildToml::default();
        toml.workspace.root = file;
        assert!(toml.resolve().is_err());
    }

    #[test]
    fn test_resolve_anchors_relative_program_paths() {
        let dir = tempdir().unwrap();
        let mut toml = RepobuildToml::default();
        toml.workspace.root = dir.path().join("apps");
        toml.clone.program = "./tools/git".to_string();
        toml.build.program = "make".to_string();

        let settings = toml.resolve().unwrap();
        let clone = PathBuf::from(&settings.clone_program);
        assert!(clone.is_absolute());
        assert!(clone.ends_with("tools/git"));
        assert!(clone.starts_with(std::env::current_dir().unwrap()));
        assert_eq!(settings.build_program, "make");
    }

    #[test]
    fn test_validate_warnings() {
        let mut toml = RepobuildToml::default();
        toml.build.descriptor = "sub/Makefile".to_string();
        toml.build.jobs = 0;
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_isolation_from_str() {
        assert_eq!("PROCESS".parse::<Isolation>().unwrap(), Isolation::Process);
        assert_eq!("task".parse::<Isolation>().unwrap(), Isolation::Task);
        assert!("fork".parse::<Isolation>().is_err());
    }

    #[test]
    fn test_find_config_file_explicit_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(find_config_file(Some(&missing)).is_err());
    }

    #[test]
    fn test_settings_serde_roundtrip() {
        let settings = PipelineSettings::for_tests();
        let json = serde_json::to_string(&settings).unwrap();
        let back: PipelineSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
