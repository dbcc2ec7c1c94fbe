use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use repobuild::config::Isolation;
use repobuild::logging::{LogFormat, LoggingConfig, init_logging};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "repobuild")]
#[command(version, about = "Clone, build and clean many repositories in parallel")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to repobuild.toml (defaults to ./repobuild.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format: text, json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every repository listed in a file
    Run(RunArgs),
    /// Process one partition sent on stdin (used by the worker pool)
    #[command(hide = true)]
    Worker,
    /// View, create or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// File with one repository URL per line
    pub list: PathBuf,

    /// Directory clones are created in
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Number of workers (default: one per CPU core)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Build parallelism per repository
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Worker isolation: process, task
    #[arg(long)]
    pub isolation: Option<Isolation>,

    /// Kill clone/build commands after this many seconds (0 = never)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Only build repositories whose directory name starts with this prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Write the run report as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default repobuild.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_flags(cli.verbose, cli.log_format));

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&cli, args).await?,
        Commands::Worker => cmd::cmd_worker().await?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
