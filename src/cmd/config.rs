//! Configuration view and validation commands: `repobuild config`.

use anyhow::Result;
use repobuild::config::{CONFIG_FILE_NAME, RepobuildToml, find_config_file};
use std::path::PathBuf;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Repobuild Configuration");
            println!("=======================");
            println!();

            let (toml, path) = RepobuildToml::load_or_default(cli.config.as_deref())?;
            match &path {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No {} found, using defaults.", CONFIG_FILE_NAME);
                    println!("Run 'repobuild config init' to create one.");
                }
            }
            println!();
            print_toml(&toml);

            println!("Effective values (with env overrides):");
            let effective = toml.with_env()?;
            println!("  workspace.root = \"{}\"", effective.workspace.root.display());
            println!("  clone.program = \"{}\"", effective.clone.program);
            println!("  build.program = \"{}\"", effective.build.program);
            println!("  build.jobs = {}", effective.build.jobs);
            println!(
                "  pool.workers = {}",
                match effective.pool.workers {
                    0 => "auto (one per CPU core)".to_string(),
                    n => n.to_string(),
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let Some(path) = find_config_file(cli.config.as_deref())? else {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            };

            let toml = RepobuildToml::load(&path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            RepobuildToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [workspace] root");
            println!("  - [clone] / [build] programs, descriptor and jobs");
            println!("  - [pool] workers, isolation, cpu_budget");
            println!();
        }
    }

    Ok(())
}

fn print_toml(toml: &RepobuildToml) {
    println!("[workspace]");
    println!("  root = \"{}\"", toml.workspace.root.display());
    println!();
    println!("[clone]");
    println!("  program = \"{}\"", toml.clone.program);
    println!();
    println!("[build]");
    println!("  program = \"{}\"", toml.build.program);
    println!("  descriptor = \"{}\"", toml.build.descriptor);
    println!("  jobs = {}", toml.build.jobs);
    println!();
    println!("[pool]");
    println!("  workers = {}", toml.pool.workers);
    println!("  isolation = \"{}\"", toml.pool.isolation);
    println!("  cpu_budget = {}", toml.pool.cpu_budget);
    println!();
    println!("[limits]");
    println!("  command_timeout_secs = {}", toml.limits.command_timeout_secs);
    println!();
}
