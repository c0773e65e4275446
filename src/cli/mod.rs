use std::env;
use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, Command, DiskCommand};
use crate::cli::commands::{api, backup, cleanup, disk, exit_for_error, status};
use crate::types::RunMode;

const CONFIG_FILE: &str = "/etc/snapcycle.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod args;
pub mod commands;

pub fn run() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.verbose);
    tracing::debug!("snapcycle {}", VERSION);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| Command::Backup(cli.backup.clone()));

    let outcome = match command {
        Command::Backup(args) => {
            let run_mode = RunMode {
                dry_run: args.dry_run,
                verbose: cli.verbose,
            };
            backup::run_backup_command(&config_path, args.forced(), run_mode)
        }
        Command::Status => status::run_status(&config_path),
        Command::Cleanup(args) => cleanup::run_cleanup(&config_path, args.dry_run),
        Command::Disk { command } => match command {
            DiskCommand::Scan => disk::run_scan(&config_path),
            DiskCommand::Provision(args) => disk::run_provision(&config_path, &args),
        },
        Command::TestApi => api::run_test_api(&config_path),
    };
    if let Err(err) = outcome {
        exit_for_error(&err);
    }
    Ok(())
}

fn parse_cli() -> Cli {
    let raw: Vec<String> = env::args().collect();
    match Cli::try_parse_from(preprocess_args(raw)) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => std::process::exit(0),
                _ => std::process::exit(2),
            }
        }
    }
}

/// Maps the flag-style invocations (`--status`, `--scan-disks`, ...) onto subcommands.
fn preprocess_args(raw: Vec<String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut command: Vec<String> = Vec::new();
    let mut iter = raw.into_iter();
    if let Some(bin) = iter.next() {
        out.push(bin);
    }
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--status" => command = vec!["status".to_string()],
            "--cleanup" => command = vec!["cleanup".to_string()],
            "--cleanup-dry-run" => command = vec!["cleanup".to_string(), "--dry-run".to_string()],
            "--scan-disks" => command = vec!["disk".to_string(), "scan".to_string()],
            "--test-api" => command = vec!["test-api".to_string()],
            "--init-disk" => {
                command = vec!["disk".to_string(), "provision".to_string()];
                if let Some(mount) = iter.next() {
                    command.push("--mount".to_string());
                    command.push(mount);
                }
                if let Some(id) = iter.next() {
                    command.push("--disk-id".to_string());
                    command.push(id);
                }
            }
            _ => out.push(arg),
        }
    }
    if command.is_empty() {
        return out;
    }
    // global options stay valid after the subcommand
    let bin = out.remove(0);
    let mut args = vec![bin];
    args.extend(command);
    args.extend(out);
    args
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
