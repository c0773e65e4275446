use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::BackupType;

#[derive(Parser, Debug)]
#[command(name = "snapcycle", version, about = "Rotating full/differential disk-image backups")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the implicit `backup` command.
    #[command(flatten)]
    pub backup: BackupArgs,

    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a full or differential backup, chosen automatically unless forced.
    Backup(BackupArgs),
    /// Show chain position, next backup type, cycles and disk space.
    Status,
    /// Delete cycles beyond the retention count.
    Cleanup(CleanupArgs),
    Disk {
        #[command(subcommand)]
        command: DiskCommand,
    },
    /// Upload a placeholder summary to the configured endpoint.
    TestApi,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DiskCommand {
    /// List connected disks that carry a configured identity.
    Scan,
    /// Write a disk identity marker onto a mounted volume.
    Provision(ProvisionArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BackupArgs {
    #[arg(long, short = 'f', conflicts_with = "differential")]
    pub full: bool,
    #[arg(long, short = 'd')]
    pub differential: bool,
    #[arg(long)]
    pub dry_run: bool,
}

impl BackupArgs {
    pub fn forced(&self) -> Option<BackupType> {
        if self.full {
            Some(BackupType::Full)
        } else if self.differential {
            Some(BackupType::Differential)
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CleanupArgs {
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    #[arg(long)]
    pub mount: PathBuf,
    #[arg(long)]
    pub disk_id: String,
    #[arg(long)]
    pub force: bool,
}
