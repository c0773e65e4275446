use std::path::Path;

use chrono::Local;

use crate::cli::args::ProvisionArgs;
use crate::config::load::load_config;
use crate::disk::locator::{select_best, DiskLocator};
use crate::error::Result;
use crate::journal::RunLog;
use crate::util::format::human_size;

pub fn run_scan(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let locator = DiskLocator::from_config(&cfg)?;
    let log = RunLog::new(Local::now().format("%Y%m%d%H%M%S").to_string());
    for line in scan_lines(&locator, &log) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per connected known disk; the backup target is starred.
pub fn scan_lines(locator: &DiskLocator, log: &RunLog) -> Vec<String> {
    let disks = locator.scan(log);
    let best = match select_best(&disks) {
        Some(best) => best,
        None => return vec!["no configured backup disk connected".to_string()],
    };
    disks
        .iter()
        .map(|disk| {
            let marker = if disk.mount_point == best.mount_point { "*" } else { " " };
            format!(
                "{} {} ({}) at {}: {} free of {}",
                marker,
                disk.identity.id,
                disk.identity.name,
                disk.mount_point.display(),
                human_size(disk.free_bytes),
                human_size(disk.total_bytes)
            )
        })
        .collect()
}

pub fn run_provision(config_path: &Path, args: &ProvisionArgs) -> Result<()> {
    let cfg = load_config(config_path)?;
    let locator = DiskLocator::from_config(&cfg)?;
    let log = RunLog::new(Local::now().format("%Y%m%d%H%M%S").to_string());
    let marker = locator.provision(&args.mount, &args.disk_id, args.force, &log)?;
    println!("disk {} provisioned ({})", args.disk_id, marker.display());
    Ok(())
}
