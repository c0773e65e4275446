use std::path::Path;

use chrono::Local;

use crate::backup::imaging::SnapshotCommand;
use crate::backup::log_dir;
use crate::backup::orchestrator::BackupOrchestrator;
use crate::backup::retention::CleanupReport;
use crate::cli::commands::select_target;
use crate::config::load::load_config;
use crate::config::model::RuntimeConfig;
use crate::disk::locator::DiskLocator;
use crate::error::Result;
use crate::journal::RunLog;
use crate::util::format::human_size;

pub fn run_cleanup(config_path: &Path, dry_run: bool) -> Result<()> {
    let cfg = load_config(config_path)?;
    let log = RunLog::new(Local::now().format("%Y%m%d%H%M%S").to_string());
    let locator = DiskLocator::from_config(&cfg)?;
    let report = cleanup(&cfg, &locator, dry_run, &log)?;

    let verb = if report.dry_run { "would free" } else { "freed" };
    println!(
        "{} of {} cycle(s) removed, {} file(s), {} {}",
        report.deleted_cycles,
        report.total_cycles,
        report.deleted_files,
        verb,
        human_size(report.freed_bytes)
    );
    for err in &report.errors {
        println!("  {}", err);
    }
    Ok(())
}

/// Applies retention on the selected disk without running a backup.
pub fn cleanup(cfg: &RuntimeConfig, locator: &DiskLocator, dry_run: bool, log: &RunLog) -> Result<CleanupReport> {
    let disk = select_target(locator, log)?;
    if !dry_run {
        if let Err(err) = log.attach_dir(&log_dir(&disk.base_path, &cfg.log_dir)) {
            log.warning(format!("session log disabled: {}", err));
        }
    }
    let tool = SnapshotCommand::new(cfg.imaging.clone());
    let orchestrator = BackupOrchestrator::new(cfg, &disk, &tool, locator.probe())?;
    let state = orchestrator.load_state(log);
    let retention = orchestrator.retention(&state);
    let decision = retention.plan(orchestrator.cycles());
    let report = retention.execute(&decision, dry_run, log);
    if !dry_run {
        if let Err(err) = log.save_json(&report) {
            log.warning(format!("session log not saved: {}", err));
        }
    }
    Ok(report)
}
