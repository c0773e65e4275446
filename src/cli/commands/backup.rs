use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::json;

use crate::backup::imaging::{ImagingTool, SnapshotCommand};
use crate::backup::log_dir;
use crate::backup::orchestrator::{BackupOrchestrator, BackupResult};
use crate::cli::commands::select_target;
use crate::config::load::load_config;
use crate::config::model::RuntimeConfig;
use crate::disk::locator::DiskLocator;
use crate::error::{Result, SnapcycleError};
use crate::journal::RunLog;
use crate::report::upload::ApiClient;
use crate::report::{summary_path, RunSummary, StorageSection};
use crate::types::{BackupType, RunMode};

pub fn run_backup_command(config_path: &Path, forced: Option<BackupType>, run_mode: RunMode) -> Result<()> {
    let cfg = load_config(config_path)?;
    let log = RunLog::new(Local::now().format("%Y%m%d%H%M%S").to_string());
    if run_mode.verbose {
        log.info(format!(
            "loaded config {} ({} target disk(s))",
            config_path.display(),
            cfg.target_disks.len()
        ));
    }
    let locator = DiskLocator::from_config(&cfg)?;
    let tool = SnapshotCommand::new(cfg.imaging.clone());

    let outcome = run_backup(&cfg, &locator, &tool, forced, run_mode, &log);
    if let Err(err) = &outcome {
        log.error(err.to_string());
        if !run_mode.dry_run {
            record_failure(err, &log);
        }
    }
    match outcome? {
        Some(result) if !result.success => Err(SnapcycleError::Imaging {
            exit_code: result.exit_code,
        }),
        _ => Ok(()),
    }
}

/// Persists the failure next to the session log. Without an attached log
/// directory (no disk found yet) the record goes out as a structured event.
fn record_failure(err: &SnapcycleError, log: &RunLog) -> Option<PathBuf> {
    let record = json!({ "success": false, "error": err.to_string() });
    match log.save_json(&record) {
        Ok(Some(path)) => Some(path),
        Ok(None) => {
            tracing::error!(
                session = log.session_id(),
                record = %record,
                "backup aborted before a session log directory was available"
            );
            None
        }
        Err(save_err) => {
            tracing::warn!("session log not saved: {}", save_err);
            None
        }
    }
}

/// Picks the roomiest known disk and runs (or previews) one backup on it.
///
/// Returns `None` for a dry run.
pub fn run_backup(
    cfg: &RuntimeConfig,
    locator: &DiskLocator,
    tool: &dyn ImagingTool,
    forced: Option<BackupType>,
    run_mode: RunMode,
    log: &RunLog,
) -> Result<Option<BackupResult>> {
    let disk = select_target(locator, log)?;

    if !run_mode.dry_run {
        match log.attach_dir(&log_dir(&disk.base_path, &cfg.log_dir)) {
            Ok(path) => log.info(format!("log file: {}", path.display())),
            Err(err) => log.warning(format!("session log disabled: {}", err)),
        }
    }

    let orchestrator = BackupOrchestrator::new(cfg, &disk, tool, locator.probe())?;
    if run_mode.dry_run {
        orchestrator.preview(forced, log)?;
        return Ok(None);
    }

    let result = orchestrator.run(forced, log)?;
    if let Err(err) = log.save_json(&result) {
        log.warning(format!("session log not saved: {}", err));
    }

    let storage = match orchestrator.assess_space() {
        Ok(space) => StorageSection::new(&space, orchestrator.cycles().len(), cfg.keep_cycles),
        Err(err) => {
            log.warning(format!("storage figures unavailable: {}", err));
            StorageSection::default()
        }
    };
    let summary = RunSummary::from_result(&result, &cfg.host_label, storage, log);
    let path = summary_path(&log_dir(&disk.base_path, &cfg.log_dir), log.session_id());
    match summary.save(&path) {
        Ok(()) => log.info(format!("summary saved: {}", path.display())),
        Err(err) => log.warning(format!("summary not saved: {}", err)),
    }

    if let Some(api) = &cfg.api {
        let uploaded = ApiClient::new(api.clone(), cfg.host_label.clone())
            .and_then(|client| client.post_summary(&summary));
        match uploaded {
            Ok(_) => log.success(format!("summary uploaded to {}", api.endpoint)),
            Err(err) => log.warning(format!("summary upload failed: {}", err)),
        }
    }
    Ok(Some(result))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backup::orchestrator::tests::{roomy, test_config, ScriptedTool};
    use crate::backup::STATE_FILE;
    use crate::disk::volumes::FixedVolumes;
    use crate::disk::{identities_from_config, DiskIdentity};
    use crate::error::DiskError;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn locator(cfg: &RuntimeConfig, mounts: Vec<std::path::PathBuf>) -> DiskLocator {
        let known: Vec<DiskIdentity> = identities_from_config(&cfg.target_disks).unwrap();
        DiskLocator::new(
            known,
            cfg.disk_id_filename.clone(),
            Box::new(FixedVolumes(mounts)),
            Box::new(roomy()),
        )
    }

    pub(crate) fn provisioned_mount(root: &Path) -> std::path::PathBuf {
        let mount = root.join("usb");
        fs::create_dir(&mount).unwrap();
        fs::write(mount.join(".backup_disk_id"), "disk-a\n").unwrap();
        mount
    }

    #[test]
    fn backup_writes_state_logs_and_summary() {
        let dir = TempDir::new().expect("tempdir");
        let mount = provisioned_mount(dir.path());
        let cfg = test_config(2);
        let tool = ScriptedTool::new(&[]);
        let log = RunLog::new("20260105120000");

        let result = run_backup(&cfg, &locator(&cfg, vec![mount.clone()]), &tool, None, RunMode::default(), &log)
            .unwrap()
            .expect("result");
        assert!(result.success);
        assert_eq!(result.backup_type, BackupType::Full);

        let tree = mount.join("Backups").join("testhost").join("C");
        assert!(tree.join(STATE_FILE).is_file());
        let logs = mount.join("Backups").join("logs");
        assert!(logs.join("summary_20260105120000.json").is_file());
        let names: Vec<String> = fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("backup_") && n.ends_with(".log")));
        assert!(names.iter().any(|n| n.starts_with("backup_") && n.ends_with(".json")));
    }

    #[test]
    fn dry_run_leaves_the_disk_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let mount = provisioned_mount(dir.path());
        let cfg = test_config(2);
        let tool = ScriptedTool::new(&[]);
        let log = RunLog::new("t");
        let mode = RunMode {
            dry_run: true,
            verbose: false,
        };

        let result = run_backup(&cfg, &locator(&cfg, vec![mount.clone()]), &tool, None, mode, &log).unwrap();
        assert!(result.is_none());
        assert!(tool.calls.borrow().is_empty());
        assert!(!mount.join("Backups").exists());
    }

    #[test]
    fn no_known_disk_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let cfg = test_config(2);
        let tool = ScriptedTool::new(&[]);
        let log = RunLog::new("t");
        let err = run_backup(
            &cfg,
            &locator(&cfg, vec![dir.path().to_path_buf()]),
            &tool,
            None,
            RunMode::default(),
            &log,
        )
        .unwrap_err();
        assert!(matches!(err, SnapcycleError::Disk(DiskError::NoKnownDisk)));
    }

    #[test]
    fn failure_record_lands_beside_the_session_log() {
        let dir = TempDir::new().expect("tempdir");
        let err = SnapcycleError::from(DiskError::NoKnownDisk);

        let detached = RunLog::new("t");
        assert!(record_failure(&err, &detached).is_none());

        let attached = RunLog::new("t");
        attached.attach_dir(dir.path()).unwrap();
        let path = record_failure(&err, &attached).expect("record path");
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["result"]["success"], false);
        assert_eq!(value["result"]["error"], err.to_string());
    }

    #[test]
    fn failed_imaging_still_reports() {
        let dir = TempDir::new().expect("tempdir");
        let mount = provisioned_mount(dir.path());
        let cfg = test_config(2);
        let tool = ScriptedTool::new(&[5]);
        let log = RunLog::new("s1");

        let result = run_backup(&cfg, &locator(&cfg, vec![mount.clone()]), &tool, None, RunMode::default(), &log)
            .unwrap()
            .expect("result");
        assert!(!result.success);
        assert_eq!(result.exit_code, 5);
        let summary = fs::read_to_string(mount.join("Backups/logs/summary_s1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(value["backup"]["success"], false);
        assert_eq!(value["backup"]["exit_code"], 5);
    }
}
