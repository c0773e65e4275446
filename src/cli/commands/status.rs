use std::path::Path;

use chrono::Local;

use crate::backup::imaging::SnapshotCommand;
use crate::backup::naming::differential_sequence;
use crate::backup::orchestrator::{chain_phase, BackupOrchestrator, ChainPhase};
use crate::cli::commands::select_target;
use crate::config::load::load_config;
use crate::config::model::RuntimeConfig;
use crate::disk::locator::DiskLocator;
use crate::error::Result;
use crate::journal::RunLog;
use crate::util::format::human_size;

pub fn run_status(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let log = RunLog::new(Local::now().format("%Y%m%d%H%M%S").to_string());
    let locator = DiskLocator::from_config(&cfg)?;
    for line in status_lines(&cfg, &locator, &log)? {
        println!("{}", line);
    }
    Ok(())
}

/// Chain position, next decision, cycles on disk and space, one line each.
pub fn status_lines(cfg: &RuntimeConfig, locator: &DiskLocator, log: &RunLog) -> Result<Vec<String>> {
    let disk = select_target(locator, log)?;
    let tool = SnapshotCommand::new(cfg.imaging.clone());
    let orchestrator = BackupOrchestrator::new(cfg, &disk, &tool, locator.probe())?;
    let state = orchestrator.load_state(log);

    let mut lines = vec![
        format!("source: {} ({})", cfg.source, cfg.source_label),
        format!(
            "disk: {} ({}) at {}",
            disk.identity.name,
            disk.identity.id,
            disk.mount_point.display()
        ),
        format!("backup dir: {}", orchestrator.layout().root.display()),
    ];
    match state.full() {
        Some(full) => lines.push(format!("last full: {}", full.display())),
        None => lines.push("last full: none".to_string()),
    }
    lines.push(format!(
        "differentials: {}/{}",
        state.differentials(),
        cfg.max_differentials
    ));
    let next = match chain_phase(&state, cfg.max_differentials) {
        ChainPhase::NoFullYet => "full (no usable full backup)".to_string(),
        ChainPhase::ChainExhausted { differentials } => {
            format!("full ({} differentials reached)", differentials)
        }
        ChainPhase::ChainActive { next_sequence, .. } => format!("differential #{:02}", next_sequence),
    };
    lines.push(format!("next backup: {}", next));
    if let Some(last) = state.history.last() {
        lines.push(format!(
            "last run: {} {} {}",
            last.timestamp,
            last.backup_type,
            if last.success { "ok" } else { "FAILED" }
        ));
    }

    let cycles = orchestrator.cycles();
    lines.push(format!("cycles: {} (keeping {})", cycles.len(), cfg.keep_cycles));
    for cycle in &cycles {
        lines.push(format!(
            "  {}  {} + {} differential(s)  {}",
            cycle.started_at.format("%Y-%m-%d %H:%M"),
            cycle.full.file_name(),
            cycle.differentials.len(),
            human_size(cycle.total_size_bytes)
        ));
        for diff in &cycle.differentials {
            let stem = diff
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let sequence = match differential_sequence(&stem) {
                Some(n) => format!("#{:02}", n),
                None => "#??".to_string(),
            };
            lines.push(format!(
                "    {} {}  {}",
                sequence,
                diff.file_name(),
                human_size(diff.size())
            ));
        }
    }

    let space = orchestrator.assess_space()?;
    lines.push(format!(
        "space: {} free of {} ({:.1}%), {} required",
        human_size(space.free_bytes),
        human_size(space.total_bytes),
        space.free_percent(),
        human_size(space.required_bytes)
    ));
    if !space.sufficient {
        log.warning("not enough space for the next backup; cleanup will run first");
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::orchestrator::tests::{test_config, ScriptedTool};
    use crate::cli::commands::backup::run_backup;
    use crate::cli::commands::backup::tests::{locator, provisioned_mount};
    use crate::types::RunMode;
    use tempfile::TempDir;

    #[test]
    fn fresh_disk_reports_full_next() {
        let dir = TempDir::new().expect("tempdir");
        let mount = provisioned_mount(dir.path());
        let cfg = test_config(2);
        let log = RunLog::new("t");
        let lines = status_lines(&cfg, &locator(&cfg, vec![mount]), &log).unwrap();
        assert!(lines.contains(&"last full: none".to_string()));
        assert!(lines.contains(&"next backup: full (no usable full backup)".to_string()));
        assert!(lines.contains(&"cycles: 0 (keeping 2)".to_string()));
    }

    #[test]
    fn after_a_full_the_next_is_differential_one() {
        let dir = TempDir::new().expect("tempdir");
        let mount = provisioned_mount(dir.path());
        let cfg = test_config(2);
        let log = RunLog::new("t");
        let locator = locator(&cfg, vec![mount]);
        run_backup(&cfg, &locator, &ScriptedTool::new(&[]), None, RunMode::default(), &log).unwrap();

        let lines = status_lines(&cfg, &locator, &log).unwrap();
        assert!(lines.contains(&"next backup: differential #01".to_string()));
        assert!(lines.contains(&"differentials: 0/2".to_string()));
        assert!(lines.contains(&"cycles: 1 (keeping 2)".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("last run: ") && l.ends_with("full ok")));
    }

    #[test]
    fn differentials_are_listed_with_their_sequence() {
        let dir = TempDir::new().expect("tempdir");
        let mount = provisioned_mount(dir.path());
        let cfg = test_config(2);
        let log = RunLog::new("t");
        let locator = locator(&cfg, vec![mount]);
        let tool = ScriptedTool::new(&[]);
        run_backup(&cfg, &locator, &tool, None, RunMode::default(), &log).unwrap();
        run_backup(&cfg, &locator, &tool, None, RunMode::default(), &log).unwrap();

        let lines = status_lines(&cfg, &locator, &log).unwrap();
        assert!(lines.contains(&"next backup: differential #02".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("    #01 C_diff_") && l.ends_with("5.00 B")));
    }
}
