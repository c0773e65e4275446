use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::backup::cycles::BackupCycle;
use crate::error::CleanupFileError;
use crate::journal::RunLog;
use crate::util::format::human_size;

#[derive(Debug, Clone, Serialize)]
pub struct RetentionDecision {
    pub keep: Vec<BackupCycle>,
    /// Oldest first.
    pub delete: Vec<BackupCycle>,
    pub projected_freed_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub total_cycles: usize,
    pub kept_cycles: usize,
    pub deleted_cycles: usize,
    pub deleted_files: usize,
    pub freed_bytes: u64,
    pub errors: Vec<CleanupFileError>,
    pub dry_run: bool,
}

/// Keeps the newest `keep` cycles and condemns the rest.
#[derive(Debug, Clone)]
pub struct RetentionPlanner {
    keep: usize,
    protected: Option<PathBuf>,
}

impl RetentionPlanner {
    pub fn new(keep: usize) -> Self {
        Self { keep, protected: None }
    }

    /// Never condemn the cycle whose full artifact is `full`.
    pub fn protecting(mut self, full: Option<&Path>) -> Self {
        self.protected = full.map(Path::to_path_buf);
        self
    }

    pub fn plan(&self, mut cycles: Vec<BackupCycle>) -> RetentionDecision {
        cycles.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        let condemned = cycles.len().saturating_sub(self.keep);
        let mut keep = cycles.split_off(condemned);
        let mut delete = Vec::new();
        for cycle in cycles {
            if self.protected.as_deref() == Some(cycle.full.path.as_path()) {
                tracing::debug!("keeping active chain {}", cycle.full.path.display());
                keep.push(cycle);
            } else {
                delete.push(cycle);
            }
        }
        keep.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        let projected_freed_bytes = delete
            .iter()
            .flat_map(|cycle| cycle.files())
            .map(|segment| segment.size)
            .sum();
        RetentionDecision {
            keep,
            delete,
            projected_freed_bytes,
        }
    }

    /// Deletes every file of the condemned cycles. Failures are collected,
    /// never fatal.
    pub fn execute(&self, decision: &RetentionDecision, dry_run: bool, log: &RunLog) -> CleanupReport {
        let mut report = CleanupReport {
            total_cycles: decision.keep.len() + decision.delete.len(),
            kept_cycles: decision.keep.len(),
            deleted_cycles: decision.delete.len(),
            dry_run,
            ..CleanupReport::default()
        };
        if decision.delete.is_empty() {
            log.info(format!(
                "cleanup: {} cycles present, keeping {}; nothing to do",
                report.total_cycles, self.keep
            ));
            return report;
        }
        log.info(format!(
            "cleanup: {} cycles present, keeping {}, deleting {}",
            report.total_cycles,
            report.kept_cycles,
            report.deleted_cycles
        ));

        for cycle in &decision.delete {
            log.info(format!(
                "  cycle {} ({}, {} differentials, {})",
                cycle.started_at.format("%Y-%m-%d %H:%M"),
                cycle.full.file_name(),
                cycle.differentials.len(),
                human_size(cycle.total_size_bytes)
            ));
            for segment in cycle.files() {
                if dry_run {
                    log.info(format!("    dry-run: would delete {}", segment.path.display()));
                    report.deleted_files += 1;
                    report.freed_bytes += segment.size;
                    continue;
                }
                match fs::remove_file(&segment.path) {
                    Ok(()) => {
                        report.deleted_files += 1;
                        report.freed_bytes += segment.size;
                        log.info(format!("    deleted {}", segment.path.display()));
                    }
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        let failure = CleanupFileError {
                            path: segment.path.clone(),
                            reason: err.to_string(),
                        };
                        log.error(format!("    {}", failure));
                        report.errors.push(failure);
                    }
                }
            }
        }

        log.info(format!(
            "cleanup {}: {} files, {} freed",
            if dry_run { "preview" } else { "finished" },
            report.deleted_files,
            human_size(report.freed_bytes)
        ));
        report
    }
}
