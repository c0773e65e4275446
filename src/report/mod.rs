//! Run summary document written after every backup attempt and optionally
//! uploaded to a reporting endpoint.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::backup::orchestrator::BackupResult;
use crate::backup::space::SpaceAssessment;
use crate::error::{Result, SnapcycleError};
use crate::journal::{LogEntry, LogLevel, RunLog};
use crate::util::format::{human_duration, human_size};

pub mod upload;

pub const SUMMARY_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub version: String,
    pub generated_at: DateTime<Local>,
    pub computer_name: String,
    pub backup: BackupSection,
    pub target_disk: TargetDiskSection,
    pub storage: StorageSection,
    pub log_summary: LogSummary,
    pub log_entries: Vec<SummaryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSection {
    pub success: bool,
    #[serde(rename = "type")]
    pub backup_type: String,
    pub source: String,
    pub target: String,
    pub image_file: String,
    pub file_size_bytes: u64,
    pub file_size_human: String,
    pub duration_seconds: f64,
    pub duration_human: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub exit_code: i32,
    pub error: Option<String>,
    pub differential_info: DifferentialInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferentialInfo {
    pub current: u32,
    pub max: u32,
    pub next_full_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDiskSection {
    pub disk_id: String,
    pub disk_name: String,
    pub mount_point: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub required_bytes: u64,
    pub free_percent: f64,
    pub last_cycle_size_bytes: u64,
    pub cycles_count: usize,
    pub cycles_max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    pub total_entries: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub timestamp: DateTime<Local>,
    pub level: String,
    pub message: String,
}

impl From<&LogEntry> for SummaryEntry {
    fn from(entry: &LogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            level: entry.level.as_str().to_string(),
            message: entry.message.clone(),
        }
    }
}

impl StorageSection {
    pub fn new(space: &SpaceAssessment, cycles_count: usize, cycles_max: usize) -> Self {
        Self {
            total_bytes: space.total_bytes,
            free_bytes: space.free_bytes,
            used_bytes: space.used_bytes,
            required_bytes: space.required_bytes,
            free_percent: space.free_percent(),
            last_cycle_size_bytes: space.last_cycle_size_bytes,
            cycles_count,
            cycles_max,
        }
    }
}

fn log_section(log: &RunLog) -> (LogSummary, Vec<SummaryEntry>) {
    let entries = log.entries();
    let summary = LogSummary {
        total_entries: entries.len(),
        errors: entries.iter().filter(|e| e.level == LogLevel::Error).count(),
        warnings: entries.iter().filter(|e| e.level == LogLevel::Warning).count(),
    };
    (summary, entries.iter().map(SummaryEntry::from).collect())
}

impl RunSummary {
    pub fn from_result(
        result: &BackupResult,
        computer_name: &str,
        storage: StorageSection,
        log: &RunLog,
    ) -> Self {
        let (log_summary, log_entries) = log_section(log);
        Self {
            version: SUMMARY_VERSION.to_string(),
            generated_at: Local::now(),
            computer_name: computer_name.to_string(),
            backup: BackupSection {
                success: result.success,
                backup_type: result.backup_type.to_string(),
                source: result.source.clone(),
                target: result.target_dir.display().to_string(),
                image_file: result.image_file.display().to_string(),
                file_size_bytes: result.file_size_bytes,
                file_size_human: human_size(result.file_size_bytes),
                duration_seconds: result.duration_seconds,
                duration_human: human_duration(result.duration_seconds),
                started_at: result.started_at,
                finished_at: result.finished_at,
                exit_code: result.exit_code,
                error: result.error_message.clone(),
                differential_info: DifferentialInfo {
                    current: result.differential_number,
                    max: result.max_differentials,
                    next_full_in: i64::from(result.max_differentials) - i64::from(result.differential_number),
                },
            },
            target_disk: TargetDiskSection {
                disk_id: result.disk.id.clone(),
                disk_name: result.disk.name.clone(),
                mount_point: result.disk.mount_point.display().to_string(),
            },
            storage,
            log_summary,
            log_entries,
        }
    }

    /// A placeholder summary used to check the reporting endpoint.
    pub fn connectivity_test(computer_name: &str, source: &str, max_differentials: u32, log: &RunLog) -> Self {
        let now = Local::now();
        let (log_summary, log_entries) = log_section(log);
        Self {
            version: SUMMARY_VERSION.to_string(),
            generated_at: now,
            computer_name: computer_name.to_string(),
            backup: BackupSection {
                success: true,
                backup_type: "test".to_string(),
                source: source.to_string(),
                target: "TEST".to_string(),
                image_file: "TEST".to_string(),
                file_size_bytes: 0,
                file_size_human: human_size(0),
                duration_seconds: 0.0,
                duration_human: human_duration(0.0),
                started_at: now,
                finished_at: now,
                exit_code: 0,
                error: None,
                differential_info: DifferentialInfo {
                    current: 0,
                    max: max_differentials,
                    next_full_in: i64::from(max_differentials),
                },
            },
            target_disk: TargetDiskSection {
                disk_id: "test".to_string(),
                disk_name: "api-test".to_string(),
                mount_point: String::new(),
            },
            storage: StorageSection::default(),
            log_summary,
            log_entries,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapcycleError::message(format!("encode summary: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)
            .map_err(|e| SnapcycleError::message(format!("write {}: {}", path.display(), e)))
    }
}

pub fn summary_path(log_dir: &Path, session_id: &str) -> PathBuf {
    log_dir.join(format!("summary_{}.json", session_id))
}
