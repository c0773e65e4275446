use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(alias = "source_drive")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default = "default_max_differentials", alias = "max_differential_backups")]
    pub max_differentials: u32,
    #[serde(default = "default_true", alias = "verify_after_backup")]
    pub verify: bool,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default = "default_disk_id_filename")]
    pub disk_id_filename: String,
    #[serde(default)]
    pub target_disks: Vec<TargetDiskConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scan_roots: Vec<PathBuf>,
    pub imaging: ImagingConfig,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_keep_cycles")]
    pub keep_cycles: usize,
    #[serde(default = "default_reserve_percent")]
    pub space_reserve_percent: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_cycles: default_keep_cycles(),
            space_reserve_percent: default_reserve_percent(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TargetDiskConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImagingConfig {
    pub command: PathBuf,
    #[serde(default = "default_extra_args")]
    pub extra_args: Vec<String>,
    #[serde(default = "default_verify_flag")]
    pub verify_flag: String,
    #[serde(default = "default_companion_flag")]
    pub companion_flag: String,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
    #[serde(default = "default_companion_extension")]
    pub companion_extension: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_type: Option<String>,
}

/// Validated configuration with defaults resolved.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: String,
    pub source_label: String,
    pub host_label: String,
    pub max_differentials: u32,
    pub verify: bool,
    pub keep_cycles: usize,
    pub space_reserve_percent: u32,
    pub disk_id_filename: String,
    pub target_disks: Vec<TargetDiskConfig>,
    pub scan_roots: Vec<PathBuf>,
    pub imaging: ImagingSettings,
    pub log_dir: PathBuf,
    pub api: Option<ApiSettings>,
}

#[derive(Debug, Clone)]
pub struct ImagingSettings {
    pub command: PathBuf,
    pub extra_args: Vec<String>,
    pub verify_flag: String,
    pub companion_flag: String,
    pub image_extension: String,
    pub companion_extension: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub endpoint: String,
    pub token: String,
    pub backup_type: String,
}

pub const DEFAULT_API_BACKUP_TYPE: &str = "snapcycle-v1";

fn default_max_differentials() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

fn default_keep_cycles() -> usize {
    3
}

fn default_reserve_percent() -> u32 {
    50
}

fn default_disk_id_filename() -> String {
    ".backup_disk_id".to_string()
}

fn default_base_path() -> String {
    "Backups".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_extra_args() -> Vec<String> {
    vec!["-W".to_string()]
}

fn default_verify_flag() -> String {
    "-T".to_string()
}

fn default_companion_flag() -> String {
    "-h".to_string()
}

fn default_image_extension() -> String {
    "sna".to_string()
}

fn default_companion_extension() -> String {
    "hsh".to_string()
}

fn default_timeout_secs() -> u64 {
    2 * 60 * 60
}
