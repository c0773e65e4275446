use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    ApiSettings, Config, ImagingSettings, RuntimeConfig, DEFAULT_API_BACKUP_TYPE,
};
use crate::error::{ConfigError, Result};
use crate::types::DiskId;
use crate::util::paths::{host_label, is_safe_name, path_has_parent_dir, sanitize_label};

/// Loads a YAML config file. JSON is valid YAML, so JSON configs load too.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<RuntimeConfig> {
    let cfg: Config =
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
    parse_runtime(cfg)
}

fn parse_runtime(cfg: Config) -> Result<RuntimeConfig> {
    let source = cfg.source.trim().to_string();
    if source.is_empty() {
        return Err(ConfigError::Invalid("source is empty".to_string()).into());
    }
    let source_label = match cfg.source_label.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => {
            if !is_safe_name(label) {
                return Err(ConfigError::Invalid(format!(
                    "source_label {} must use only letters, digits, '.', '-', '_'",
                    label
                ))
                .into());
            }
            label.to_string()
        }
        _ => derive_source_label(&source),
    };

    if cfg.retention.keep_cycles == 0 {
        return Err(ConfigError::Invalid("retention.keep_cycles must be at least 1".to_string()).into());
    }

    if cfg.target_disks.is_empty() {
        return Err(ConfigError::Invalid("no target_disks configured".to_string()).into());
    }
    let mut ids = HashSet::new();
    let mut target_disks = Vec::new();
    for disk in cfg.target_disks {
        let id = disk
            .id
            .parse::<DiskId>()
            .map_err(|e| ConfigError::Invalid(format!("target disk {:?}: {}", disk.id, e)))?;
        if !ids.insert(id.as_str().to_string()) {
            return Err(ConfigError::Invalid(format!("duplicate target disk id {}", id)).into());
        }
        let base = Path::new(disk.base_path.trim());
        if base.is_absolute() || path_has_parent_dir(base) {
            return Err(ConfigError::Invalid(format!(
                "target disk {}: base_path must be relative and must not contain ..",
                id
            ))
            .into());
        }
        let mut disk = disk;
        disk.id = id.as_str().to_string();
        target_disks.push(disk);
    }

    if cfg.disk_id_filename.trim().is_empty() || cfg.disk_id_filename.contains('/') {
        return Err(ConfigError::Invalid("disk_id_filename must be a plain file name".to_string()).into());
    }

    let imaging = cfg.imaging;
    if imaging.command.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("imaging.command is empty".to_string()).into());
    }
    let image_extension = normalize_extension(&imaging.image_extension);
    let companion_extension = normalize_extension(&imaging.companion_extension);
    if image_extension.is_empty() || companion_extension.is_empty() {
        return Err(ConfigError::Invalid("imaging extensions must not be empty".to_string()).into());
    }
    if image_extension.eq_ignore_ascii_case(&companion_extension) {
        return Err(ConfigError::Invalid(
            "imaging.image_extension and imaging.companion_extension must differ".to_string(),
        )
        .into());
    }
    if imaging.timeout_secs == 0 {
        return Err(ConfigError::Invalid("imaging.timeout_secs must be positive".to_string()).into());
    }

    let log_dir = PathBuf::from(cfg.log_dir.trim());
    if log_dir.is_absolute() || path_has_parent_dir(&log_dir) {
        return Err(ConfigError::Invalid(
            "log_dir must be relative to the disk base path and must not contain ..".to_string(),
        )
        .into());
    }

    let api = if cfg.api.enabled {
        let endpoint = cfg
            .api
            .endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ConfigError::Invalid("api.endpoint is required when api.enabled".to_string()))?;
        Some(ApiSettings {
            endpoint,
            token: cfg.api.token,
            backup_type: cfg
                .api
                .backup_type
                .unwrap_or_else(|| DEFAULT_API_BACKUP_TYPE.to_string()),
        })
    } else {
        None
    };

    Ok(RuntimeConfig {
        source,
        source_label,
        host_label: host_label(cfg.hostname.as_deref()),
        max_differentials: cfg.max_differentials,
        verify: cfg.verify,
        keep_cycles: cfg.retention.keep_cycles,
        space_reserve_percent: cfg.retention.space_reserve_percent,
        disk_id_filename: cfg.disk_id_filename.trim().to_string(),
        target_disks,
        scan_roots: cfg.scan_roots,
        imaging: ImagingSettings {
            command: imaging.command,
            extra_args: imaging.extra_args,
            verify_flag: imaging.verify_flag,
            companion_flag: imaging.companion_flag,
            image_extension,
            companion_extension,
            timeout: Duration::from_secs(imaging.timeout_secs),
        },
        log_dir,
        api,
    })
}

/// `C:` becomes `C`, `/dev/sda1` becomes `sda1`.
pub fn derive_source_label(source: &str) -> String {
    let trimmed = source.trim().trim_end_matches(':');
    let last = trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .find(|part| !part.is_empty())
        .unwrap_or(trimmed);
    sanitize_label(last.trim_end_matches(':'))
}

fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
source: "C:"
hostname: "office-pc"
max_differentials: 4
retention:
  keep_cycles: 2
target_disks:
  - id: "disk-a"
    name: "Disk A"
  - id: "disk-b"
    base_path: "Images/Weekly"
imaging:
  command: "/usr/local/bin/snapshot"
"#;

    #[test]
    fn load_yaml_config_with_defaults() {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(YAML.as_bytes()).expect("write");
        let cfg = load_config(file.path()).expect("load");
        assert_eq!(cfg.source_label, "C");
        assert_eq!(cfg.host_label, "office-pc");
        assert_eq!(cfg.max_differentials, 4);
        assert_eq!(cfg.keep_cycles, 2);
        assert_eq!(cfg.space_reserve_percent, 50);
        assert_eq!(cfg.target_disks.len(), 2);
        assert_eq!(cfg.target_disks[0].base_path, "Backups");
        assert_eq!(cfg.imaging.image_extension, "sna");
        assert_eq!(cfg.imaging.companion_extension, "hsh");
        assert_eq!(cfg.imaging.timeout, Duration::from_secs(7200));
        assert_eq!(cfg.disk_id_filename, ".backup_disk_id");
        assert!(cfg.verify);
        assert!(cfg.api.is_none());
    }

    #[test]
    fn load_json_config_with_legacy_keys() {
        let json = r#"{
            "source_drive": "D:",
            "max_differential_backups": 6,
            "verify_after_backup": false,
            "retention": {"keep_cycles": 3, "space_reserve_percent": 25},
            "target_disks": [{"id": "backup-disk-01", "name": "USB 1", "base_path": "Backups"}],
            "imaging": {"command": "snapshot64", "image_extension": ".sna"},
            "api": {"enabled": true, "endpoint": "https://example.invalid/upload", "token": "t"}
        }"#;
        let cfg = parse_config(json).expect("parse");
        assert_eq!(cfg.source, "D:");
        assert_eq!(cfg.source_label, "D");
        assert!(!cfg.verify);
        assert_eq!(cfg.space_reserve_percent, 25);
        assert_eq!(cfg.imaging.image_extension, "sna");
        let api = cfg.api.expect("api");
        assert_eq!(api.backup_type, DEFAULT_API_BACKUP_TYPE);
    }

    #[test]
    fn rejects_invalid_configs() {
        let no_disks = YAML.replace("target_disks:", "unused:");
        assert!(parse_config(&no_disks).is_err());

        let dup = YAML.replace("disk-b", "disk-a");
        assert!(parse_config(&dup).is_err());

        let zero_keep = YAML.replace("keep_cycles: 2", "keep_cycles: 0");
        assert!(parse_config(&zero_keep).is_err());

        let escape = YAML.replace("Images/Weekly", "../outside");
        assert!(parse_config(&escape).is_err());

        let api_without_endpoint = format!("{}api:\n  enabled: true\n", YAML);
        assert!(parse_config(&api_without_endpoint).is_err());
    }

    #[test]
    fn shipped_example_parses() {
        let cfg = parse_config(include_str!("../../snapcycle.example.yaml")).expect("example");
        assert_eq!(cfg.source_label, "sda1");
        assert_eq!(cfg.target_disks.len(), 2);
        assert_eq!(cfg.imaging.extra_args, vec!["-W".to_string()]);
        assert!(cfg.api.is_none());
    }

    #[test]
    fn derives_source_labels() {
        assert_eq!(derive_source_label("C:"), "C");
        assert_eq!(derive_source_label("/dev/sda1"), "sda1");
        assert_eq!(derive_source_label("HD1:2"), "HD1_2");
    }
}
