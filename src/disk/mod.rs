pub mod identity;
pub mod locator;
pub mod space;
pub mod volumes;

use std::path::PathBuf;

use crate::config::model::TargetDiskConfig;
use crate::error::{ConfigError, Result};
use crate::types::DiskId;

/// Policy attached to a configured backup disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskIdentity {
    pub id: DiskId,
    pub name: String,
    pub base_path: PathBuf,
}

impl DiskIdentity {
    pub fn from_config(disk: &TargetDiskConfig) -> Result<Self> {
        let id = disk
            .id
            .parse::<DiskId>()
            .map_err(|e| ConfigError::Invalid(format!("target disk {:?}: {}", disk.id, e)))?;
        let name = disk
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string());
        Ok(Self {
            id,
            name,
            base_path: PathBuf::from(disk.base_path.trim()),
        })
    }
}

pub fn identities_from_config(disks: &[TargetDiskConfig]) -> Result<Vec<DiskIdentity>> {
    disks.iter().map(DiskIdentity::from_config).collect()
}

/// A configured disk found mounted on this machine.
#[derive(Debug, Clone)]
pub struct TargetDisk {
    pub identity: DiskIdentity,
    pub mount_point: PathBuf,
    /// `base_path` resolved against the mount point.
    pub base_path: PathBuf,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_name_defaults_to_id() {
        let cfg = TargetDiskConfig {
            id: "disk-a".to_string(),
            name: None,
            base_path: "Backups".to_string(),
        };
        let identity = DiskIdentity::from_config(&cfg).unwrap();
        assert_eq!(identity.name, "disk-a");
        assert_eq!(identity.base_path, PathBuf::from("Backups"));
    }
}
