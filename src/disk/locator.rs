use std::path::{Path, PathBuf};

use crate::config::model::RuntimeConfig;
use crate::disk::identity::{identity_path, read_identity, write_identity};
use crate::disk::space::{SpaceProbe, Statvfs};
use crate::disk::volumes::{FixedVolumes, MountTable, VolumeSource};
use crate::disk::{identities_from_config, DiskIdentity, TargetDisk};
use crate::error::{ConfigError, DiskError, Result};
use crate::journal::RunLog;
use crate::types::DiskId;

/// Finds configured backup disks among the mounted volumes.
pub struct DiskLocator {
    known: Vec<DiskIdentity>,
    marker_name: String,
    volumes: Box<dyn VolumeSource>,
    probe: Box<dyn SpaceProbe>,
}

impl DiskLocator {
    pub fn new(
        known: Vec<DiskIdentity>,
        marker_name: impl Into<String>,
        volumes: Box<dyn VolumeSource>,
        probe: Box<dyn SpaceProbe>,
    ) -> Self {
        Self {
            known,
            marker_name: marker_name.into(),
            volumes,
            probe,
        }
    }

    pub fn from_config(cfg: &RuntimeConfig) -> Result<Self> {
        let volumes: Box<dyn VolumeSource> = if cfg.scan_roots.is_empty() {
            Box::new(MountTable::new())
        } else {
            Box::new(FixedVolumes(cfg.scan_roots.clone()))
        };
        Ok(Self::new(
            identities_from_config(&cfg.target_disks)?,
            cfg.disk_id_filename.clone(),
            volumes,
            Box::new(Statvfs),
        ))
    }

    pub fn known(&self, id: &str) -> Option<&DiskIdentity> {
        self.known.iter().find(|disk| disk.id.as_str() == id)
    }

    pub fn probe(&self) -> &dyn SpaceProbe {
        self.probe.as_ref()
    }

    /// Lists every mounted volume whose marker names a configured disk.
    pub fn scan(&self, log: &RunLog) -> Vec<TargetDisk> {
        let mut found = Vec::new();
        for mount_point in self.volumes.mount_points() {
            let marker = identity_path(&mount_point, &self.marker_name);
            let id = match read_identity(&marker) {
                Ok(Some(id)) => id,
                Ok(None) => {
                    tracing::debug!("{}: not a backup disk", mount_point.display());
                    continue;
                }
                Err(err) => {
                    tracing::debug!(
                        "{}: not a backup disk (marker unreadable: {})",
                        mount_point.display(),
                        err
                    );
                    continue;
                }
            };
            let identity = match self.known(&id) {
                Some(identity) => identity.clone(),
                None => {
                    log.warning(format!(
                        "unknown disk id {} on {}, ignored",
                        id,
                        mount_point.display()
                    ));
                    continue;
                }
            };
            let (total_bytes, free_bytes) = match self.probe.usage(&mount_point) {
                Ok(usage) => (usage.total, usage.free),
                Err(err) => {
                    log.warning(format!(
                        "cannot query space on {}: {}",
                        mount_point.display(),
                        err
                    ));
                    (0, 0)
                }
            };
            log.info(format!(
                "found backup disk {} ({}) at {}",
                identity.id,
                identity.name,
                mount_point.display()
            ));
            found.push(TargetDisk {
                base_path: mount_point.join(&identity.base_path),
                identity,
                mount_point,
                total_bytes,
                free_bytes,
            });
        }
        found
    }

    /// Writes the identity marker for a configured disk onto `mount_point`.
    pub fn provision(&self, mount_point: &Path, id: &str, force: bool, log: &RunLog) -> Result<PathBuf> {
        let id = id
            .parse::<DiskId>()
            .map_err(|e| ConfigError::Invalid(format!("disk id {:?}: {}", id, e)))?;
        if self.known(id.as_str()).is_none() {
            return Err(ConfigError::Invalid(format!("disk id {} is not configured", id)).into());
        }
        if !mount_point.is_dir() {
            return Err(DiskError::NotADirectory(mount_point.to_path_buf()).into());
        }
        let marker = identity_path(mount_point, &self.marker_name);
        match read_identity(&marker) {
            Ok(Some(existing)) if existing == id.as_str() => {
                log.info(format!("{} already carries disk id {}", mount_point.display(), id));
                return Ok(marker);
            }
            Ok(Some(existing)) if !force => {
                return Err(DiskError::MarkerConflict {
                    existing,
                    requested: id.to_string(),
                }
                .into());
            }
            Ok(Some(existing)) => {
                log.warning(format!("replacing disk id {} with {}", existing, id));
            }
            Ok(None) => {}
            Err(err) if !force => {
                return Err(DiskError::Marker(format!("read {}: {}", marker.display(), err)).into());
            }
            Err(_) => {}
        }
        write_identity(&marker, &id)?;
        log.success(format!("disk {} provisioned at {}", id, mount_point.display()));
        Ok(marker)
    }
}

/// The disk with the most free space; ties go to the first one scanned.
pub fn select_best(disks: &[TargetDisk]) -> Option<TargetDisk> {
    let mut best: Option<&TargetDisk> = None;
    for disk in disks {
        match best {
            Some(current) if current.free_bytes >= disk.free_bytes => {}
            _ => best = Some(disk),
        }
    }
    best.cloned()
}
