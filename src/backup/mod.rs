use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapcycleError};
use crate::util::paths::is_safe_name;

pub mod cycles;
pub mod imaging;
pub mod naming;
pub mod orchestrator;
pub mod retention;
pub mod space;
pub mod state;

pub const FULL_DIR: &str = "full";
pub const DIFFERENTIAL_DIR: &str = "differential";
pub const STATE_FILE: &str = "backup_state.json";

/// Directory layout for one source on one disk:
/// `<disk base>/<host>/<source>/{full,differential,backup_state.json}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    pub root: PathBuf,
    pub full_dir: PathBuf,
    pub differential_dir: PathBuf,
    pub state_file: PathBuf,
}

impl BackupLayout {
    pub fn new(disk_base: &Path, host_label: &str, source_label: &str) -> Result<Self> {
        for (what, name) in [("host", host_label), ("source", source_label)] {
            if !is_safe_name(name) {
                return Err(SnapcycleError::message(format!(
                    "{} label {} must use only letters, digits, '.', '-', '_'",
                    what, name
                )));
            }
        }
        let root = disk_base.join(host_label).join(source_label);
        Ok(Self {
            full_dir: root.join(FULL_DIR),
            differential_dir: root.join(DIFFERENTIAL_DIR),
            state_file: root.join(STATE_FILE),
            root,
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.full_dir, &self.differential_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| SnapcycleError::message(format!("create {}: {}", dir.display(), e)))?;
        }
        Ok(())
    }
}

/// Session logs live beside the per-host trees, directly under the disk base.
pub fn log_dir(disk_base: &Path, log_dir: &Path) -> PathBuf {
    disk_base.join(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_paths_and_creation() {
        let dir = TempDir::new().expect("tempdir");
        let base = dir.path().join("Backups");
        let layout = BackupLayout::new(&base, "office-pc", "C").unwrap();
        assert_eq!(layout.full_dir, base.join("office-pc/C/full"));
        assert_eq!(layout.differential_dir, base.join("office-pc/C/differential"));
        assert_eq!(layout.state_file, base.join("office-pc/C/backup_state.json"));
        layout.ensure_dirs().unwrap();
        assert!(layout.full_dir.is_dir());
        assert!(layout.differential_dir.is_dir());
    }

    #[test]
    fn layout_rejects_unsafe_labels() {
        assert!(BackupLayout::new(Path::new("/mnt"), "host", "..").is_err());
        assert!(BackupLayout::new(Path::new("/mnt"), "a/b", "C").is_err());
    }
}
