use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{DiskError, Result};
use crate::types::DiskId;

pub fn identity_path(root: &Path, filename: &str) -> PathBuf {
    root.join(filename)
}

/// Reads the disk id stored in a marker file.
///
/// A missing or blank marker is `Ok(None)`; anything else that prevents
/// reading it is an error the caller may choose to swallow.
pub fn read_identity(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim();
            if id.is_empty() {
                Ok(None)
            } else {
                Ok(Some(id.to_string()))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn write_identity(path: &Path, id: &DiskId) -> Result<()> {
    fs::write(path, id.as_str())
        .map_err(|e| DiskError::Marker(format!("write {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn identity_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let path = identity_path(dir.path(), ".backup_disk_id");
        let id: DiskId = "disk1".parse().unwrap();
        write_identity(&path, &id).expect("write");
        assert_eq!(read_identity(&path).unwrap().as_deref(), Some("disk1"));
    }

    #[test]
    fn blank_or_missing_marker_is_none() {
        let dir = TempDir::new().expect("tempdir");
        let path = identity_path(dir.path(), ".backup_disk_id");
        assert!(read_identity(&path).unwrap().is_none());
        fs::write(&path, " \n").unwrap();
        assert!(read_identity(&path).unwrap().is_none());
    }
}
