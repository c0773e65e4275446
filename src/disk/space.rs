use std::io;
use std::path::Path;

use nix::sys::statvfs::statvfs;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SpaceUsage {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

pub trait SpaceProbe {
    fn usage(&self, path: &Path) -> io::Result<SpaceUsage>;
}

/// Queries the filesystem holding `path` with statvfs(3).
///
/// `free` is what an unprivileged writer can use; `used` excludes the
/// root-reserved blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statvfs;

impl SpaceProbe for Statvfs {
    fn usage(&self, path: &Path) -> io::Result<SpaceUsage> {
        let stat = statvfs(path).map_err(io::Error::from)?;
        let mut unit = stat.fragment_size() as u64;
        if unit == 0 {
            unit = stat.block_size() as u64;
        }
        let total = (stat.blocks() as u64).saturating_mul(unit);
        let free = (stat.blocks_available() as u64).saturating_mul(unit);
        let unused = (stat.blocks_free() as u64).saturating_mul(unit);
        Ok(SpaceUsage {
            total,
            free,
            used: total.saturating_sub(unused),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn statvfs_reports_consistent_numbers() {
        let dir = TempDir::new().expect("tempdir");
        let usage = Statvfs.usage(dir.path()).expect("statvfs");
        assert!(usage.total > 0);
        assert!(usage.free <= usage.total);
        assert!(usage.used <= usage.total);
    }

    #[test]
    fn statvfs_fails_for_missing_path() {
        assert!(Statvfs.usage(Path::new("/nonexistent/snapcycle")).is_err());
    }
}
