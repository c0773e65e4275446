use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

const PSEUDO_FS_TYPES: [&str; 22] = [
    "proc",
    "sysfs",
    "devtmpfs",
    "devpts",
    "tmpfs",
    "cgroup",
    "cgroup2",
    "securityfs",
    "pstore",
    "debugfs",
    "tracefs",
    "configfs",
    "fusectl",
    "mqueue",
    "hugetlbfs",
    "bpf",
    "autofs",
    "binfmt_misc",
    "efivarfs",
    "rpc_pipefs",
    "nsfs",
    "overlay",
];

pub trait VolumeSource {
    /// Mount points that may carry a backup disk marker.
    fn mount_points(&self) -> Vec<PathBuf>;
}

/// Volumes listed in the kernel mount table.
#[derive(Debug, Clone)]
pub struct MountTable {
    path: PathBuf,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/proc/self/mounts"),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeSource for MountTable {
    fn mount_points(&self) -> Vec<PathBuf> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => parse_mounts(&contents),
            Err(err) => {
                tracing::warn!("read {}: {}", self.path.display(), err);
                Vec::new()
            }
        }
    }
}

/// An explicit list of mount points, used when `scan_roots` is configured.
#[derive(Debug, Clone)]
pub struct FixedVolumes(pub Vec<PathBuf>);

impl VolumeSource for FixedVolumes {
    fn mount_points(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

fn parse_mounts(contents: &str) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut mounts = Vec::new();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        if PSEUDO_FS_TYPES.contains(&fields[2]) {
            continue;
        }
        let mountpoint = PathBuf::from(unescape_mount_field(fields[1]));
        if seen.insert(mountpoint.clone()) {
            mounts.push(mountpoint);
        }
    }
    mounts
}

/// The mount table encodes blanks and backslashes as three-digit octal escapes.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let digits = std::str::from_utf8(digits).unwrap_or("");
                if let Ok(value) = u8::from_str_radix(digits, 8) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MOUNTS: &str = "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda2 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
/dev/sdb1 /media/usb\\040disk ext4 rw,relatime 0 0
/dev/sdb1 /media/usb\\040disk ext4 rw,relatime 0 0
/dev/sdc1 /mnt/backup vfat rw 0 0
";

    #[test]
    fn skips_pseudo_filesystems_and_duplicates() {
        let mounts = parse_mounts(MOUNTS);
        assert_eq!(
            mounts,
            vec![
                PathBuf::from("/"),
                PathBuf::from("/media/usb disk"),
                PathBuf::from("/mnt/backup"),
            ]
        );
    }

    #[test]
    fn reads_mount_table_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(MOUNTS.as_bytes()).expect("write");
        let table = MountTable::from_file(file.path());
        assert_eq!(table.mount_points().len(), 3);
    }

    #[test]
    fn unreadable_mount_table_is_empty() {
        let table = MountTable::from_file("/nonexistent/mounts");
        assert!(table.mount_points().is_empty());
    }
}
