//! Rebuilds backup cycles from the files on disk.
//!
//! Full artifacts are dated by the timestamp in their name (falling back to
//! the modification time), differentials by their modification time. A
//! differential belongs to the latest full dated at or before it; one dated
//! exactly at a later full's timestamp stays with the earlier cycle.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;
use walkdir::WalkDir;

use crate::backup::naming::{full_timestamp, ArtifactNaming};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Segment {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub time: DateTime<Local>,
    /// The primary file plus every sibling sharing its stem.
    pub segments: Vec<Segment>,
}

impl Artifact {
    pub fn size(&self) -> u64 {
        self.segments.iter().map(|s| s.size).sum()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCycle {
    pub full: Artifact,
    pub companion: Option<PathBuf>,
    pub differentials: Vec<Artifact>,
    pub started_at: DateTime<Local>,
    pub total_size_bytes: u64,
}

impl BackupCycle {
    /// Every file of the cycle, each listed once.
    pub fn files(&self) -> Vec<Segment> {
        let mut files: BTreeSet<Segment> = BTreeSet::new();
        files.extend(self.full.segments.iter().cloned());
        for diff in &self.differentials {
            files.extend(diff.segments.iter().cloned());
        }
        if let Some(companion) = &self.companion {
            if !files.iter().any(|s| &s.path == companion) {
                if let Ok(meta) = std::fs::metadata(companion) {
                    files.insert(Segment {
                        path: companion.clone(),
                        size: meta.len(),
                    });
                }
            }
        }
        files.into_iter().collect()
    }
}

#[derive(Debug, Clone)]
struct FileEntry {
    path: PathBuf,
    name: String,
    modified: SystemTime,
    size: u64,
}

#[derive(Debug, Clone)]
pub struct CycleReconstructor {
    naming: ArtifactNaming,
}

impl CycleReconstructor {
    pub fn new(naming: ArtifactNaming) -> Self {
        Self { naming }
    }

    /// Cycles ascending by timestamp. Unreadable directories yield nothing.
    pub fn reconstruct(&self, full_dir: &Path, differential_dir: &Path) -> Vec<BackupCycle> {
        let full_files = list_files(full_dir);
        let diff_files = list_files(differential_dir);

        let mut fulls: Vec<(DateTime<Local>, &FileEntry)> = full_files
            .iter()
            .filter(|f| self.naming.is_image(&f.path))
            .map(|f| {
                let stem = stem_of(&f.path);
                let time = full_timestamp(&stem).unwrap_or_else(|| DateTime::<Local>::from(f.modified));
                (time, f)
            })
            .collect();
        fulls.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
        if fulls.is_empty() {
            return Vec::new();
        }

        let mut diffs: Vec<(DateTime<Local>, &FileEntry)> = diff_files
            .iter()
            .filter(|f| self.naming.is_image(&f.path))
            .map(|f| (DateTime::<Local>::from(f.modified), f))
            .collect();
        diffs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));

        let starts: Vec<DateTime<Local>> = fulls.iter().map(|(t, _)| *t).collect();
        let mut owned: Vec<Vec<Artifact>> = vec![Vec::new(); fulls.len()];
        for (time, entry) in diffs {
            match owner_of(&starts, time) {
                Some(index) => owned[index].push(artifact(entry, time, &diff_files)),
                None => tracing::debug!(
                    "{} predates every full backup, not assigned to a cycle",
                    entry.path.display()
                ),
            }
        }

        fulls
            .iter()
            .zip(owned)
            .map(|((time, entry), differentials)| {
                let full = artifact(entry, *time, &full_files);
                let companion_path = self.naming.companion_for(&full.path);
                let companion = if companion_path.is_file() {
                    Some(companion_path)
                } else {
                    None
                };
                let mut cycle = BackupCycle {
                    full,
                    companion,
                    differentials,
                    started_at: *time,
                    total_size_bytes: 0,
                };
                cycle.total_size_bytes = cycle.files().iter().map(|s| s.size).sum();
                cycle
            })
            .collect()
    }
}

/// Index of the cycle owning a differential dated `time`, given ascending
/// cycle start times. Ties with a later start stay with the earlier cycle.
fn owner_of(starts: &[DateTime<Local>], time: DateTime<Local>) -> Option<usize> {
    (0..starts.len()).find(|&i| {
        starts[i] <= time && (i + 1 == starts.len() || time <= starts[i + 1])
    })
}

fn artifact(entry: &FileEntry, time: DateTime<Local>, siblings: &[FileEntry]) -> Artifact {
    let stem = stem_of(&entry.path);
    let mut segments: Vec<Segment> = siblings
        .iter()
        .filter(|f| stem_of(&f.path) == stem)
        .map(|f| Segment {
            path: f.path.clone(),
            size: f.size,
        })
        .collect();
    segments.sort();
    Artifact {
        path: entry.path.clone(),
        time,
        segments,
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn list_files(dir: &Path) -> Vec<FileEntry> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("skip entry in {}: {}", dir.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                tracing::debug!("skip {}: {}", entry.path().display(), err);
                continue;
            }
        };
        let modified = match meta.modified() {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        files.push(FileEntry {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().to_string(),
            modified,
            size: meta.len(),
        });
    }
    files
}
