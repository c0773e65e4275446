use std::path::Path;

use serde::Serialize;

use crate::backup::cycles::{BackupCycle, CycleReconstructor};
use crate::backup::retention::{CleanupReport, RetentionPlanner};
use crate::backup::BackupLayout;
use crate::disk::space::SpaceProbe;
use crate::error::{Result, SpaceError};
use crate::journal::RunLog;
use crate::util::format::human_size;
use crate::util::paths::nearest_existing;

/// Assumed size of the first cycle on an empty disk.
pub const MIN_REQUIRED_BYTES: u64 = 50 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpaceAssessment {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub last_cycle_size_bytes: u64,
    pub required_bytes: u64,
    pub sufficient: bool,
}

impl SpaceAssessment {
    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let percent = self.free_bytes as f64 / self.total_bytes as f64 * 100.0;
        (percent * 10.0).round() / 10.0
    }
}

/// `ceil(last * (1 + reserve / 100))`, or the floor when there is no prior cycle.
pub fn required_bytes(last_cycle_size: u64, reserve_percent: u32) -> u64 {
    if last_cycle_size == 0 {
        return MIN_REQUIRED_BYTES;
    }
    let scaled = u128::from(last_cycle_size) * (100 + u128::from(reserve_percent));
    u64::try_from(scaled.div_ceil(100)).unwrap_or(u64::MAX)
}

pub fn last_cycle_size(cycles: &[BackupCycle]) -> u64 {
    cycles.last().map(|c| c.total_size_bytes).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct SpaceCheck {
    pub assessment: SpaceAssessment,
    /// Present when a cleanup had to run to make room.
    pub cleanup: Option<CleanupReport>,
}

pub struct SpacePlanner<'a> {
    probe: &'a dyn SpaceProbe,
    reserve_percent: u32,
}

impl<'a> SpacePlanner<'a> {
    pub fn new(probe: &'a dyn SpaceProbe, reserve_percent: u32) -> Self {
        Self {
            probe,
            reserve_percent,
        }
    }

    pub fn assess(&self, target: &Path, last_cycle_size: u64) -> std::result::Result<SpaceAssessment, SpaceError> {
        let probe_path = nearest_existing(target).ok_or_else(|| SpaceError::Unavailable {
            path: target.to_path_buf(),
            reason: "no existing ancestor".to_string(),
        })?;
        let usage = self
            .probe
            .usage(&probe_path)
            .map_err(|e| SpaceError::Unavailable {
                path: probe_path.clone(),
                reason: e.to_string(),
            })?;
        let required = required_bytes(last_cycle_size, self.reserve_percent);
        Ok(SpaceAssessment {
            total_bytes: usage.total,
            free_bytes: usage.free,
            used_bytes: usage.used,
            last_cycle_size_bytes: last_cycle_size,
            required_bytes: required,
            sufficient: usage.free >= required,
        })
    }

    pub fn log_assessment(&self, target: &Path, assessment: &SpaceAssessment, log: &RunLog) {
        log.info(format!("space on {}", target.display()));
        log.info(format!("  total: {}", human_size(assessment.total_bytes)));
        log.info(format!("  used: {}", human_size(assessment.used_bytes)));
        log.info(format!("  free: {}", human_size(assessment.free_bytes)));
        log.info(format!("  last cycle: {}", human_size(assessment.last_cycle_size_bytes)));
        log.info(format!(
            "  required ({}% reserve): {}",
            self.reserve_percent,
            human_size(assessment.required_bytes)
        ));
        if assessment.sufficient {
            log.success("  enough space available");
        } else {
            log.warning(format!(
                "  not enough space, missing {}",
                human_size(assessment.required_bytes - assessment.free_bytes)
            ));
        }
    }

    /// Checks space, cleans up old cycles if needed, and checks again.
    /// An error means imaging must not start.
    pub fn ensure_space(
        &self,
        layout: &BackupLayout,
        reconstructor: &CycleReconstructor,
        retention: &RetentionPlanner,
        log: &RunLog,
    ) -> Result<SpaceCheck> {
        let cycles = reconstructor.reconstruct(&layout.full_dir, &layout.differential_dir);
        let assessment = self.assess(&layout.root, last_cycle_size(&cycles))?;
        self.log_assessment(&layout.root, &assessment, log);
        if assessment.sufficient {
            return Ok(SpaceCheck {
                assessment,
                cleanup: None,
            });
        }

        let decision = retention.plan(cycles);
        if decision.delete.is_empty() {
            return Err(SpaceError::Insufficient {
                free: assessment.free_bytes,
                required: assessment.required_bytes,
            }
            .into());
        }
        log.warning("not enough space, cleaning up old cycles");
        let report = retention.execute(&decision, false, log);

        let cycles = reconstructor.reconstruct(&layout.full_dir, &layout.differential_dir);
        let assessment = self.assess(&layout.root, last_cycle_size(&cycles))?;
        if !assessment.sufficient {
            return Err(SpaceError::InsufficientAfterCleanup {
                free: assessment.free_bytes,
                required: assessment.required_bytes,
                freed: report.freed_bytes,
            }
            .into());
        }
        log.success(format!("after cleanup: {} free", human_size(assessment.free_bytes)));
        Ok(SpaceCheck {
            assessment,
            cleanup: Some(report),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backup::cycles::tests::{base_time, write_diff, write_full};
    use crate::backup::naming::ArtifactNaming;
    use crate::disk::space::SpaceUsage;
    use crate::error::SnapcycleError;
    use std::io;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    pub(crate) struct FixedProbe(pub SpaceUsage);

    impl SpaceProbe for FixedProbe {
        fn usage(&self, _path: &Path) -> io::Result<SpaceUsage> {
            Ok(self.0)
        }
    }

    struct FailingProbe;

    impl SpaceProbe for FailingProbe {
        fn usage(&self, _path: &Path) -> io::Result<SpaceUsage> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    /// Reports `capacity` minus the bytes currently stored under `root`.
    pub(crate) struct TreeProbe {
        pub root: PathBuf,
        pub capacity: u64,
    }

    impl SpaceProbe for TreeProbe {
        fn usage(&self, _path: &Path) -> io::Result<SpaceUsage> {
            let used: u64 = WalkDir::new(&self.root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum();
            Ok(SpaceUsage {
                total: self.capacity,
                free: self.capacity.saturating_sub(used),
                used,
            })
        }
    }

    #[test]
    fn required_space_rule() {
        assert_eq!(required_bytes(0, 50), MIN_REQUIRED_BYTES);
        assert_eq!(required_bytes(100 * GIB, 50), 150 * GIB);
        assert_eq!(required_bytes(3, 50), 5);
        assert_eq!(required_bytes(100, 0), 100);
    }

    #[test]
    fn assessment_with_reserve() {
        let probe = FixedProbe(SpaceUsage {
            total: 1000 * GIB,
            free: 140 * GIB,
            used: 860 * GIB,
        });
        let dir = TempDir::new().expect("tempdir");
        let planner = SpacePlanner::new(&probe, 50);
        let assessment = planner.assess(&dir.path().join("not/yet"), 100 * GIB).unwrap();
        assert_eq!(assessment.required_bytes, 150 * GIB);
        assert!(!assessment.sufficient);
        assert_eq!(assessment.free_percent(), 14.0);
    }

    #[test]
    fn failed_probe_is_unavailable() {
        let dir = TempDir::new().expect("tempdir");
        let planner = SpacePlanner::new(&FailingProbe, 50);
        let err = planner.assess(dir.path(), 0).unwrap_err();
        assert!(matches!(err, SpaceError::Unavailable { .. }));
    }

    fn layout_with_cycles(dir: &TempDir, count: i64) -> (BackupLayout, CycleReconstructor) {
        let layout = BackupLayout::new(dir.path(), "host", "C").unwrap();
        layout.ensure_dirs().unwrap();
        let naming = ArtifactNaming::new("C", "sna", "hsh");
        for i in 0..count {
            let at = base_time() + chrono::Duration::hours(i);
            write_full(&layout.full_dir, &naming, at, 90);
            write_diff(&layout.differential_dir, &naming, at + chrono::Duration::minutes(1), 1, 10);
        }
        (layout, CycleReconstructor::new(naming))
    }

    #[test]
    fn cleanup_makes_room() {
        let dir = TempDir::new().expect("tempdir");
        let (layout, reconstructor) = layout_with_cycles(&dir, 3);
        // each cycle is 110 bytes; 165 required, 330 stored
        let probe = TreeProbe {
            root: dir.path().to_path_buf(),
            capacity: 450,
        };
        let planner = SpacePlanner::new(&probe, 50);
        let log = RunLog::new("t");
        let check = planner
            .ensure_space(&layout, &reconstructor, &RetentionPlanner::new(1), &log)
            .unwrap();
        let cleanup = check.cleanup.expect("cleanup ran");
        assert_eq!(cleanup.freed_bytes, 220);
        assert!(check.assessment.sufficient);
    }

    #[test]
    fn refusals_are_distinguishable() {
        let dir = TempDir::new().expect("tempdir");
        let (layout, reconstructor) = layout_with_cycles(&dir, 2);
        let probe = TreeProbe {
            root: dir.path().to_path_buf(),
            capacity: 250,
        };
        let planner = SpacePlanner::new(&probe, 50);
        let log = RunLog::new("t");

        let err = planner
            .ensure_space(&layout, &reconstructor, &RetentionPlanner::new(2), &log)
            .unwrap_err();
        assert!(matches!(err, SnapcycleError::Space(SpaceError::Insufficient { .. })));

        let err = planner
            .ensure_space(&layout, &reconstructor, &RetentionPlanner::new(1), &log)
            .unwrap_err();
        match err {
            SnapcycleError::Space(SpaceError::InsufficientAfterCleanup { freed, .. }) => {
                assert_eq!(freed, 110)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
