pub mod api;
pub mod backup;
pub mod cleanup;
pub mod disk;
pub mod status;

use crate::disk::locator::{select_best, DiskLocator};
use crate::disk::TargetDisk;
use crate::error::{DiskError, Result, SnapcycleError, SpaceError};
use crate::journal::RunLog;

pub fn exit_code(err: &SnapcycleError) -> i32 {
    match err {
        SnapcycleError::Config(_) => 2,
        SnapcycleError::Disk(DiskError::NoKnownDisk) => 10,
        SnapcycleError::Disk(_) => 12,
        SnapcycleError::Space(SpaceError::Insufficient { .. }) => 20,
        SnapcycleError::Space(SpaceError::InsufficientAfterCleanup { .. }) => 21,
        SnapcycleError::Space(SpaceError::Unavailable { .. }) => 22,
        SnapcycleError::Imaging { .. } => 1,
        SnapcycleError::Message(_) | SnapcycleError::Io(_) => 2,
    }
}

/// The connected known disk with the most free space.
pub fn select_target(locator: &DiskLocator, log: &RunLog) -> Result<TargetDisk> {
    let disks = locator.scan(log);
    let disk = select_best(&disks).ok_or(DiskError::NoKnownDisk)?;
    log.info(format!(
        "target disk: {} ({}) at {}",
        disk.identity.name,
        disk.identity.id,
        disk.mount_point.display()
    ));
    Ok(disk)
}

pub fn exit_for_error(err: &SnapcycleError) -> ! {
    println!("{}", err);
    std::process::exit(exit_code(err));
}
