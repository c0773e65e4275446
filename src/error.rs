use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::util::format::human_size;

#[derive(Debug, Error)]
pub enum SnapcycleError {
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Disk(DiskError),
    #[error("{0}")]
    Space(SpaceError),
    #[error("imaging failed with exit code {exit_code}")]
    Imaging { exit_code: i32 },
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("parse config: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("no configured backup disk connected")]
    NoKnownDisk,
    #[error("marker {0}")]
    Marker(String),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("marker already holds disk id {existing}; use --force to replace it with {requested}")]
    MarkerConflict { existing: String, requested: String },
}

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error(
        "insufficient space: {} free, {} required; no old cycles to clean up",
        human_size(*free),
        human_size(*required)
    )]
    Insufficient { free: u64, required: u64 },
    #[error(
        "insufficient space after cleanup: {} free, {} required ({} reclaimed)",
        human_size(*free),
        human_size(*required),
        human_size(*freed)
    )]
    InsufficientAfterCleanup { free: u64, required: u64, freed: u64 },
    #[error("cannot query free space at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

/// A single file that could not be removed during retention cleanup.
#[derive(Debug, Clone, Error, Serialize)]
#[error("delete {}: {reason}", path.display())]
pub struct CleanupFileError {
    pub path: PathBuf,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, SnapcycleError>;

impl SnapcycleError {
    pub fn message(msg: impl Into<String>) -> Self {
        SnapcycleError::Message(msg.into())
    }
}

impl From<ConfigError> for SnapcycleError {
    fn from(err: ConfigError) -> Self {
        SnapcycleError::Config(err)
    }
}

impl From<DiskError> for SnapcycleError {
    fn from(err: DiskError) -> Self {
        SnapcycleError::Disk(err)
    }
}

impl From<SpaceError> for SnapcycleError {
    fn from(err: SpaceError) -> Self {
        SnapcycleError::Space(err)
    }
}
