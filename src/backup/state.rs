use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, SnapcycleError};
use crate::journal::RunLog;
use crate::types::BackupType;

/// Position in the full/differential chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    NoFull,
    Active {
        full: PathBuf,
        companion: PathBuf,
        differentials: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub file: PathBuf,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    pub chain: ChainState,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateRecord {
    #[serde(rename = "lastFull", alias = "last_full_backup", default)]
    last_full: Option<PathBuf>,
    #[serde(rename = "lastFullCompanion", alias = "last_full_hash_file", default)]
    last_full_companion: Option<PathBuf>,
    #[serde(rename = "differentialCount", alias = "differential_count", default)]
    differential_count: u32,
    #[serde(alias = "backups", default)]
    history: Vec<HistoryEntry>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            chain: ChainState::NoFull,
            history: Vec::new(),
        }
    }
}

impl CycleState {
    /// Loads the state file; a missing file is a fresh state, a corrupt one
    /// is logged and treated as fresh.
    pub fn load(path: &Path, log: &RunLog) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                log.warning(format!("cannot read state {}: {}", path.display(), err));
                return Self::default();
            }
        };
        match serde_json::from_str::<StateRecord>(&contents) {
            Ok(record) => {
                log.info(format!("state loaded: {}", path.display()));
                Self::from_record(record)
            }
            Err(err) => {
                log.warning(format!("state {} is corrupt, starting fresh: {}", path.display(), err));
                Self::default()
            }
        }
    }

    /// Writes the state through a temp file in the same directory and renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| SnapcycleError::message(format!("{} has no parent", path.display())))?;
        fs::create_dir_all(dir)
            .map_err(|e| SnapcycleError::message(format!("create {}: {}", dir.display(), e)))?;
        let data = serde_json::to_string_pretty(&self.to_record())
            .map_err(|e| SnapcycleError::message(format!("encode state: {}", e)))?;
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| SnapcycleError::message(format!("create temp in {}: {}", dir.display(), e)))?;
        tmp.write_all(data.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SnapcycleError::message(format!("write {}: {}", tmp.path().display(), e)))?;
        tmp.persist(path)
            .map_err(|e| SnapcycleError::message(format!("rename to {}: {}", path.display(), e.error)))?;
        Ok(())
    }

    pub fn differentials(&self) -> u32 {
        match &self.chain {
            ChainState::NoFull => 0,
            ChainState::Active { differentials, .. } => *differentials,
        }
    }

    pub fn full(&self) -> Option<&Path> {
        match &self.chain {
            ChainState::NoFull => None,
            ChainState::Active { full, .. } => Some(full),
        }
    }

    pub fn companion(&self) -> Option<&Path> {
        match &self.chain {
            ChainState::NoFull => None,
            ChainState::Active { companion, .. } => Some(companion),
        }
    }

    pub fn start_chain(&mut self, full: PathBuf, companion: PathBuf) {
        self.chain = ChainState::Active {
            full,
            companion,
            differentials: 0,
        };
    }

    /// Advances the differential count; a no-op without an active chain.
    pub fn advance_chain(&mut self, sequence: u32) {
        if let ChainState::Active { differentials, .. } = &mut self.chain {
            *differentials = sequence;
        }
    }

    fn from_record(record: StateRecord) -> Self {
        let chain = match (record.last_full, record.last_full_companion) {
            (Some(full), Some(companion)) => ChainState::Active {
                full,
                companion,
                differentials: record.differential_count,
            },
            _ => ChainState::NoFull,
        };
        Self {
            chain,
            history: record.history,
        }
    }

    fn to_record(&self) -> StateRecord {
        let (last_full, last_full_companion, differential_count) = match &self.chain {
            ChainState::NoFull => (None, None, 0),
            ChainState::Active {
                full,
                companion,
                differentials,
            } => (Some(full.clone()), Some(companion.clone()), *differentials),
        };
        StateRecord {
            last_full,
            last_full_companion,
            differential_count,
            history: self.history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn missing_state_is_fresh() {
        let dir = TempDir::new().expect("tempdir");
        let log = RunLog::new("t");
        let state = CycleState::load(&dir.path().join("backup_state.json"), &log);
        assert_eq!(state, CycleState::default());
        assert_eq!(log.count(LogLevel::Warning), 0);
    }

    #[test]
    fn save_and_load_active_chain() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("C").join("backup_state.json");
        let mut state = CycleState::default();
        state.start_chain(PathBuf::from("/d/full/C_full.sna"), PathBuf::from("/d/full/C_full.hsh"));
        state.advance_chain(2);
        state.history.push(HistoryEntry {
            timestamp: "2026-01-07T20:28:12+01:00".to_string(),
            backup_type: BackupType::Differential,
            file: PathBuf::from("/d/differential/C_diff.sna"),
            success: true,
        });
        state.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["differentialCount"], 2);
        assert_eq!(raw["history"][0]["type"], "differential");

        let loaded = CycleState::load(&path, &RunLog::new("t"));
        assert_eq!(loaded, state);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn loads_legacy_keys() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("backup_state.json");
        fs::write(
            &path,
            r#"{"last_full_backup": "E:/B/D_full_1.sna", "last_full_hash_file": "E:/B/D_full_1.hsh",
                "differential_count": 3,
                "backups": [{"timestamp": "2026-01-07T20:28:12.5", "type": "full", "file": "E:/B/D_full_1.sna", "success": true}]}"#,
        )
        .unwrap();
        let state = CycleState::load(&path, &RunLog::new("t"));
        assert_eq!(state.differentials(), 3);
        assert_eq!(state.companion(), Some(Path::new("E:/B/D_full_1.hsh")));
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn full_without_companion_loads_as_no_full() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("backup_state.json");
        fs::write(&path, r#"{"lastFull": "/d/full/C.sna", "differentialCount": 4}"#).unwrap();
        let state = CycleState::load(&path, &RunLog::new("t"));
        assert_eq!(state.chain, ChainState::NoFull);
        assert_eq!(state.differentials(), 0);
    }

    #[test]
    fn corrupt_state_warns_and_starts_fresh() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("backup_state.json");
        fs::write(&path, "{not json").unwrap();
        let log = RunLog::new("t");
        let state = CycleState::load(&path, &log);
        assert_eq!(state, CycleState::default());
        assert_eq!(log.count(LogLevel::Warning), 1);
    }
}
