use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::backup::cycles::{BackupCycle, CycleReconstructor};
use crate::backup::imaging::{ImageRequest, ImagingTool};
use crate::backup::naming::ArtifactNaming;
use crate::backup::retention::{CleanupReport, RetentionPlanner};
use crate::backup::space::{last_cycle_size, SpaceAssessment, SpacePlanner};
use crate::backup::state::{ChainState, CycleState, HistoryEntry};
use crate::backup::BackupLayout;
use crate::config::model::RuntimeConfig;
use crate::disk::space::SpaceProbe;
use crate::disk::TargetDisk;
use crate::error::{ConfigError, Result};
use crate::journal::RunLog;
use crate::types::BackupType;
use crate::util::format::{human_duration, human_size};

const ERROR_TAIL_CHARS: usize = 2000;

/// Where the chain stands before a run; derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainPhase {
    NoFullYet,
    ChainExhausted { differentials: u32 },
    ChainActive { companion: PathBuf, next_sequence: u32 },
}

pub fn chain_phase(state: &CycleState, max_differentials: u32) -> ChainPhase {
    match &state.chain {
        ChainState::NoFull => ChainPhase::NoFullYet,
        ChainState::Active { companion, .. } if !companion.exists() => ChainPhase::NoFullYet,
        ChainState::Active { differentials, .. } if *differentials >= max_differentials => {
            ChainPhase::ChainExhausted {
                differentials: *differentials,
            }
        }
        ChainState::Active {
            companion,
            differentials,
            ..
        } => ChainPhase::ChainActive {
            companion: companion.clone(),
            next_sequence: differentials + 1,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupPlan {
    Full,
    Differential { companion: PathBuf, sequence: u32 },
}

impl BackupPlan {
    pub fn backup_type(&self) -> BackupType {
        match self {
            BackupPlan::Full => BackupType::Full,
            BackupPlan::Differential { .. } => BackupType::Differential,
        }
    }
}

/// Chooses the next backup. A forced differential needs an existing companion.
pub fn decide(
    state: &CycleState,
    max_differentials: u32,
    forced: Option<BackupType>,
    log: &RunLog,
) -> Result<BackupPlan> {
    let phase = chain_phase(state, max_differentials);
    match forced {
        Some(BackupType::Full) => {
            log.info("full backup forced");
            return Ok(BackupPlan::Full);
        }
        Some(BackupType::Differential) => {
            return match state.companion() {
                Some(companion) if companion.exists() => {
                    log.info("differential backup forced");
                    Ok(BackupPlan::Differential {
                        companion: companion.to_path_buf(),
                        sequence: state.differentials() + 1,
                    })
                }
                _ => Err(ConfigError::Invalid(
                    "cannot force a differential backup: no full backup with a companion file".to_string(),
                )
                .into()),
            };
        }
        None => {}
    }
    Ok(match phase {
        ChainPhase::NoFullYet => {
            match state.companion() {
                Some(companion) => log.info(format!(
                    "companion {} missing, full backup",
                    companion.display()
                )),
                None => log.info("no previous full backup, full backup"),
            }
            BackupPlan::Full
        }
        ChainPhase::ChainExhausted { differentials } => {
            log.info(format!(
                "differential limit reached ({}/{}), full backup",
                differentials, max_differentials
            ));
            BackupPlan::Full
        }
        ChainPhase::ChainActive {
            companion,
            next_sequence,
        } => {
            log.info(format!(
                "differential backup {}/{}",
                next_sequence, max_differentials
            ));
            BackupPlan::Differential {
                companion,
                sequence: next_sequence,
            }
        }
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskSummary {
    pub id: String,
    pub name: String,
    pub mount_point: PathBuf,
}

impl From<&TargetDisk> for DiskSummary {
    fn from(disk: &TargetDisk) -> Self {
        Self {
            id: disk.identity.id.to_string(),
            name: disk.identity.name.clone(),
            mount_point: disk.mount_point.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub success: bool,
    pub backup_type: BackupType,
    pub source: String,
    pub target_dir: PathBuf,
    pub image_file: PathBuf,
    pub companion_file: PathBuf,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration_seconds: f64,
    pub exit_code: i32,
    pub error_message: Option<String>,
    pub file_size_bytes: u64,
    pub differential_number: u32,
    pub max_differentials: u32,
    pub disk: DiskSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupPreview {
    pub backup_type: BackupType,
    pub image_file: PathBuf,
    pub companion_file: PathBuf,
    pub space: SpaceAssessment,
    pub cleanup: CleanupReport,
}

pub struct BackupOrchestrator<'a> {
    config: &'a RuntimeConfig,
    disk: &'a TargetDisk,
    layout: BackupLayout,
    naming: ArtifactNaming,
    tool: &'a dyn ImagingTool,
    probe: &'a dyn SpaceProbe,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        config: &'a RuntimeConfig,
        disk: &'a TargetDisk,
        tool: &'a dyn ImagingTool,
        probe: &'a dyn SpaceProbe,
    ) -> Result<Self> {
        let layout = BackupLayout::new(&disk.base_path, &config.host_label, &config.source_label)?;
        Ok(Self {
            naming: ArtifactNaming::from_settings(&config.source_label, &config.imaging),
            config,
            disk,
            layout,
            tool,
            probe,
        })
    }

    pub fn layout(&self) -> &BackupLayout {
        &self.layout
    }

    pub fn load_state(&self, log: &RunLog) -> CycleState {
        CycleState::load(&self.layout.state_file, log)
    }

    pub fn cycles(&self) -> Vec<BackupCycle> {
        self.reconstructor()
            .reconstruct(&self.layout.full_dir, &self.layout.differential_dir)
    }

    pub fn reconstructor(&self) -> CycleReconstructor {
        CycleReconstructor::new(self.naming.clone())
    }

    /// Retention that never condemns the chain differentials are still built on.
    pub fn retention(&self, state: &CycleState) -> RetentionPlanner {
        RetentionPlanner::new(self.config.keep_cycles).protecting(state.full())
    }

    pub fn space_planner(&self) -> SpacePlanner<'a> {
        SpacePlanner::new(self.probe, self.config.space_reserve_percent)
    }

    pub fn assess_space(&self) -> Result<SpaceAssessment> {
        let cycles = self.cycles();
        Ok(self
            .space_planner()
            .assess(&self.layout.root, last_cycle_size(&cycles))?)
    }

    pub fn run(&self, forced: Option<BackupType>, log: &RunLog) -> Result<BackupResult> {
        self.run_at(Local::now(), forced, log)
    }

    /// One backup attempt. Imaging failures come back as an unsuccessful
    /// result; errors mean nothing was attempted or the state could not be saved.
    pub fn run_at(
        &self,
        started_at: DateTime<Local>,
        forced: Option<BackupType>,
        log: &RunLog,
    ) -> Result<BackupResult> {
        let mut state = self.load_state(log);
        let plan = decide(&state, self.config.max_differentials, forced, log)?;

        self.layout.ensure_dirs()?;
        self.space_planner().ensure_space(
            &self.layout,
            &self.reconstructor(),
            &self.retention(&state),
            log,
        )?;

        let (image_file, companion_file) = self.artifact_paths(&plan, &started_at);
        log.info(format!("starting {} backup", plan.backup_type()));
        log.info(format!("  source: {}", self.config.source));
        log.info(format!("  image: {}", image_file.display()));

        let companion_arg = match &plan {
            BackupPlan::Full => None,
            BackupPlan::Differential { companion, .. } => Some(companion.as_path()),
        };
        let outcome = self.tool.create_image(
            &ImageRequest {
                source: &self.config.source,
                destination: &image_file,
                companion: companion_arg,
                verify: self.config.verify,
            },
            log,
        );
        let finished_at = Local::now();
        let success = outcome.success();

        if success {
            match &plan {
                BackupPlan::Full => state.start_chain(image_file.clone(), companion_file.clone()),
                BackupPlan::Differential { sequence, .. } => state.advance_chain(*sequence),
            }
        }
        state.history.push(HistoryEntry {
            timestamp: started_at.to_rfc3339(),
            backup_type: plan.backup_type(),
            file: image_file.clone(),
            success,
        });
        state.save(&self.layout.state_file)?;
        log.info(format!("state saved: {}", self.layout.state_file.display()));

        let file_size_bytes = fs::metadata(&image_file).map(|m| m.len()).unwrap_or(0);
        let duration_seconds = (finished_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let error_message = if success {
            None
        } else {
            Some(error_tail(&outcome.output, outcome.exit_code))
        };

        if success {
            log.success("backup finished");
            log.info(format!("  type: {}", plan.backup_type()));
            log.info(format!("  file: {}", image_file.display()));
            log.info(format!("  size: {}", human_size(file_size_bytes)));
            log.info(format!("  duration: {}", human_duration(duration_seconds)));
        } else {
            log.error(format!("backup failed (exit code {})", outcome.exit_code));
        }

        Ok(BackupResult {
            success,
            backup_type: plan.backup_type(),
            source: self.config.source.clone(),
            target_dir: self.layout.root.clone(),
            image_file,
            companion_file,
            started_at,
            finished_at,
            duration_seconds,
            exit_code: outcome.exit_code,
            error_message,
            file_size_bytes,
            differential_number: state.differentials(),
            max_differentials: self.config.max_differentials,
            disk: DiskSummary::from(self.disk),
        })
    }

    /// What a run would do right now. Touches nothing on disk.
    pub fn preview(&self, forced: Option<BackupType>, log: &RunLog) -> Result<BackupPreview> {
        let state = self.load_state(log);
        let plan = decide(&state, self.config.max_differentials, forced, log)?;
        let (image_file, companion_file) = self.artifact_paths(&plan, &Local::now());
        log.info("dry run");
        log.info(format!("  would run: {} backup", plan.backup_type()));
        log.info(format!("  source: {}", self.config.source));
        log.info(format!("  image: {}", image_file.display()));

        let cycles = self.cycles();
        let planner = self.space_planner();
        let space = planner.assess(&self.layout.root, last_cycle_size(&cycles))?;
        planner.log_assessment(&self.layout.root, &space, log);

        let retention = self.retention(&state);
        let decision = retention.plan(cycles);
        let cleanup = retention.execute(&decision, true, log);
        Ok(BackupPreview {
            backup_type: plan.backup_type(),
            image_file,
            companion_file,
            space,
            cleanup,
        })
    }

    fn artifact_paths(&self, plan: &BackupPlan, at: &DateTime<Local>) -> (PathBuf, PathBuf) {
        match plan {
            BackupPlan::Full => {
                let image = self.layout.full_dir.join(self.naming.full_name(at));
                let companion = self.naming.companion_for(&image);
                (image, companion)
            }
            BackupPlan::Differential {
                companion,
                sequence,
            } => (
                self.layout
                    .differential_dir
                    .join(self.naming.differential_name(at, *sequence)),
                companion.clone(),
            ),
        }
    }
}

fn error_tail(output: &str, exit_code: i32) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return format!("exit code {}", exit_code);
    }
    let count = trimmed.chars().count();
    if count <= ERROR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - ERROR_TAIL_CHARS).collect()
}
