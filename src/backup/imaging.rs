use std::path::Path;
use std::process::Command;

use crate::config::model::ImagingSettings;
use crate::journal::RunLog;
use crate::util::command::{describe_command, run_with_timeout};

#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub source: &'a str,
    pub destination: &'a Path,
    /// Companion of the base full; set for differentials only.
    pub companion: Option<&'a Path>,
    pub verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutcome {
    /// Negative when the tool could not be started or was killed.
    pub exit_code: i32,
    pub output: String,
}

impl ImageOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The external program that writes image files.
pub trait ImagingTool {
    fn create_image(&self, request: &ImageRequest<'_>, log: &RunLog) -> ImageOutcome;
}

/// Runs the configured snapshot command:
/// `<command> <source> <destination> [<companion_flag><companion>] <extra_args...> [<verify_flag>]`.
#[derive(Debug, Clone)]
pub struct SnapshotCommand {
    settings: ImagingSettings,
}

impl SnapshotCommand {
    pub fn new(settings: ImagingSettings) -> Self {
        Self { settings }
    }

    pub fn build_command(&self, request: &ImageRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.settings.command);
        cmd.arg(request.source).arg(request.destination);
        if let Some(companion) = request.companion {
            let mut flag = std::ffi::OsString::from(&self.settings.companion_flag);
            flag.push(companion.as_os_str());
            cmd.arg(flag);
        }
        cmd.args(&self.settings.extra_args);
        if request.verify && !self.settings.verify_flag.is_empty() {
            cmd.arg(&self.settings.verify_flag);
        }
        cmd
    }
}

impl ImagingTool for SnapshotCommand {
    fn create_image(&self, request: &ImageRequest<'_>, log: &RunLog) -> ImageOutcome {
        let mut cmd = self.build_command(request);
        log.info(format!("running: {}", describe_command(&cmd)));
        match run_with_timeout(&mut cmd, self.settings.timeout) {
            Ok(out) if out.timed_out => {
                log.error(format!(
                    "imaging timed out after {} s and was killed",
                    self.settings.timeout.as_secs()
                ));
                ImageOutcome {
                    exit_code: -1,
                    output: format!("timed out after {} s\n{}", self.settings.timeout.as_secs(), out.output),
                }
            }
            Ok(out) => {
                for line in out.output.lines().filter(|l| !l.trim().is_empty()) {
                    tracing::debug!("imaging: {}", line);
                }
                ImageOutcome {
                    exit_code: out.exit_code,
                    output: out.output,
                }
            }
            Err(err) => {
                log.error(format!("imaging could not run: {}", err));
                ImageOutcome {
                    exit_code: -1,
                    output: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(command: PathBuf) -> ImagingSettings {
        ImagingSettings {
            command,
            extra_args: vec!["-W".to_string()],
            verify_flag: "-T".to_string(),
            companion_flag: "-h".to_string(),
            image_extension: "sna".to_string(),
            companion_extension: "hsh".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn full_and_differential_argument_layout() {
        let tool = SnapshotCommand::new(settings(PathBuf::from("snapshot64")));
        let full = tool.build_command(&ImageRequest {
            source: "C:",
            destination: Path::new("/b/C_full.sna"),
            companion: None,
            verify: true,
        });
        assert_eq!(args_of(&full), vec!["C:", "/b/C_full.sna", "-W", "-T"]);

        let diff = tool.build_command(&ImageRequest {
            source: "C:",
            destination: Path::new("/b/C_diff.sna"),
            companion: Some(Path::new("/b/C_full.hsh")),
            verify: false,
        });
        assert_eq!(args_of(&diff), vec!["C:", "/b/C_diff.sna", "-h/b/C_full.hsh", "-W"]);
    }

    #[test]
    fn runs_the_tool_and_reports_exit_code() {
        let dir = TempDir::new().expect("tempdir");
        // `sh <script> <destination> -W` runs the script with the destination as $1
        let script = dir.path().join("snapshot.sh");
        fs::write(&script, "echo \"$@\" > \"$1\"\necho done\nexit 3\n").unwrap();

        let tool = SnapshotCommand::new(settings(PathBuf::from("/bin/sh")));
        let dest = dir.path().join("img.sna");
        let source = script.to_string_lossy().to_string();
        let outcome = tool.create_image(
            &ImageRequest {
                source: &source,
                destination: &dest,
                companion: None,
                verify: false,
            },
            &RunLog::new("t"),
        );
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
        assert!(outcome.output.contains("done"));
        let written = fs::read_to_string(&dest).unwrap();
        assert!(written.trim_end().ends_with("-W"));
    }

    #[test]
    fn missing_tool_is_a_failed_outcome() {
        let tool = SnapshotCommand::new(settings(PathBuf::from("/nonexistent/snapshot64")));
        let outcome = tool.create_image(
            &ImageRequest {
                source: "C:",
                destination: Path::new("/tmp/never.sna"),
                companion: None,
                verify: true,
            },
            &RunLog::new("t"),
        );
        assert_eq!(outcome.exit_code, -1);
    }
}
