use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, SnapcycleError};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
    pub timed_out: bool,
}

pub fn describe_command(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    format!("{} {}", program, args.join(" "))
}

/// Runs `cmd` to completion or until `timeout` elapses, killing it in the latter case.
///
/// Stdout and stderr are both captured into one anonymous temp file, so the
/// child can never block on a full pipe while we poll.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let mut capture = tempfile::tempfile()
        .map_err(|e| SnapcycleError::message(format!("capture output for {}: {}", program, e)))?;
    let stdout = capture
        .try_clone()
        .map_err(|e| SnapcycleError::message(format!("capture output for {}: {}", program, e)))?;
    let stderr = capture
        .try_clone()
        .map_err(|e| SnapcycleError::message(format!("capture output for {}: {}", program, e)))?;

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|e| SnapcycleError::message(format!("{}: {}", program, e)))?;

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                thread::sleep(POLL_INTERVAL.min(timeout));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(SnapcycleError::message(format!("wait for {}: {}", program, e)));
            }
        }
    };

    let mut raw = Vec::new();
    capture
        .seek(SeekFrom::Start(0))
        .and_then(|_| capture.read_to_end(&mut raw))
        .map_err(|e| SnapcycleError::message(format!("read output of {}: {}", program, e)))?;
    let output = String::from_utf8_lossy(&raw).to_string();

    Ok(match status {
        Some(status) => CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            output,
            timed_out: false,
        },
        None => CommandOutput {
            exit_code: -1,
            output,
            timed_out: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_exit_code_and_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2; exit 3");
        let result = run_with_timeout(&mut cmd, Duration::from_secs(10)).expect("run");
        assert_eq!(result.exit_code, 3);
        assert!(!result.timed_out);
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[test]
    fn kills_child_after_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result = run_with_timeout(&mut cmd, Duration::from_millis(100)).expect("run");
        assert!(result.timed_out);
        assert_eq!(result.exit_code, -1);
    }

    #[test]
    fn missing_program_is_an_error() {
        let mut cmd = Command::new("/nonexistent/snapcycle-imaging-tool");
        assert!(run_with_timeout(&mut cmd, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn describe_joins_program_and_args() {
        let mut cmd = Command::new("snapshot");
        cmd.arg("C:").arg("/backups/C_full.sna");
        assert_eq!(describe_command(&cmd), "snapshot C: /backups/C_full.sna");
    }
}
