//! Per-run session log.
//!
//! Every component receives a `&RunLog` instead of reaching for global state.
//! Each entry is forwarded to `tracing` for the console, kept in memory for
//! the run summary, and, once a directory is attached, appended to a plain
//! text log file on the backup disk.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::{Result, SnapcycleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Default)]
struct Sink {
    text: Option<File>,
    text_path: Option<PathBuf>,
    json_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RunLog {
    session_id: String,
    entries: Mutex<Vec<LogEntry>>,
    sink: Mutex<Sink>,
}

impl RunLog {
    /// A log that only records in memory and forwards to `tracing`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Mutex::new(Vec::new()),
            sink: Mutex::new(Sink::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Starts mirroring entries into `backup_<ts>.log` under `dir`.
    ///
    /// Entries recorded before attaching are replayed into the new file so the
    /// on-disk log covers the whole session.
    pub fn attach_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|e| SnapcycleError::message(format!("create {}: {}", dir.display(), e)))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let text_path = dir.join(format!("backup_{}.log", stamp));
        let json_path = dir.join(format!("backup_{}.json", stamp));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&text_path)
            .map_err(|e| SnapcycleError::message(format!("open {}: {}", text_path.display(), e)))?;

        writeln!(file, "=== snapcycle session {} ===", self.session_id)
            .map_err(|e| SnapcycleError::message(format!("write {}: {}", text_path.display(), e)))?;
        for entry in self.entries().iter() {
            writeln!(file, "{}", format_line(entry))
                .map_err(|e| SnapcycleError::message(format!("write {}: {}", text_path.display(), e)))?;
        }

        let mut sink = self.lock_sink();
        sink.text = Some(file);
        sink.text_path = Some(text_path.clone());
        sink.json_path = Some(json_path);
        Ok(text_path)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.record(LogLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.record(LogLevel::Success, message.into());
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries().iter().filter(|e| e.level == level).count()
    }

    /// Writes `{session_id, entries, result}` next to the text log.
    ///
    /// Returns `None` when no directory is attached.
    pub fn save_json<T: Serialize>(&self, result: &T) -> Result<Option<PathBuf>> {
        let path = match self.lock_sink().json_path.clone() {
            Some(path) => path,
            None => return Ok(None),
        };
        let document = serde_json::json!({
            "session_id": self.session_id,
            "entries": self.entries(),
            "result": result,
        });
        let data = serde_json::to_string_pretty(&document)
            .map_err(|e| SnapcycleError::message(format!("encode session log: {}", e)))?;
        fs::write(&path, data)
            .map_err(|e| SnapcycleError::message(format!("write {}: {}", path.display(), e)))?;
        self.info(format!("session log saved: {}", path.display()));
        Ok(Some(path))
    }

    fn record(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        let entry = LogEntry {
            timestamp: Local::now(),
            level,
            message,
        };
        {
            let mut sink = self.lock_sink();
            let failed = match sink.text.as_mut() {
                Some(file) => writeln!(file, "{}", format_line(&entry)).is_err(),
                None => false,
            };
            if failed {
                // Stop mirroring rather than failing every subsequent entry.
                if let Some(path) = sink.text_path.take() {
                    tracing::warn!("text log {} is no longer writable", path.display());
                }
                sink.text = None;
            }
        }
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    fn lock_sink(&self) -> std::sync::MutexGuard<'_, Sink> {
        match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn format_line(entry: &LogEntry) -> String {
    format!(
        "[{}] {}: {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.level.as_str(),
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detached_log_records_in_memory() {
        let log = RunLog::new("s1");
        log.info("hello");
        log.warning("careful");
        log.error("broken");
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.count(LogLevel::Warning), 1);
        assert_eq!(log.count(LogLevel::Error), 1);
        assert!(log.save_json(&"nothing").unwrap().is_none());
    }

    #[test]
    fn attached_log_replays_and_mirrors_entries() {
        let dir = TempDir::new().expect("tempdir");
        let log = RunLog::new("s2");
        log.info("before attach");
        let text = log.attach_dir(&dir.path().join("logs")).expect("attach");
        log.success("after attach");

        let contents = fs::read_to_string(&text).expect("read");
        assert!(contents.contains("INFO: before attach"));
        assert!(contents.contains("SUCCESS: after attach"));

        let json = log.save_json(&serde_json::json!({"ok": true})).unwrap().unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(parsed["session_id"], "s2");
        assert_eq!(parsed["result"]["ok"], true);
        assert_eq!(parsed["entries"][0]["level"], "INFO");
    }
}
