//! Status log: every info-and-above record is appended to a plain text file with a local
//! timestamp, in addition to whatever the wrapped logger does with it. `!logs` reads the tail.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Format one status-log line (no trailing newline).
pub fn format_status_line(now: chrono::DateTime<chrono::Local>, message: &str) -> String {
    format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S"), message)
}

/// Last `n` lines of `data`, trimmed as a whole before splitting, in original order.
pub fn tail_text(data: &str, n: usize) -> String {
    let lines: Vec<&str> = data.trim().split('\n').collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Read the status log and return its tail.
pub async fn read_tail(path: &Path, n: usize) -> std::io::Result<String> {
    let data = tokio::fs::read_to_string(path).await?;
    Ok(tail_text(&data, n))
}

/// Logger that forwards to `inner` and mirrors info-and-above records into the status log.
pub struct StatusLogger<L> {
    inner: L,
    path: PathBuf,
    file: Mutex<File>,
}

impl<L: Log> StatusLogger<L> {
    /// Open (creating parent directories) the status log for appending.
    pub fn open(inner: L, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            inner,
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, message: &str) {
        let line = format_status_line(chrono::Local::now(), message);
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "{}", line);
        }
    }
}

impl<L: Log> Log for StatusLogger<L> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }
        if record.level() <= Level::Info {
            self.append(&record.args().to_string());
        }
    }

    fn flush(&self) {
        self.inner.flush();
        if let Ok(mut f) = self.file.lock() {
            let _ = f.flush();
        }
    }
}

/// Install `logger` globally. The effective max level is at least Info so the status log is
/// always written, even when the wrapped logger filters more strictly.
pub fn install<L: Log + 'static>(
    logger: StatusLogger<L>,
    inner_max: LevelFilter,
) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(inner_max.max(LevelFilter::Info));
    Ok(())
}
