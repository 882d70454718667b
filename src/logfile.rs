/// Per-component persistent log files.
///
/// Each long-running component (command runner, log streamer, startup
/// monitor) owns an explicit `LogFile` handle passed in at construction.
/// Lines are timestamped, tagged `INFO:`/`WARN:`/`ERROR:`, and appended
/// for the duration of a run; files are never rotated or truncated.
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl LogFile {
    /// Open (or create) an append-mode log file at the given path.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, msg: &str) {
        self.write_line("INFO", msg);
    }

    pub fn warn(&self, msg: &str) {
        self.write_line("WARN", msg);
    }

    pub fn error(&self, msg: &str) {
        self.write_line("ERROR", msg);
    }

    fn write_line(&self, level: &str, msg: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{stamp} - {level}: {msg}\n");
        // A failed append is not worth killing the run over; surface it on
        // the console and move on.
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(path = %self.path.display(), error = %e, "log file append failed");
        }
    }
}
