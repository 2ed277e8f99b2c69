use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::AuditSinkError;

/// Destination for structured audit event lines.
///
/// Contract (spec.md §6): one JSON object per line, appended atomically.
/// Implementations must not interleave partial lines from concurrent writers.
pub trait AuditSink: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), AuditSinkError>;
}

/// Writes one JSON line per event to process stdout. Default sink.
#[derive(Debug, Default)]
pub struct StdoutSink {
    lock: Mutex<()>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditSink for StdoutSink {
    fn write_line(&self, line: &str) -> Result<(), AuditSinkError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut stdout = std::io::stdout();
        writeln!(stdout, "{line}")?;
        Ok(())
    }
}

/// Appends one JSON line per event to a file, opened once at construction.
/// Each write is a single `write_all` call under a mutex, matching the
/// "atomic per-line writes" contract in spec.md §6.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditSinkError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl AuditSink for FileSink {
    fn write_line(&self, line: &str) -> Result<(), AuditSinkError> {
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
