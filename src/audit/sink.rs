//! Append-only storage backends for audit lines.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Durable, ordered, append-only line store.
///
/// Implementations only ever add lines; there is no way to edit or remove one.
pub trait AuditSink: Send {
    /// Persist one line. Returns only once the line is durable.
    ///
    /// A failed call should leave nothing behind. Callers still check
    /// [`AuditSink::read_lines`] before retrying, since a sink may fail after
    /// the line was stored.
    fn append_line(&mut self, line: &str) -> io::Result<()>;

    /// Every stored line, oldest first.
    fn read_lines(&self) -> io::Result<Vec<String>>;
}

/// Newline-delimited file opened in append mode and synced after each line.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open (creating if needed) the log file and its parent directory.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileSink {
    /// Writes the line and syncs. On failure the file is cut back to its
    /// previous length, so a partial or unsynced line never stays behind.
    fn append_line(&mut self, line: &str) -> io::Result<()> {
        let start = self.file.metadata()?.len();
        let mut buf = String::with_capacity(line.len().saturating_add(1));
        buf.push_str(line);
        buf.push('\n');

        let written = self
            .file
            .write_all(buf.as_bytes())
            .and_then(|()| self.file.sync_data());
        if let Err(err) = written {
            if let Err(rollback) = self.file.set_len(start) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "could not roll back failed audit write"
                );
            }
            return Err(err);
        }
        Ok(())
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_owned)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// In-memory sink. Clones share the same lines, so a test can keep a handle.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
    failures: Arc<AtomicU32>,
    late_failures: Arc<AtomicU32>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail with an I/O error.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` appends store their line and then fail, like a
    /// write that landed but could not be synced.
    pub fn fail_after_write_next(&self, count: u32) {
        self.late_failures.store(count, Ordering::SeqCst);
    }

    /// Snapshot of stored lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemorySink {
    fn append_line(&mut self, line: &str) -> io::Result<()> {
        if take_one(&self.failures) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected sink failure"));
        }
        self.lines
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink lock poisoned"))?
            .push(line.to_owned());
        if take_one(&self.late_failures) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected sync failure"));
        }
        Ok(())
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink lock poisoned"))
    }
}

/// Decrement `counter` if it is positive. True when it was.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
