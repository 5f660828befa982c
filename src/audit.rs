//! Append-only audit log for per-document processing events.
//!
//! The sink is an explicit object handed to the substitution engine and the
//! pipeline, so several documents can be processed concurrently against one
//! log file. Writes are serialized behind a mutex.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the audit log created in each output directory.
pub const AUDIT_LOG_NAME: &str = "pseudollm.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
}

impl AuditLevel {
    fn label(self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warn => "WARN",
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, level: AuditLevel, message: &str);

    fn info(&self, message: &str) {
        self.record(AuditLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.record(AuditLevel::Warn, message);
    }
}

/// Audit log backed by a plain-text file, one timestamped line per event.
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditLog {
    /// Open (or create) the log at `path` in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open the standard audit log inside `dir`.
    pub fn in_dir(dir: &Path) -> Result<Self> {
        Self::open(&dir.join(AUDIT_LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditLog {
    fn record(&self, level: AuditLevel, message: &str) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        // Multi-line messages stay one event per line in the file.
        let flat = message.replace('\n', " ");
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{} {} {}", now, level.label(), flat) {
            log::warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }
}

/// Forwards events to another sink, prefixed with the document they belong
/// to, so lines from documents processed concurrently stay attributable.
pub struct DocumentAudit<'a> {
    document: &'a str,
    inner: &'a dyn AuditSink,
}

impl<'a> DocumentAudit<'a> {
    pub fn new(document: &'a str, inner: &'a dyn AuditSink) -> Self {
        Self { document, inner }
    }
}

impl AuditSink for DocumentAudit<'_> {
    fn record(&self, level: AuditLevel, message: &str) {
        self.inner
            .record(level, &format!("[{}] {}", self.document, message));
    }
}

/// In-memory audit log, for callers that want to inspect events directly.
#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<(AuditLevel, String)>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(AuditLevel, String)> {
        match self.events.lock() {
            Ok(e) => e.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(level, _)| *level == AuditLevel::Warn)
            .map(|(_, msg)| msg)
            .collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, level: AuditLevel, message: &str) {
        let mut events = match self.events.lock() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_audit_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = FileAuditLog::in_dir(dir.path()).unwrap();
            log.info("Processing file: a.txt");
            log.warn("Mismatch:\nexpected 2");
        }
        {
            let log = FileAuditLog::in_dir(dir.path()).unwrap();
            log.info("Processing file: b.txt");
        }
        let content = std::fs::read_to_string(dir.path().join(AUDIT_LOG_NAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("INFO Processing file: a.txt"));
        assert!(lines[1].ends_with("WARN Mismatch: expected 2"));
        assert!(lines[2].ends_with("INFO Processing file: b.txt"));
    }

    #[test]
    fn test_document_audit_prefixes_events() {
        let log = MemoryAuditLog::new();
        let doc = DocumentAudit::new("a.txt", &log);
        doc.info("Found 2 entities");
        doc.warn("Mismatch");
        assert_eq!(
            log.events(),
            vec![
                (AuditLevel::Info, "[a.txt] Found 2 entities".to_string()),
                (AuditLevel::Warn, "[a.txt] Mismatch".to_string()),
            ]
        );
    }

    #[test]
    fn test_memory_audit_log() {
        let log = MemoryAuditLog::new();
        log.info("one");
        log.warn("two");
        assert_eq!(log.events().len(), 2);
        assert_eq!(log.warnings(), vec!["two".to_string()]);
    }
}
