//! Audit Store
//!
//! Append-only JSONL file. Each entry is serialised to one line and written
//! with a single `write_all` on an `O_APPEND` handle while holding the writer
//! lock, so concurrent appends never interleave or overwrite each other.
//!
//! Reading is lossy on purpose: an unreadable file yields an empty history and
//! corrupt lines are skipped one by one.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::types::{AuditEntry, AuditError};

pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<File>,
    entries_written: AtomicU64,
}

impl AuditLog {
    /// Open (or create) the log for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("Audit log: {:?}", path);

        Ok(Self {
            path,
            writer: Mutex::new(file),
            entries_written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one entry
    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        {
            let mut file = self.writer.lock();
            file.write_all(line.as_bytes())?;
            file.sync_data()?;
        }

        self.entries_written.fetch_add(1, Ordering::Relaxed);
        log::info!("[AUDIT] {} {} {}", entry.subject, entry.category, entry.status);
        Ok(())
    }

    /// Append, logging instead of propagating failures. Per-event audit errors
    /// must not stop the pipeline.
    pub fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.append(&entry) {
            log::error!("Failed to write audit entry for {}: {}", entry.subject, e);
        }
    }

    /// Every entry, in write order
    pub fn read_all(&self) -> Vec<AuditEntry> {
        let _guard = self.writer.lock();
        read_entries(&self.path)
    }

    /// Entries appended through this handle
    pub fn entries_written(&self) -> u64 {
        self.entries_written.load(Ordering::Relaxed)
    }
}

// ============================================================================
// READ PATH
// ============================================================================

/// Read a log file, skipping lines that do not decode
pub fn read_entries(path: &Path) -> Vec<AuditEntry> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Audit log {:?} unreadable ({}), treating history as empty", path, e);
            }
            return Vec::new();
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    let mut lineno = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => lineno += 1,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Audit log read stopped at line {}: {}", lineno + 1, e);
                break;
            }
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} corrupt audit line(s) in {:?}", skipped, path);
    }
    entries
}

pub fn most_recent_first(mut entries: Vec<AuditEntry>, limit: usize) -> Vec<AuditEntry> {
    entries.reverse();
    entries.truncate(limit);
    entries
}

/// Summary counts for the dashboard
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStats {
    pub total_entries: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub oldest_entry: Option<String>,
    pub newest_entry: Option<String>,
}

pub fn summarize(entries: &[AuditEntry]) -> AuditStats {
    let mut stats = AuditStats {
        total_entries: entries.len(),
        oldest_entry: entries.first().map(|e| e.timestamp.to_string()),
        newest_entry: entries.last().map(|e| e.timestamp.to_string()),
        ..Default::default()
    };

    for entry in entries {
        *stats.by_category.entry(entry.category.clone()).or_insert(0) += 1;
        *stats.by_status.entry(entry.status.clone()).or_insert(0) += 1;
    }
    stats
}
