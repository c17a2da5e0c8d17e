//! Append-only audit log
//!
//! Each run that found changes appends one block:
//!
//! ```text
//!
//! ================================================================================
//! Audit Log Entry - 2024-03-05 07:08:09
//! ================================================================================
//!
//! Timestamp: 2024-03-05 06:59:12
//! User: wasadmin
//! File: cells/was90cell/security.xml
//! Change Type: MODIFIED
//! Changes:
//!   Line 12 modified:
//!     Before: enabled="false"
//!     After:  enabled="true"
//! --------------------------------------------------------------------------------
//! ```
//!
//! The block is rendered in memory and written with a single append followed
//! by a data sync, so [`AuditLogWriter::append`] only returns `Ok` once the
//! bytes are durable.

use crate::error::{AuditError, Result};
use crate::types::AuditEntry;
use crate::utils;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Width of the banner and separator lines
pub const BANNER_WIDTH: usize = 80;

/// Appends formatted audit blocks to a log file
#[derive(Debug, Clone)]
pub struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    /// Create a writer for `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the audit log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one block for `entries` stamped with the current time
    pub fn append(&self, entries: &[AuditEntry]) -> Result<()> {
        self.append_at(entries, Local::now())
    }

    /// Append one block for `entries` stamped with `run_time`
    ///
    /// An empty slice writes nothing.
    pub fn append_at(&self, entries: &[AuditEntry], run_time: DateTime<Local>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let block = render_block(entries, &run_time);
        let write_failed = |source| AuditError::WriteFailed {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_failed)?;
        file.write_all(block.as_bytes()).map_err(write_failed)?;
        file.sync_data().map_err(write_failed)?;

        info!(
            "Audit log updated: {} ({} changes logged)",
            self.path.display(),
            entries.len()
        );
        Ok(())
    }
}

/// Render the text block for one run
pub fn render_block(entries: &[AuditEntry], run_time: &DateTime<Local>) -> String {
    let banner = "=".repeat(BANNER_WIDTH);
    let separator = "-".repeat(BANNER_WIDTH);
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", banner);
    let _ = writeln!(out, "Audit Log Entry - {}", utils::format_log_time(run_time));
    let _ = writeln!(out, "{}", banner);

    for entry in entries {
        let _ = writeln!(out);
        let _ = writeln!(out, "Timestamp: {}", utils::format_checkpoint_time(entry.checkpoint_key));
        let _ = writeln!(out, "User: {}", entry.user_id);
        let _ = writeln!(out, "File: {}", entry.file_path);
        let _ = writeln!(out, "Change Type: {}", entry.change_kind);
        let _ = writeln!(out, "Changes:");
        for change in &entry.changes {
            let _ = writeln!(out, "  {}", change);
        }
        let _ = writeln!(out, "{}", separator);
    }

    out
}
