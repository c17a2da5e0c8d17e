//! Core data types shared across the audit pipeline
//!
//! ## Overview
//!
//! - **Discovery**: [`Checkpoint`], [`CheckpointKey`] identify one administrative change
//! - **Diffing**: [`DiffEntry`], [`ChangeKind`] describe what changed inside a file
//! - **Output**: [`AuditEntry`], [`RunReport`] carry the results of a run
//!
//! ## Examples
//!
//! ```rust
//! use checkpoint_audit::types::{ChangeKind, DiffEntry};
//!
//! let script = vec![DiffEntry::Added { line: 1, content: "x".to_string() }];
//! assert_eq!(ChangeKind::classify(&script), Some(ChangeKind::Added));
//! assert_eq!(ChangeKind::classify(&[]), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Ordering key of a checkpoint (epoch milliseconds in the naming convention)
pub type CheckpointKey = u64;

/// Attribution used when a checkpoint carries no `user.id`
pub const UNKNOWN_USER: &str = "Unknown";

/// A checkpoint discovered in the checkpoint directory
///
/// Identified by its directory name; ordered by `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Directory name, e.g. `Delta-1700000000000`
    pub name: String,
    /// Ordering key parsed from the name
    pub key: CheckpointKey,
    /// Absolute path of the checkpoint directory
    pub path: PathBuf,
}

impl Checkpoint {
    /// Create a checkpoint reference
    pub fn new(name: impl Into<String>, key: CheckpointKey, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            key,
            path: path.into(),
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One line-level edit produced by the diff engine
///
/// `line` is 1-based. For `Added` and `Modified` it refers to the "after"
/// sequence; for `Deleted` it refers to the "before" sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffEntry {
    /// Line present only in the after sequence
    Added {
        /// Position in the after sequence
        line: usize,
        /// Line text
        content: String,
    },
    /// Line present only in the before sequence
    Deleted {
        /// Position in the before sequence
        line: usize,
        /// Line text
        content: String,
    },
    /// Adjacent delete/add pair merged into an in-place change
    Modified {
        /// Position in the after sequence
        line: usize,
        /// Old text
        before: String,
        /// New text
        after: String,
    },
}

impl DiffEntry {
    /// Line position this entry is keyed at
    pub fn line(&self) -> usize {
        match self {
            DiffEntry::Added { line, .. }
            | DiffEntry::Deleted { line, .. }
            | DiffEntry::Modified { line, .. } => *line,
        }
    }

    /// Human-readable description lines for the audit log
    ///
    /// `Modified` entries expand to three lines (header, before, after).
    pub fn describe(&self) -> Vec<String> {
        match self {
            DiffEntry::Added { line, content } => vec![format!("Line {} added: {}", line, content)],
            DiffEntry::Deleted { line, content } => {
                vec![format!("Line {} deleted: {}", line, content)]
            }
            DiffEntry::Modified { line, before, after } => vec![
                format!("Line {} modified:", line),
                format!("  Before: {}", before),
                format!("  After:  {}", after),
            ],
        }
    }
}

/// Classification of a changed path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// File created, or only lines added
    Added,
    /// File removed, or only lines deleted
    Deleted,
    /// Any in-place change or a mix of additions and deletions
    Modified,
}

impl ChangeKind {
    /// Classify a (merged) edit script
    ///
    /// Returns `None` for an empty script, meaning the file is unchanged.
    pub fn classify(entries: &[DiffEntry]) -> Option<ChangeKind> {
        if entries.is_empty() {
            return None;
        }
        let all_added = entries.iter().all(|e| matches!(e, DiffEntry::Added { .. }));
        let all_deleted = entries.iter().all(|e| matches!(e, DiffEntry::Deleted { .. }));

        Some(if all_added {
            ChangeKind::Added
        } else if all_deleted {
            ChangeKind::Deleted
        } else {
            ChangeKind::Modified
        })
    }

    /// Label written to the audit log
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "ADDED",
            ChangeKind::Deleted => "DELETED",
            ChangeKind::Modified => "MODIFIED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record: a changed path within one checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Ordering key of the checkpoint the change belongs to
    pub checkpoint_key: CheckpointKey,
    /// User credited with the change
    pub user_id: String,
    /// `/`-separated path relative to the snapshot root
    pub file_path: String,
    /// Classification of the change
    pub change_kind: ChangeKind,
    /// Ordered description lines
    pub changes: Vec<String>,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Checkpoints found in the directory
    pub discovered: usize,
    /// Checkpoints newer than the incoming cursor
    pub selected: usize,
    /// Checkpoints that were extracted and diffed successfully
    pub processed: usize,
    /// Checkpoints skipped because of a per-checkpoint failure
    pub failed: Vec<String>,
    /// Audit entries appended to the log
    pub entries_written: usize,
    /// Cursor after the run
    pub cursor: CheckpointKey,
    /// Whether the cursor store was written during this run
    pub cursor_advanced: bool,
}

impl RunReport {
    /// Check if the run produced any audit output
    pub fn has_changes(&self) -> bool {
        self.entries_written > 0
    }
}
