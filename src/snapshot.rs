//! Checkpoint archive expansion and before/after comparison
//!
//! ## Archive layout
//!
//! ```text
//! <checkpoint>.zip
//! ├── user.id        optional, one line naming the administrator
//! ├── before/...     configuration tree before the change (optional)
//! └── after/...      configuration tree after the change (optional)
//! ```
//!
//! [`ExpandedArchive`] unpacks the archive into a private temporary
//! directory that is removed when the value is dropped, whatever the outcome
//! of the diff. [`ExpandedArchive::audit_entries`] then compares the two
//! trees and produces one [`AuditEntry`] per changed path.

use crate::diff;
use crate::error::{AuditError, Result};
use crate::types::{AuditEntry, ChangeKind, Checkpoint, UNKNOWN_USER};
use crate::utils;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File carrying the attribution record
pub const USER_ID_FILE: &str = "user.id";
/// Subtree holding the configuration before the change
pub const BEFORE_DIR: &str = "before";
/// Subtree holding the configuration after the change
pub const AFTER_DIR: &str = "after";

/// Sorted mapping of relative path to on-disk file for one side of a checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotTree {
    files: BTreeMap<String, PathBuf>,
}

impl SnapshotTree {
    /// Collect every regular file below `root`
    pub fn from_dir(root: &Path) -> Result<Self> {
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = utils::relative_path_string(entry.path(), root)?;
            files.insert(relative, entry.into_path());
        }

        Ok(Self { files })
    }

    /// Number of files in the tree
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the tree holds no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// On-disk location of a relative path
    pub fn get(&self, relative: &str) -> Option<&Path> {
        self.files.get(relative).map(PathBuf::as_path)
    }

    /// Relative paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

/// A checkpoint archive unpacked into a scoped temporary directory
#[derive(Debug)]
pub struct ExpandedArchive {
    checkpoint: Checkpoint,
    dir: TempDir,
}

impl ExpandedArchive {
    /// Unpack zip bytes for `checkpoint`
    ///
    /// Empty input, a corrupt container, or entry names escaping the
    /// extraction root are reported as [`AuditError::Archive`].
    pub fn expand(checkpoint: &Checkpoint, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AuditError::archive(&checkpoint.name, "archive is empty"));
        }

        let dir = tempfile::Builder::new().prefix("checkpoint_").tempdir()?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| AuditError::archive(&checkpoint.name, e.to_string()))?;

        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| AuditError::archive(&checkpoint.name, e.to_string()))?;

            let relative = file.enclosed_name().ok_or_else(|| {
                AuditError::archive(
                    &checkpoint.name,
                    format!("entry '{}' escapes the archive root", file.name()),
                )
            })?;
            let target = dir.path().join(relative);

            if file.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut file, &mut out)
                .map_err(|e| AuditError::archive(&checkpoint.name, e.to_string()))?;
        }

        debug!(
            checkpoint = %checkpoint.name,
            entries = archive.len(),
            "Expanded archive into {}",
            dir.path().display()
        );

        Ok(Self {
            checkpoint: checkpoint.clone(),
            dir,
        })
    }

    /// Root of the expanded tree
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// User credited with the change, or [`UNKNOWN_USER`]
    pub fn attribution(&self) -> String {
        let path = self.root().join(USER_ID_FILE);
        match fs::read(&path) {
            Ok(bytes) => {
                let user = String::from_utf8_lossy(&bytes).trim().to_string();
                if user.is_empty() {
                    UNKNOWN_USER.to_string()
                } else {
                    user
                }
            }
            Err(_) => UNKNOWN_USER.to_string(),
        }
    }

    /// Compare the before and after trees
    ///
    /// Produces nothing when either tree is missing. Paths are visited in
    /// sorted order; undiffable files are reported and skipped.
    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>> {
        let before_root = self.root().join(BEFORE_DIR);
        let after_root = self.root().join(AFTER_DIR);

        if !before_root.is_dir() || !after_root.is_dir() {
            debug!(
                checkpoint = %self.checkpoint.name,
                "Archive has no before/after pair, nothing to compare"
            );
            return Ok(Vec::new());
        }

        let before = SnapshotTree::from_dir(&before_root)?;
        let after = SnapshotTree::from_dir(&after_root)?;
        let user_id = self.attribution();

        let all_paths: BTreeSet<&str> = before.paths().chain(after.paths()).collect();
        let mut entries = Vec::new();

        for path in all_paths {
            let change = match (before.get(path), after.get(path)) {
                (None, Some(_)) => Some((ChangeKind::Added, vec!["File created".to_string()])),
                (Some(_), None) => Some((ChangeKind::Deleted, vec!["File deleted".to_string()])),
                (Some(old), Some(new)) => match compare_files(path, old, new) {
                    Ok(change) => change,
                    Err(e @ AuditError::UndiffableContent { .. }) => {
                        warn!(checkpoint = %self.checkpoint.name, "{}", e);
                        None
                    }
                    Err(e) => return Err(e),
                },
                (None, None) => None,
            };

            if let Some((change_kind, changes)) = change {
                entries.push(AuditEntry {
                    checkpoint_key: self.checkpoint.key,
                    user_id: user_id.clone(),
                    file_path: path.to_string(),
                    change_kind,
                    changes,
                });
            }
        }

        Ok(entries)
    }
}

/// Diff one file present on both sides
///
/// Returns `None` when the contents are line-for-line identical.
fn compare_files(path: &str, old: &Path, new: &Path) -> Result<Option<(ChangeKind, Vec<String>)>> {
    let before = diff::decode_text(path, fs::read(old)?)?;
    let after = diff::decode_text(path, fs::read(new)?)?;

    let entries = diff::diff_text(&before, &after);
    Ok(ChangeKind::classify(&entries).map(|kind| {
        let changes = entries.iter().flat_map(|e| e.describe()).collect();
        (kind, changes)
    }))
}
