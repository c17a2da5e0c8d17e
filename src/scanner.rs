//! Checkpoint discovery and incremental selection
//!
//! The administrative tool drops one directory per change into the checkpoint
//! directory, named `<prefix><ordering key>` (for example
//! `Delta-1700000000000`). [`scan_checkpoints`] lists them and
//! [`select_pending`] keeps the ones newer than the cursor.
//!
//! Neither function fails: an unreadable directory yields an empty scan and
//! malformed entries are reported and skipped one by one.

use crate::error::AuditError;
use crate::types::{Checkpoint, CheckpointKey};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Default checkpoint directory name prefix
pub const DEFAULT_PREFIX: &str = "Delta-";

/// Result of scanning the checkpoint directory
#[derive(Debug, Clone, Default)]
pub struct CheckpointScan {
    /// Well-formed checkpoints, sorted by name
    pub checkpoints: Vec<Checkpoint>,
    /// Entries that were reported and ignored
    pub skipped: Vec<String>,
    /// Set when the directory itself could not be listed
    pub error: Option<String>,
}

/// Parse the ordering key out of a checkpoint directory name
///
/// Fails with [`AuditError::NameParse`] when the prefix is missing or the
/// remainder is not a base-10 integer.
pub fn parse_checkpoint_key(name: &str, prefix: &str) -> Result<CheckpointKey, AuditError> {
    let digits = name.strip_prefix(prefix).ok_or_else(|| AuditError::NameParse {
        name: name.to_string(),
        reason: format!("missing prefix '{}'", prefix),
    })?;

    digits.parse::<CheckpointKey>().map_err(|e| AuditError::NameParse {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// List checkpoint directories under `dir`
pub fn scan_checkpoints(dir: &Path, prefix: &str) -> CheckpointScan {
    let mut scan = CheckpointScan::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            let err = AuditError::Scan {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            };
            warn!("{}", err);
            scan.error = Some(err.to_string());
            return scan;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Unreadable checkpoint directory entry");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        // Follows symlinks, so a linked checkpoint directory counts
        if !entry.path().is_dir() {
            warn!(entry = %name, "Ignoring non-directory entry in checkpoint directory");
            scan.skipped.push(name);
            continue;
        }

        match parse_checkpoint_key(&name, prefix) {
            Ok(key) => scan.checkpoints.push(Checkpoint::new(name, key, entry.path())),
            Err(e) => {
                warn!("{}", e);
                scan.skipped.push(name);
            }
        }
    }

    scan.checkpoints.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(
        found = scan.checkpoints.len(),
        skipped = scan.skipped.len(),
        "Scanned checkpoint directory {}",
        dir.display()
    );
    scan
}

/// Keep checkpoints strictly newer than `cursor`, ascending by key
///
/// The sort is stable, so equal keys keep their scan order.
pub fn select_pending(checkpoints: &[Checkpoint], cursor: CheckpointKey) -> Vec<Checkpoint> {
    let mut pending: Vec<Checkpoint> = checkpoints
        .iter()
        .filter(|c| c.key > cursor)
        .cloned()
        .collect();
    pending.sort_by_key(|c| c.key);
    pending
}
