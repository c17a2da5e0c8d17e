//! Utility functions shared by the audit modules
//!
//! - Atomic file writing for the cursor file
//! - Relative path rendering for snapshot trees
//! - Timestamp formatting for the audit log

use crate::error::{AuditError, Result};
use crate::types::CheckpointKey;
use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::path::Path;

/// Timestamp layout used in the audit log
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Atomic file write (write to temp file then rename)
///
/// The target is either left untouched or fully replaced; readers never see
/// a partially written file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Render `path` relative to `base` with `/` separators
///
/// Paths in the audit log must not depend on the platform the archive was
/// expanded on.
pub fn relative_path_string(path: &Path, base: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        AuditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{:?} is not inside {:?}", path, base),
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Format a checkpoint ordering key (epoch milliseconds) as local time
///
/// Keys outside chrono's range fall back to the raw number.
pub fn format_checkpoint_time(key: CheckpointKey) -> String {
    i64::try_from(key)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| format_log_time(&t))
        .unwrap_or_else(|| key.to_string())
}

/// Format a wall-clock time for the audit log
pub fn format_log_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(LOG_TIME_FORMAT).to_string()
}
