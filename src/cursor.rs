//! Persistence of the processing watermark
//!
//! The cursor is the highest ordering key whose audit entries are on disk.
//! [`FileCursorStore`] keeps it as a single base-10 line; [`MemoryCursorStore`]
//! keeps it in process for embedding and tests.

use crate::error::{AuditError, Result};
use crate::types::CheckpointKey;
use crate::utils;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cursor value used when nothing has been processed yet
pub const INITIAL_CURSOR: CheckpointKey = 0;

/// Storage for the cursor value
pub trait CursorStore: Send + Sync {
    /// Load the stored cursor, or [`INITIAL_CURSOR`] when absent or unreadable
    fn load(&self) -> CheckpointKey;

    /// Replace the stored cursor
    fn save(&self, cursor: CheckpointKey) -> Result<()>;
}

/// Cursor kept in a small text file
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    /// Open a cursor file, creating its parent directory if needed
    ///
    /// Fails when the parent directory cannot be created or is not a
    /// directory; this is treated as a startup error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AuditError::CursorStore(format!("cannot create {:?}: {}", parent, e))
            })?;
        }
        if path.is_dir() {
            return Err(AuditError::CursorStore(format!("{:?} is a directory", path)));
        }

        Ok(Self { path })
    }

    /// Location of the cursor file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> CheckpointKey {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cursor file at {}, starting from scratch", self.path.display());
                return INITIAL_CURSOR;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read cursor file");
                return INITIAL_CURSOR;
            }
        };

        let first = raw.lines().next().unwrap_or("").trim();
        if first.is_empty() {
            warn!(path = %self.path.display(), "Empty cursor file, starting from scratch");
            return INITIAL_CURSOR;
        }
        match first.parse::<CheckpointKey>() {
            Ok(cursor) => {
                info!("Loaded last processed timestamp: {}", cursor);
                cursor
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    value = first,
                    error = %e,
                    "Unparsable cursor file, starting from scratch"
                );
                INITIAL_CURSOR
            }
        }
    }

    fn save(&self, cursor: CheckpointKey) -> Result<()> {
        utils::atomic_write(&self.path, format!("{}\n", cursor).as_bytes())
            .map_err(|e| AuditError::CursorStore(format!("cannot write {:?}: {}", self.path, e)))?;
        info!("Saved last processed timestamp: {}", cursor);
        Ok(())
    }
}

/// In-process cursor store
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    state: Mutex<(CheckpointKey, usize)>,
}

impl MemoryCursorStore {
    /// Create a store holding `cursor`
    pub fn new(cursor: CheckpointKey) -> Self {
        Self {
            state: Mutex::new((cursor, 0)),
        }
    }

    /// Number of successful `save` calls so far
    pub fn save_count(&self) -> usize {
        self.state.lock().1
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> CheckpointKey {
        self.state.lock().0
    }

    fn save(&self, cursor: CheckpointKey) -> Result<()> {
        let mut state = self.state.lock();
        state.0 = cursor;
        state.1 += 1;
        Ok(())
    }
}
