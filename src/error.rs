//! Error types for checkpoint auditing
//!
//! Every failure the pipeline can hit maps to one variant of [`AuditError`].
//! Most of them are isolated to a single checkpoint or a single file and are
//! reported and skipped by the orchestrator; only write and cursor failures
//! stop a run from advancing.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for all audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The checkpoint directory could not be listed
    #[error("Cannot scan checkpoint directory {path:?}: {reason}")]
    Scan {
        /// Directory that was scanned
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// A directory entry carried the checkpoint prefix but no valid ordering key
    #[error("Invalid checkpoint directory name '{name}': {reason}")]
    NameParse {
        /// Entry name as found on disk
        name: String,
        /// Why the ordering key was rejected
        reason: String,
    },

    /// The external tool did not produce a usable archive
    #[error("Extraction of checkpoint {checkpoint} failed: {reason}")]
    Extraction {
        /// Checkpoint identifier
        checkpoint: String,
        /// Failure description
        reason: String,
    },

    /// The external tool exceeded its time limit and was killed
    #[error("Extraction of checkpoint {checkpoint} timed out after {}s", .timeout.as_secs())]
    ExtractionTimeout {
        /// Checkpoint identifier
        checkpoint: String,
        /// Configured limit
        timeout: Duration,
    },

    /// The archive is corrupt or has an unexpected layout
    #[error("Archive for checkpoint {checkpoint} is unusable: {reason}")]
    Archive {
        /// Checkpoint identifier
        checkpoint: String,
        /// Failure description
        reason: String,
    },

    /// Binary or undecodable file content
    #[error("Cannot diff {path}: {reason}")]
    UndiffableContent {
        /// Relative path inside the snapshot tree
        path: String,
        /// Why the content was rejected
        reason: String,
    },

    /// The audit log could not be appended to
    #[error("Failed to write audit log {path:?}: {source}")]
    WriteFailed {
        /// Audit log path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Cursor persistence failure
    #[error("Cursor store error: {0}")]
    CursorStore(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The run was cancelled before it completed
    #[error("Run cancelled")]
    Cancelled,

    /// Zip decoding error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Config serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    /// Create an extraction error for a checkpoint
    pub fn extraction(checkpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AuditError::Extraction {
            checkpoint: checkpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create an archive error for a checkpoint
    pub fn archive(checkpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AuditError::Archive {
            checkpoint: checkpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create an undiffable-content error for a snapshot path
    pub fn undiffable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AuditError::UndiffableContent {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AuditError::InvalidConfiguration(msg.into())
    }

    /// Check if this error only affects a single checkpoint
    ///
    /// Such errors are reported and the batch moves on to the next checkpoint.
    pub fn is_per_checkpoint(&self) -> bool {
        matches!(
            self,
            AuditError::Extraction { .. }
                | AuditError::ExtractionTimeout { .. }
                | AuditError::Archive { .. }
                | AuditError::Zip(_)
                | AuditError::WalkDir(_)
                | AuditError::Io(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            AuditError::ExtractionTimeout { checkpoint, timeout } => format!(
                "Extraction of {} did not finish within {}. Check that the deployment \
                 manager is reachable or raise `extractor.timeout`.",
                checkpoint,
                humantime::format_duration(*timeout)
            ),
            AuditError::WriteFailed { path, .. } => format!(
                "Could not append to {:?}. The cursor was not advanced; the same \
                 checkpoints will be audited again on the next run.",
                path
            ),
            AuditError::InvalidConfiguration(msg) => {
                format!("{}. Run `checkpoint-audit init` to create a default configuration.", msg)
            }
            _ => self.to_string(),
        }
    }
}
