//! # checkpoint-audit - Incremental auditing of configuration checkpoints
//!
//! A monitor that turns the checkpoints an application-server administration
//! repository writes on every configuration save into a human-readable,
//! append-only audit log with line-level diffs.
//!
//! ## Overview
//!
//! Each checkpoint is a directory named `<prefix><epoch-millis>` (for example
//! `Delta-1700000000000`). Its content is obtained as a zip archive holding a
//! `before/` and an `after/` tree plus an optional `user.id` attribution
//! file. For every run the monitor:
//!
//! - scans the checkpoint directory and keeps checkpoints newer than the cursor
//! - obtains each archive through a [`SnapshotExtractor`]
//! - compares the two trees and diffs changed text files line by line
//! - appends one formatted block to the audit log
//! - advances the cursor, but only after the append succeeded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use checkpoint_audit::{AuditConfig, AuditorBuilder, Credentials};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuditConfig::load(Path::new("config.toml"))?;
//! let extractor = config
//!     .extractor
//!     .build(Some(Credentials::new("wasadmin", "secret")), None)?;
//!
//! let auditor = AuditorBuilder::from_config(&config)?
//!     .boxed_extractor(extractor)
//!     .build()?;
//!
//! let report = auditor.run_once()?;
//! println!("{} changes logged", report.entries_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Diffing
//!
//! The diff engine computes a longest-common-subsequence edit script and then
//! folds a deletion immediately followed by an insertion at the same or an
//! adjacent line into a single modification:
//!
//! ```rust
//! use checkpoint_audit::{diff, DiffEntry};
//!
//! let entries = diff::compute_line_diff(&["a", "b", "c"], &["a", "x", "c"]);
//! assert_eq!(
//!     entries,
//!     vec![DiffEntry::Modified { line: 2, before: "b".into(), after: "x".into() }]
//! );
//! ```
//!
//! ## Failure Handling
//!
//! - A checkpoint that cannot be extracted or expanded is skipped and its key
//!   does not contribute to the new cursor
//! - A file that is not valid UTF-8 text is skipped with a warning
//! - A failed audit log append leaves the cursor untouched, so the same batch
//!   is picked up again on the next run
//!
//! ## Module Organization
//!
//! - [`diff`]: LCS line diff and edit-script helpers
//! - [`snapshot`]: archive expansion and before/after comparison
//! - [`extractor`]: archive acquisition backends
//! - [`scanner`]: checkpoint discovery and incremental filtering
//! - [`cursor`]: persisted high-water mark
//! - [`audit_log`]: audit log rendering and appending
//! - [`pipeline`]: one audit run end to end
//! - [`scheduler`]: periodic runs on a tokio runtime
//! - [`config`]: TOML configuration
//! - [`types`]: shared data types
//! - [`error`]: error types

pub mod audit_log;
pub mod config;
pub mod cursor;
pub mod diff;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod scanner;
pub mod scheduler;
pub mod snapshot;
pub mod types;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use audit_log::AuditLogWriter;
pub use config::{AuditConfig, ExtractorConfig, DEFAULT_CONFIG_FILE};
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore, INITIAL_CURSOR};
pub use error::{AuditError, Result};
pub use extractor::{
    ArchiveDirExtractor, ConnectionParams, ConnectorType, Credentials, SnapshotExtractor,
    WsadminExtractor,
};
pub use pipeline::{Auditor, AuditorBuilder, PendingBatch};
pub use scanner::DEFAULT_PREFIX;
pub use scheduler::{Scheduler, SchedulerStats};
pub use snapshot::ExpandedArchive;
pub use utils::format_checkpoint_time;
pub use types::*;
