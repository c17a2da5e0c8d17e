//! Audit run orchestration
//!
//! One run walks the whole chain:
//!
//! ```text
//! scan → filter by cursor → per checkpoint: extract → expand → diff
//!      → sort entries → append to log → save cursor
//! ```
//!
//! The cursor is an explicit input of [`Auditor::run`] and the updated value
//! comes back in the [`RunReport`]. It is only persisted after the audit log
//! append succeeded, so a failed write leaves the batch eligible for the next
//! run.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use checkpoint_audit::{AuditorBuilder, ArchiveDirExtractor, FileCursorStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let auditor = AuditorBuilder::new()
//!     .checkpoint_dir("/dmgr/repository/checkpoints")
//!     .extractor(ArchiveDirExtractor::new("/var/lib/audit/archives"))
//!     .cursor_store(Arc::new(FileCursorStore::open(".last_processed_timestamp")?))
//!     .audit_log("audit.log")
//!     .build()?;
//!
//! let report = auditor.run_once()?;
//! println!("{} entries written, cursor now {}", report.entries_written, report.cursor);
//! # Ok(())
//! # }
//! ```

use crate::audit_log::AuditLogWriter;
use crate::config::AuditConfig;
use crate::cursor::{CursorStore, FileCursorStore};
use crate::error::{AuditError, Result};
use crate::extractor::SnapshotExtractor;
use crate::scanner::{self, DEFAULT_PREFIX};
use crate::snapshot::ExpandedArchive;
use crate::types::{AuditEntry, Checkpoint, CheckpointKey, RunReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Audit entries collected for the pending checkpoints, not yet written
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    /// Entries sorted by checkpoint key
    pub entries: Vec<AuditEntry>,
    /// Highest key among successfully processed checkpoints (at least the input cursor)
    pub max_key: CheckpointKey,
    /// Counters for the run so far
    pub report: RunReport,
}

/// Runs the audit pipeline against one checkpoint directory
pub struct Auditor {
    checkpoint_dir: PathBuf,
    prefix: String,
    extractor: Box<dyn SnapshotExtractor>,
    cursor_store: Arc<dyn CursorStore>,
    log: AuditLogWriter,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("checkpoint_dir", &self.checkpoint_dir)
            .field("prefix", &self.prefix)
            .field("audit_log", &self.log.path())
            .finish()
    }
}

impl Auditor {
    /// Directory being scanned
    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Store backing the cursor
    pub fn cursor_store(&self) -> &dyn CursorStore {
        self.cursor_store.as_ref()
    }

    /// Audit log destination
    pub fn audit_log(&self) -> &AuditLogWriter {
        &self.log
    }

    /// Checkpoints newer than `cursor`, ascending by key
    pub fn pending(&self, cursor: CheckpointKey) -> Vec<Checkpoint> {
        let scan = scanner::scan_checkpoints(&self.checkpoint_dir, &self.prefix);
        scanner::select_pending(&scan.checkpoints, cursor)
    }

    /// Load the stored cursor and run once
    pub fn run_once(&self) -> Result<RunReport> {
        let cursor = self.cursor_store.load();
        self.run(cursor)
    }

    /// Run the pipeline from `cursor`
    ///
    /// When no entries were produced neither the log nor the cursor store is
    /// touched and the returned cursor equals the input.
    #[instrument(skip(self), fields(dir = %self.checkpoint_dir.display()))]
    pub fn run(&self, cursor: CheckpointKey) -> Result<RunReport> {
        let started = Instant::now();
        let batch = self.collect(cursor)?;
        let report = self.commit(cursor, batch)?;

        info!(
            entries = report.entries_written,
            cursor = report.cursor,
            "Processing complete in {:?}",
            started.elapsed()
        );
        Ok(report)
    }

    /// Scan, filter and diff pending checkpoints without writing anything
    ///
    /// Per-checkpoint failures are reported and recorded in the report;
    /// anything else, cancellation included, aborts.
    pub fn collect(&self, cursor: CheckpointKey) -> Result<PendingBatch> {
        info!("Processing checkpoints in {}", self.checkpoint_dir.display());

        let scan = scanner::scan_checkpoints(&self.checkpoint_dir, &self.prefix);
        let pending = scanner::select_pending(&scan.checkpoints, cursor);

        let mut batch = PendingBatch {
            entries: Vec::new(),
            max_key: cursor,
            report: RunReport {
                discovered: scan.checkpoints.len(),
                selected: pending.len(),
                cursor,
                ..RunReport::default()
            },
        };

        if pending.is_empty() {
            info!("No new checkpoints to process");
            return Ok(batch);
        }
        info!("Found {} new checkpoints to process", pending.len());

        for checkpoint in &pending {
            if self.is_cancelled() {
                warn!("Run cancelled before {}", checkpoint.name);
                return Err(AuditError::Cancelled);
            }

            match self.process_checkpoint(checkpoint) {
                Ok(entries) => {
                    debug!(checkpoint = %checkpoint.name, changes = entries.len(), "Checkpoint processed");
                    batch.entries.extend(entries);
                    batch.max_key = batch.max_key.max(checkpoint.key);
                    batch.report.processed += 1;
                }
                Err(e) if e.is_per_checkpoint() => {
                    warn!(checkpoint = %checkpoint.name, error = %e, "Skipping checkpoint");
                    batch.report.failed.push(checkpoint.name.clone());
                }
                Err(e) => return Err(e),
            }
        }

        // Stable: entries of one checkpoint keep their path order
        batch.entries.sort_by_key(|e| e.checkpoint_key);
        Ok(batch)
    }

    /// Write a collected batch and advance the cursor
    fn commit(&self, cursor: CheckpointKey, batch: PendingBatch) -> Result<RunReport> {
        let PendingBatch { entries, max_key, mut report } = batch;

        if entries.is_empty() {
            info!("No configuration changes found");
            return Ok(report);
        }

        self.log.append(&entries)?;
        report.entries_written = entries.len();

        let next = cursor.max(max_key);
        self.cursor_store.save(next)?;
        report.cursor = next;
        report.cursor_advanced = true;

        let stranded: Vec<&str> = report
            .failed
            .iter()
            .filter(|name| {
                scanner::parse_checkpoint_key(name, &self.prefix).is_ok_and(|key| key < next)
            })
            .map(String::as_str)
            .collect();
        if !stranded.is_empty() {
            warn!(
                "Cursor moved past failed checkpoints {:?}; they will not be retried",
                stranded
            );
        }

        Ok(report)
    }

    /// Extract, expand and diff one checkpoint
    #[instrument(skip_all, fields(checkpoint = %checkpoint.name))]
    fn process_checkpoint(&self, checkpoint: &Checkpoint) -> Result<Vec<AuditEntry>> {
        info!("Processing {}", checkpoint.name);
        let bytes = self.extractor.extract(checkpoint)?;
        let expanded = ExpandedArchive::expand(checkpoint, &bytes)?;
        expanded.audit_entries()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Builder for [`Auditor`]
pub struct AuditorBuilder {
    checkpoint_dir: Option<PathBuf>,
    prefix: String,
    extractor: Option<Box<dyn SnapshotExtractor>>,
    cursor_store: Option<Arc<dyn CursorStore>>,
    audit_log: Option<PathBuf>,
    cancel: Option<CancellationToken>,
}

impl Default for AuditorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            checkpoint_dir: None,
            prefix: DEFAULT_PREFIX.to_string(),
            extractor: None,
            cursor_store: None,
            audit_log: None,
            cancel: None,
        }
    }

    /// Pre-fill directories, prefix, audit log and cursor file from configuration
    ///
    /// The extractor still has to be supplied, since it needs credentials.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        let store = FileCursorStore::open(&config.cursor_file)?;
        Ok(Self::new()
            .checkpoint_dir(&config.checkpoint_dir)
            .prefix(&config.checkpoint_prefix)
            .audit_log(&config.audit_log)
            .cursor_store(Arc::new(store)))
    }

    /// Set the directory to scan
    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Set the checkpoint name prefix (default `Delta-`)
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the archive extractor
    pub fn extractor(self, extractor: impl SnapshotExtractor + 'static) -> Self {
        self.boxed_extractor(Box::new(extractor))
    }

    /// Set an already boxed archive extractor
    pub fn boxed_extractor(mut self, extractor: Box<dyn SnapshotExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the cursor store
    pub fn cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.cursor_store = Some(store);
        self
    }

    /// Set the audit log path
    pub fn audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log = Some(path.into());
        self
    }

    /// Abandon runs when `token` is cancelled
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the auditor
    pub fn build(self) -> Result<Auditor> {
        let missing = |what: &str| AuditError::config(format!("auditor needs {}", what));

        if self.prefix.is_empty() {
            return Err(AuditError::config("checkpoint prefix must not be empty"));
        }

        Ok(Auditor {
            checkpoint_dir: self.checkpoint_dir.ok_or_else(|| missing("a checkpoint directory"))?,
            prefix: self.prefix,
            extractor: self.extractor.ok_or_else(|| missing("an extractor"))?,
            cursor_store: self.cursor_store.ok_or_else(|| missing("a cursor store"))?,
            log: AuditLogWriter::new(self.audit_log.ok_or_else(|| missing("an audit log path"))?),
            cancel: self.cancel,
        })
    }
}
