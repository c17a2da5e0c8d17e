//! Periodic audit loop
//!
//! Runs the pipeline once on start, then every `interval` until the
//! cancellation token fires. Each run executes on the blocking pool and the
//! next tick is not taken until it returns, so runs never overlap. A tick that
//! is missed because a run overran is delayed rather than replayed.

use crate::cursor::CursorStore;
use crate::error::AuditError;
use crate::pipeline::Auditor;
use crate::types::CheckpointKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters collected over the lifetime of a scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Runs that completed
    pub runs: usize,
    /// Runs that returned an error
    pub failures: usize,
    /// Cursor after the last successful run
    pub cursor: CheckpointKey,
}

/// Drives an [`Auditor`] on a fixed interval
pub struct Scheduler {
    auditor: Arc<Auditor>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler; `cancel` stops the loop
    pub fn new(auditor: Arc<Auditor>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            auditor,
            interval,
            cancel,
        }
    }

    /// Run until cancelled
    pub async fn run(self) -> SchedulerStats {
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats = SchedulerStats {
            cursor: self.auditor.cursor_store().load(),
            ..SchedulerStats::default()
        };

        info!(
            "Starting checkpoint audit loop (interval: {})",
            humantime::format_duration(self.interval)
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let auditor = Arc::clone(&self.auditor);
            let cursor = stats.cursor;
            let outcome = tokio::task::spawn_blocking(move || auditor.run(cursor)).await;

            match outcome {
                Ok(Ok(report)) => {
                    stats.runs += 1;
                    stats.cursor = report.cursor;
                    debug!(?report, "Scheduled run finished");
                }
                Ok(Err(AuditError::Cancelled)) => {
                    info!("Audit run cancelled");
                    break;
                }
                Ok(Err(e)) => {
                    stats.failures += 1;
                    error!("Audit run failed: {}", e);
                    warn!("Keeping cursor at {} for the next run", stats.cursor);
                }
                Err(e) => {
                    stats.failures += 1;
                    error!("Audit run aborted: {}", e);
                }
            }
        }

        info!(
            runs = stats.runs,
            failures = stats.failures,
            "Checkpoint audit loop stopped"
        );
        stats
    }
}
