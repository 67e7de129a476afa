//! Cron-driven background perf snapshots.
//!
//! Wakes on a fixed tick, and when the configured cron schedule has fired
//! since the last run, snapshots every configured operation.

use crate::clock::Clock;
use crate::config::SnapshotSchedule;
use crate::metrics::snapshot::{SnapshotError, Snapshotter};
use crate::types::PerfMethod;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background snapshot loop.
pub struct SnapshotScheduler {
    snapshotter: Arc<Snapshotter>,
    schedule: Schedule,
    operations: Vec<String>,
    method: PerfMethod,
    clock: Arc<dyn Clock>,
    last_run: Option<DateTime<Utc>>,
}

impl SnapshotScheduler {
    pub fn new(
        snapshotter: Arc<Snapshotter>,
        config: &SnapshotSchedule,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let schedule = Schedule::from_str(&config.schedule)
            .with_context(|| format!("Invalid snapshot schedule '{}'", config.schedule))?;
        let method = PerfMethod::from_str(&config.method).map_err(|e| anyhow!(e))?;

        Ok(Self {
            snapshotter,
            schedule,
            operations: config.operations.clone(),
            method,
            clock,
            last_run: None,
        })
    }

    /// Run until `cancel` fires (call from a tokio::spawn).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Snapshot scheduler started ({} operations)",
            self.operations.len()
        );

        let tick_interval = tokio::time::Duration::from_secs(30);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {
                    let written = self.tick().await;
                    if written > 0 {
                        debug!("Scheduled tick wrote {} snapshots", written);
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Snapshot scheduler shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Snapshot every operation if the schedule fired since the last run.
    ///
    /// Returns the number of snapshots written. Failures are logged and do
    /// not stop the remaining operations.
    pub async fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let last = self
            .last_run
            .unwrap_or(now - chrono::Duration::hours(1));

        let due = matches!(self.schedule.after(&last).next(), Some(next) if next <= now);
        if !due {
            return 0;
        }
        self.last_run = Some(now);

        let mut written = 0;
        for operation in &self.operations {
            match self
                .snapshotter
                .snapshot(operation, self.method, true, false)
                .await
            {
                Ok(_) => written += 1,
                Err(SnapshotError::TooSoon { retry_after_secs, .. }) => {
                    debug!("Skipping {} snapshot, next allowed in {}s", operation, retry_after_secs);
                }
                Err(SnapshotError::UnknownOperation(op)) => {
                    warn!("Snapshot schedule names unknown operation '{}'", op);
                }
                Err(e) => error!("Scheduled {} snapshot failed: {}", operation, e),
            }
        }
        written
    }
}
