//! Process-wide cron scheduler driving one tracker per region.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use tracker_core::{Error, RegionTag, Result};

use crate::tracker::RegionTracker;

/// Deadline for one tick; a tick exceeding it fails with a timeout and the
/// next cron fire starts fresh.
const TICK_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps a [`JobScheduler`] with per-region tracker jobs.
///
/// Each region's ticks are serialized through a mutex; when a fire arrives
/// while the previous tick is still running, it is coalesced (skipped, no
/// backfill).
pub struct TrackerScheduler {
    inner: JobScheduler,
}

impl TrackerScheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .map_err(|e| Error::config_invalid(format!("failed to create scheduler: {e}")))?;
        Ok(Self { inner })
    }

    /// Register one region's tracker under a cron expression (with seconds).
    pub async fn add_region(
        &self,
        region: RegionTag,
        cron_expression: &str,
        tracker: RegionTracker,
    ) -> Result<()> {
        let tracker = Arc::new(Mutex::new(tracker));
        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let tracker = tracker.clone();
            Box::pin(async move {
                let Ok(mut guard) = tracker.try_lock() else {
                    warn!(region = %region, "previous tick still running, coalescing");
                    return;
                };
                info!(region = %region, "running tracker tick");
                match tokio::time::timeout(TICK_TIMEOUT, guard.track()).await {
                    Ok(Ok(())) => {
                        info!(region = %region, "tracker tick finished");
                    }
                    Ok(Err(e)) if e.is_retryable() => {
                        warn!(region = %region, error = %e, "tracker tick failed, will retry on next fire");
                    }
                    Ok(Err(e)) => {
                        error!(region = %region, error = %e, "tracker tick failed");
                    }
                    Err(_) => {
                        error!(region = %region, "tracker tick exceeded {TICK_TIMEOUT:?}");
                        guard.write_failure_heartbeat().await;
                    }
                }
            })
        })
        .map_err(|e| {
            Error::config_invalid(format!(
                "invalid cron expression {cron_expression:?} for {region}: {e}"
            ))
        })?;

        self.inner
            .add(job)
            .await
            .map_err(|e| Error::config_invalid(format!("failed to register job for {region}: {e}")))?;
        info!(region = %region, cron = cron_expression, "tracker cron job registered");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .map_err(|e| Error::config_invalid(format!("failed to start scheduler: {e}")))?;
        info!("scheduler started");
        Ok(())
    }

    /// Stop firing jobs. In-flight ticks finish on their own tasks; callers
    /// close engines afterwards.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| Error::config_invalid(format!("failed to shutdown scheduler: {e}")))?;
        info!("scheduler stopped");
        Ok(())
    }
}
