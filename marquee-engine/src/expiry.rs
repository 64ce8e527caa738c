use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use marquee_core::{ReleaseOutcome, ReleaseTask, ReservationStore, StoreError};

/// Knobs for the release worker.
#[derive(Debug, Clone)]
pub struct ReleasePolicy {
    pub poll_interval: std::time::Duration,
    /// Max tasks claimed per sweep.
    pub batch_size: i64,
    /// Delay before a failed release runs again.
    pub retry_backoff: Duration,
    /// Attempt count past which each further failure is an operational
    /// alert: unreleased seats on an expired booking block sales.
    pub alert_after_attempts: i32,
    /// Age at which a RUNNING task is treated as orphaned by a dead runner.
    pub stale_after: Duration,
}

impl ReleasePolicy {
    pub fn new(
        poll_seconds: u64,
        batch_size: i64,
        retry_seconds: u64,
        alert_after_attempts: i32,
        stale_seconds: u64,
    ) -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(poll_seconds),
            batch_size,
            retry_backoff: Duration::seconds(retry_seconds as i64),
            alert_after_attempts,
            stale_after: Duration::seconds(stale_seconds as i64),
        }
    }
}

/// Durable delayed-release runner.
///
/// Each pending booking arms exactly one release task at reservation time;
/// this worker revisits every due task at least once, re-reads the payment
/// state fresh, and releases the seats only if the booking is still unpaid.
/// The sleep is the poll interval, never a per-booking timer, and task state
/// lives in the store so restarts lose nothing.
pub struct ReleaseWorker {
    store: Arc<dyn ReservationStore>,
    policy: ReleasePolicy,
}

impl ReleaseWorker {
    pub fn new(store: Arc<dyn ReservationStore>, policy: ReleasePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn run(self) {
        info!(
            poll_seconds = self.policy.poll_interval.as_secs(),
            "release worker started"
        );
        let mut ticker = tokio::time::interval(self.policy.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick(Utc::now()).await {
                error!("release sweep failed: {err}");
            }
        }
    }

    /// One sweep: re-arm orphaned tasks, claim due ones, run each release.
    /// Returns how many bookings had their seats released.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let swept = self
            .store
            .requeue_stale_release_tasks(now - self.policy.stale_after)
            .await?;
        if swept > 0 {
            warn!(count = swept, "re-armed release tasks orphaned by a dead runner");
        }

        let tasks = self
            .store
            .claim_due_release_tasks(now, self.policy.batch_size)
            .await?;

        let mut released = 0;
        for task in tasks {
            match self.store.release_if_unpaid(task.booking_id).await {
                Ok(outcome) => {
                    self.store.complete_release_task(task.booking_id).await?;
                    if self.log_outcome(&task, outcome) {
                        released += 1;
                    }
                }
                Err(err) => self.reschedule(&task, now, &err).await?,
            }
        }
        Ok(released)
    }

    fn log_outcome(&self, task: &ReleaseTask, outcome: ReleaseOutcome) -> bool {
        match outcome {
            ReleaseOutcome::Released { seats } => {
                info!(
                    booking_id = %task.booking_id,
                    seats = seats.len(),
                    "hold expired unpaid, seats released"
                );
                true
            }
            ReleaseOutcome::StillPaid => {
                debug!(booking_id = %task.booking_id, "booking paid before expiry, seats kept");
                false
            }
            ReleaseOutcome::AlreadyCancelled => {
                debug!(booking_id = %task.booking_id, "already released by an earlier run");
                false
            }
            ReleaseOutcome::Missing => {
                warn!(booking_id = %task.booking_id, "booking gone before expiry check");
                false
            }
        }
    }

    async fn reschedule(
        &self,
        task: &ReleaseTask,
        now: DateTime<Utc>,
        err: &StoreError,
    ) -> Result<(), StoreError> {
        let attempts = self
            .store
            .retry_release_task(task.booking_id, now + self.policy.retry_backoff)
            .await?;
        if attempts >= self.policy.alert_after_attempts {
            error!(
                booking_id = %task.booking_id,
                attempts,
                "seat release keeps failing, seats still held by an expired booking: {err}"
            );
        } else {
            warn!(booking_id = %task.booking_id, attempts, "seat release failed, will retry: {err}");
        }
        Ok(())
    }
}
