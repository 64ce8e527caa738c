use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::Booking;
use crate::error::StoreError;
use crate::show::Show;
use crate::task::ReleaseTask;

/// Result of the atomic seat claim.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Every requested seat was claimed and the booking was persisted.
    Claimed,
    /// At least one requested seat was already held; nothing was written.
    /// Carries the requested labels that were taken.
    Conflict { taken: Vec<String> },
    /// The show does not exist; nothing was written.
    ShowMissing,
}

/// Result of the idempotent `Pending -> Paid` transition.
#[derive(Debug, PartialEq, Eq)]
pub enum PaidOutcome {
    Marked,
    AlreadyPaid,
    /// The expiry step won the race: the booking was cancelled and its seats
    /// released before the confirmation landed.
    AfterRelease,
    Missing,
}

/// Result of the idempotent release step.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Seats freed and booking moved to `Cancelled`.
    Released { seats: Vec<String> },
    /// Payment landed first; seats stay held.
    StillPaid,
    /// A previous run already released; retry is a no-op.
    AlreadyCancelled,
    Missing,
}

/// Durable storage for shows, bookings and release tasks.
///
/// The two mutating seat-map operations (`reserve`, `release_if_unpaid`)
/// must be atomic: either every write in them commits or none does.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn create_show(&self, show: &Show) -> Result<(), StoreError>;

    async fn show(&self, id: Uuid) -> Result<Option<Show>, StoreError>;

    /// Shows starting at or after `from`, ordered by start time.
    async fn upcoming_shows(&self, from: DateTime<Utc>) -> Result<Vec<Show>, StoreError>;

    /// Sorted held seat labels; `None` if the show does not exist.
    async fn occupied_seats(&self, show_id: Uuid) -> Result<Option<Vec<String>>, StoreError>;

    /// The reservation transaction: claim every seat in `booking.seats`,
    /// insert the booking, and arm its release task for `release_at`, all
    /// in one indivisible step. A conflict on any seat aborts the whole
    /// thing and reports which requested labels were taken.
    async fn reserve(
        &self,
        booking: &Booking,
        release_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// The requester's bookings, newest first.
    async fn bookings_for(&self, requester: &str) -> Result<Vec<Booking>, StoreError>;

    /// Store a payment-session reference on a still-pending booking.
    /// Returns false if the booking is missing or no longer pending.
    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        session_ref: &str,
    ) -> Result<bool, StoreError>;

    async fn booking_by_payment_session(
        &self,
        session_ref: &str,
    ) -> Result<Option<Booking>, StoreError>;

    /// Conditional `Pending -> Paid`; clears the stored session reference.
    async fn mark_paid(&self, booking_id: Uuid) -> Result<PaidOutcome, StoreError>;

    /// Conditional `Pending -> Cancelled` plus removal of the booking's
    /// seats from the show map, in one transaction.
    async fn release_if_unpaid(&self, booking_id: Uuid) -> Result<ReleaseOutcome, StoreError>;

    /// Claim up to `limit` due `Armed` tasks by flipping them to `Running`.
    async fn claim_due_release_tasks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReleaseTask>, StoreError>;

    async fn complete_release_task(&self, booking_id: Uuid) -> Result<(), StoreError>;

    /// Re-arm a failed task for `next_run`; returns the new attempt count.
    async fn retry_release_task(
        &self,
        booking_id: Uuid,
        next_run: DateTime<Utc>,
    ) -> Result<i32, StoreError>;

    /// Sweep `Running` tasks untouched since `stuck_since` back to `Armed`
    /// so a crashed runner's work is picked up again.
    async fn requeue_stale_release_tasks(
        &self,
        stuck_since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
