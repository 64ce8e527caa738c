use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use marquee_core::{
    Booking, BookingStatus, ClaimOutcome, PaidOutcome, ReleaseOutcome, ReleaseTask,
    ReservationStore, Show, StoreError, TaskState,
};

/// In-memory reservation store.
///
/// Backs the engine test suites and local runs without Postgres. The single
/// mutex gives every operation the same all-or-nothing visibility the
/// Postgres transactions provide.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    shows: HashMap<Uuid, Show>,
    bookings: HashMap<Uuid, Booking>,
    tasks: HashMap<Uuid, ReleaseTask>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another test panicked; the data is
        // still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn create_show(&self, show: &Show) -> Result<(), StoreError> {
        self.lock().shows.insert(show.id, show.clone());
        Ok(())
    }

    async fn show(&self, id: Uuid) -> Result<Option<Show>, StoreError> {
        Ok(self.lock().shows.get(&id).cloned())
    }

    async fn upcoming_shows(&self, from: DateTime<Utc>) -> Result<Vec<Show>, StoreError> {
        let mut shows: Vec<Show> = self
            .lock()
            .shows
            .values()
            .filter(|s| s.starts_at >= from)
            .cloned()
            .collect();
        shows.sort_by_key(|s| s.starts_at);
        Ok(shows)
    }

    async fn occupied_seats(&self, show_id: Uuid) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self.lock().shows.get(&show_id).map(Show::occupied_labels))
    }

    async fn reserve(
        &self,
        booking: &Booking,
        release_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.lock();
        let show = match inner.shows.get_mut(&booking.show_id) {
            Some(show) => show,
            None => return Ok(ClaimOutcome::ShowMissing),
        };

        let taken: Vec<String> = booking
            .seats
            .iter()
            .filter(|seat| show.occupied.contains_key(*seat))
            .cloned()
            .collect();
        if !taken.is_empty() {
            return Ok(ClaimOutcome::Conflict { taken });
        }

        for seat in &booking.seats {
            show.occupied.insert(seat.clone(), booking.requester.clone());
        }
        inner.bookings.insert(booking.id, booking.clone());
        inner.tasks.insert(
            booking.id,
            ReleaseTask {
                booking_id: booking.id,
                run_at: release_at,
                state: TaskState::Armed,
                attempts: 0,
                updated_at: Utc::now(),
            },
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn bookings_for(&self, requester: &str) -> Result<Vec<Booking>, StoreError> {
        let mut bookings: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| b.requester == requester)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        session_ref: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let taken = inner
            .bookings
            .values()
            .any(|b| b.id != booking_id && b.payment_session.as_deref() == Some(session_ref));
        if taken {
            return Err(StoreError::Conflict(format!(
                "payment session {session_ref} is already attached to another booking"
            )));
        }
        match inner.bookings.get_mut(&booking_id) {
            Some(b) if b.status == BookingStatus::Pending => {
                b.payment_session = Some(session_ref.to_string());
                b.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn booking_by_payment_session(
        &self,
        session_ref: &str,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .lock()
            .bookings
            .values()
            .find(|b| b.payment_session.as_deref() == Some(session_ref))
            .cloned())
    }

    async fn mark_paid(&self, booking_id: Uuid) -> Result<PaidOutcome, StoreError> {
        let mut inner = self.lock();
        match inner.bookings.get_mut(&booking_id) {
            Some(b) => match b.status {
                BookingStatus::Pending => {
                    b.status = BookingStatus::Paid;
                    b.payment_session = None;
                    b.updated_at = Utc::now();
                    Ok(PaidOutcome::Marked)
                }
                BookingStatus::Paid => Ok(PaidOutcome::AlreadyPaid),
                BookingStatus::Cancelled => Ok(PaidOutcome::AfterRelease),
            },
            None => Ok(PaidOutcome::Missing),
        }
    }

    async fn release_if_unpaid(&self, booking_id: Uuid) -> Result<ReleaseOutcome, StoreError> {
        let mut inner = self.lock();
        let (show_id, seats) = match inner.bookings.get_mut(&booking_id) {
            Some(b) => match b.status {
                BookingStatus::Pending => {
                    b.status = BookingStatus::Cancelled;
                    b.updated_at = Utc::now();
                    (b.show_id, b.seats.clone())
                }
                BookingStatus::Paid => return Ok(ReleaseOutcome::StillPaid),
                BookingStatus::Cancelled => return Ok(ReleaseOutcome::AlreadyCancelled),
            },
            None => return Ok(ReleaseOutcome::Missing),
        };

        if let Some(show) = inner.shows.get_mut(&show_id) {
            for seat in &seats {
                show.occupied.remove(seat);
            }
        }
        Ok(ReleaseOutcome::Released { seats })
    }

    async fn claim_due_release_tasks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReleaseTask>, StoreError> {
        let mut inner = self.lock();
        let mut due: Vec<Uuid> = inner
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Armed && t.run_at <= now)
            .map(|t| t.booking_id)
            .collect();
        due.sort_by_key(|id| inner.tasks[id].run_at);
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.state = TaskState::Running;
                task.updated_at = Utc::now();
                claimed.push(task.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_release_task(&self, booking_id: Uuid) -> Result<(), StoreError> {
        if let Some(task) = self.lock().tasks.get_mut(&booking_id) {
            task.state = TaskState::Done;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn retry_release_task(
        &self,
        booking_id: Uuid,
        next_run: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .get_mut(&booking_id)
            .ok_or_else(|| StoreError::Backend(format!("no release task for {booking_id}")))?;
        task.state = TaskState::Armed;
        task.run_at = next_run;
        task.attempts += 1;
        task.updated_at = Utc::now();
        Ok(task.attempts)
    }

    async fn requeue_stale_release_tasks(
        &self,
        stuck_since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut swept = 0;
        for task in inner.tasks.values_mut() {
            if task.state == TaskState::Running && task.updated_at < stuck_since {
                task.state = TaskState::Armed;
                task.updated_at = Utc::now();
                swept += 1;
            }
        }
        Ok(swept)
    }
}
