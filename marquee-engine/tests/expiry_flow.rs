use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use marquee_core::{
    Booking, BookingStatus, ClaimOutcome, PaidOutcome, ReleaseOutcome, ReleaseTask,
    ReservationError, ReservationStore, Show, StoreError,
};
use marquee_engine::{
    Confirmation, PaymentBridge, ReleasePolicy, ReleaseWorker, ReservationEngine,
    ReservationPolicy,
};
use marquee_store::MemoryStore;

fn release_policy() -> ReleasePolicy {
    ReleasePolicy::new(1, 50, 30, 3, 300)
}

async fn seed(
    store: Arc<MemoryStore>,
    hold_seconds: u64,
) -> (ReservationEngine, PaymentBridge, ReleaseWorker, Uuid) {
    let engine = ReservationEngine::new(
        store.clone(),
        ReservationPolicy::new(hold_seconds, "USD".into()),
    );
    let bridge = PaymentBridge::new(store.clone());
    let worker = ReleaseWorker::new(store.clone(), release_policy());
    let shows = engine
        .schedule_shows("tt0133093", 10, &[Utc::now() + Duration::hours(3)])
        .await
        .unwrap();
    (engine, bridge, worker, shows[0].id)
}

#[tokio::test]
async fn unpaid_booking_expires_and_frees_its_seats() {
    let store = Arc::new(MemoryStore::new());
    let (engine, bridge, worker, show_id) = seed(store.clone(), 0).await;

    let reservation = engine
        .reserve_seats(show_id, &["A1".into(), "A2".into()], "u1")
        .await
        .unwrap();

    let released = worker.tick(Utc::now()).await.unwrap();
    assert_eq!(released, 1);

    let booking = bridge
        .booking_status(reservation.booking_id, "u1")
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert!(engine.occupied_seats(show_id).await.unwrap().is_empty());

    // The task is done; another sweep finds nothing to do.
    assert_eq!(worker.tick(Utc::now()).await.unwrap(), 0);
}

#[tokio::test]
async fn paid_booking_survives_expiry() {
    let store = Arc::new(MemoryStore::new());
    let (engine, bridge, worker, show_id) = seed(store.clone(), 420).await;

    let reservation = engine
        .reserve_seats(show_id, &["A1".into(), "A2".into()], "u1")
        .await
        .unwrap();

    // Confirmation lands well before the deadline.
    assert_eq!(
        bridge.confirm_booking(reservation.booking_id).await.unwrap(),
        Confirmation::Confirmed
    );

    // The deadline passes and the evaluate step runs on fresh state.
    let after_deadline = Utc::now() + Duration::minutes(8);
    assert_eq!(worker.tick(after_deadline).await.unwrap(), 0);

    let booking = bridge
        .booking_status(reservation.booking_id, "u1")
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Paid);
    assert_eq!(
        engine.occupied_seats(show_id).await.unwrap(),
        vec!["A1".to_string(), "A2".to_string()]
    );
}

#[tokio::test]
async fn expiry_releases_exactly_the_booked_seats() {
    let store = Arc::new(MemoryStore::new());
    let (engine, bridge, worker, show_id) = seed(store.clone(), 0).await;

    let doomed = engine
        .reserve_seats(show_id, &["A1".into(), "A2".into()], "u1")
        .await
        .unwrap();
    let kept = engine
        .reserve_seats(show_id, &["B1".into()], "u2")
        .await
        .unwrap();
    bridge.confirm_booking(kept.booking_id).await.unwrap();

    worker.tick(Utc::now()).await.unwrap();

    assert_eq!(
        engine.occupied_seats(show_id).await.unwrap(),
        vec!["B1".to_string()],
        "only the unpaid booking's seats are removed"
    );
    assert_eq!(
        bridge
            .booking_status(doomed.booking_id, "u1")
            .await
            .unwrap()
            .status,
        BookingStatus::Cancelled
    );
}

#[tokio::test]
async fn confirmation_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let (engine, bridge, _worker, show_id) = seed(store.clone(), 420).await;

    let reservation = engine
        .reserve_seats(show_id, &["A1".into()], "u1")
        .await
        .unwrap();

    assert_eq!(
        bridge.confirm_booking(reservation.booking_id).await.unwrap(),
        Confirmation::Confirmed
    );
    assert_eq!(
        bridge.confirm_booking(reservation.booking_id).await.unwrap(),
        Confirmation::Duplicate
    );

    let booking = bridge
        .booking_status(reservation.booking_id, "u1")
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Paid);
    assert_eq!(
        engine.occupied_seats(show_id).await.unwrap(),
        vec!["A1".to_string()]
    );

    assert!(matches!(
        bridge.confirm_booking(Uuid::new_v4()).await,
        Err(ReservationError::BookingNotFound(_))
    ));
}

#[tokio::test]
async fn release_retry_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _bridge, worker, show_id) = seed(store.clone(), 0).await;

    let reservation = engine
        .reserve_seats(show_id, &["A1".into()], "u1")
        .await
        .unwrap();
    worker.tick(Utc::now()).await.unwrap();

    // Re-running the release step directly, as a crashed-then-retried task
    // would, changes nothing and reports nothing to release.
    assert_eq!(
        store.release_if_unpaid(reservation.booking_id).await.unwrap(),
        ReleaseOutcome::AlreadyCancelled
    );
    assert!(engine.occupied_seats(show_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn late_confirmation_after_release_is_flagged_not_hidden() {
    let store = Arc::new(MemoryStore::new());
    let (engine, bridge, worker, show_id) = seed(store.clone(), 0).await;

    let reservation = engine
        .reserve_seats(show_id, &["A1".into()], "u1")
        .await
        .unwrap();
    worker.tick(Utc::now()).await.unwrap();

    // The provider's confirmation arrives after the seats were given back.
    assert_eq!(
        bridge.confirm_booking(reservation.booking_id).await.unwrap(),
        Confirmation::AfterRelease
    );
    // The terminal state stands; no seats reappear.
    assert_eq!(
        bridge
            .booking_status(reservation.booking_id, "u1")
            .await
            .unwrap()
            .status,
        BookingStatus::Cancelled
    );
    assert!(engine.occupied_seats(show_id).await.unwrap().is_empty());
}

// Store wrapper that fails the release step a set number of times, to
// exercise the worker's retry path.
struct FlakyStore {
    inner: MemoryStore,
    release_failures: AtomicUsize,
}

impl FlakyStore {
    fn failing_releases(times: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            release_failures: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl ReservationStore for FlakyStore {
    async fn create_show(&self, show: &Show) -> Result<(), StoreError> {
        self.inner.create_show(show).await
    }
    async fn show(&self, id: Uuid) -> Result<Option<Show>, StoreError> {
        self.inner.show(id).await
    }
    async fn upcoming_shows(&self, from: DateTime<Utc>) -> Result<Vec<Show>, StoreError> {
        self.inner.upcoming_shows(from).await
    }
    async fn occupied_seats(&self, show_id: Uuid) -> Result<Option<Vec<String>>, StoreError> {
        self.inner.occupied_seats(show_id).await
    }
    async fn reserve(
        &self,
        booking: &Booking,
        release_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        self.inner.reserve(booking, release_at).await
    }
    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.inner.booking(id).await
    }
    async fn bookings_for(&self, requester: &str) -> Result<Vec<Booking>, StoreError> {
        self.inner.bookings_for(requester).await
    }
    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        session_ref: &str,
    ) -> Result<bool, StoreError> {
        self.inner.attach_payment_session(booking_id, session_ref).await
    }
    async fn booking_by_payment_session(
        &self,
        session_ref: &str,
    ) -> Result<Option<Booking>, StoreError> {
        self.inner.booking_by_payment_session(session_ref).await
    }
    async fn mark_paid(&self, booking_id: Uuid) -> Result<PaidOutcome, StoreError> {
        self.inner.mark_paid(booking_id).await
    }
    async fn release_if_unpaid(&self, booking_id: Uuid) -> Result<ReleaseOutcome, StoreError> {
        let remaining = self.release_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.release_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.inner.release_if_unpaid(booking_id).await
    }
    async fn claim_due_release_tasks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReleaseTask>, StoreError> {
        self.inner.claim_due_release_tasks(now, limit).await
    }
    async fn complete_release_task(&self, booking_id: Uuid) -> Result<(), StoreError> {
        self.inner.complete_release_task(booking_id).await
    }
    async fn retry_release_task(
        &self,
        booking_id: Uuid,
        next_run: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        self.inner.retry_release_task(booking_id, next_run).await
    }
    async fn requeue_stale_release_tasks(
        &self,
        stuck_since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.requeue_stale_release_tasks(stuck_since).await
    }
}

#[tokio::test]
async fn failed_release_is_rearmed_and_eventually_succeeds() {
    let store = Arc::new(FlakyStore::failing_releases(1));
    let engine = ReservationEngine::new(store.clone(), ReservationPolicy::new(0, "USD".into()));
    let worker = ReleaseWorker::new(store.clone(), release_policy());

    let shows = engine
        .schedule_shows("tt0133093", 10, &[Utc::now() + Duration::hours(3)])
        .await
        .unwrap();
    let show_id = shows[0].id;
    let reservation = engine
        .reserve_seats(show_id, &["A1".into()], "u1")
        .await
        .unwrap();

    // First sweep hits the injected outage; the task is re-armed with
    // backoff, nothing is released, and nothing is lost.
    let now = Utc::now();
    assert_eq!(worker.tick(now).await.unwrap(), 0);
    assert_eq!(
        engine.occupied_seats(show_id).await.unwrap(),
        vec!["A1".to_string()]
    );

    // Once the backoff elapses the retry completes the release.
    let after_backoff = now + Duration::seconds(31);
    assert_eq!(worker.tick(after_backoff).await.unwrap(), 1);
    assert!(engine.occupied_seats(show_id).await.unwrap().is_empty());
    assert_eq!(
        store.booking(reservation.booking_id).await.unwrap().unwrap().status,
        BookingStatus::Cancelled
    );
}
