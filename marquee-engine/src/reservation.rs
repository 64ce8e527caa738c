use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use marquee_core::{Booking, ClaimOutcome, ReservationError, ReservationStore, Show};

/// Business knobs for the reservation path.
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    /// How long a pending booking holds its seats before release.
    pub hold_expiry: Duration,
    /// Currency newly scheduled shows are priced in.
    pub currency: String,
}

impl ReservationPolicy {
    pub fn new(hold_expiry_seconds: u64, currency: String) -> Self {
        Self {
            hold_expiry: Duration::seconds(hold_expiry_seconds as i64),
            currency,
        }
    }
}

/// A successful reservation, handed back to the caller for the payment
/// redirect.
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub booking_id: Uuid,
    pub show_id: Uuid,
    pub seats: Vec<String>,
    pub amount: i64,
    pub currency: String,
    /// When the hold lapses if the booking stays unpaid.
    pub expires_at: DateTime<Utc>,
}

/// The seat reservation engine: turns a (show, seat set, requester) request
/// into a conflict-free hold with a pending booking and an armed release
/// task, or into a structured refusal.
pub struct ReservationEngine {
    store: Arc<dyn ReservationStore>,
    policy: ReservationPolicy,
}

const MAX_SEAT_LABEL_LEN: usize = 8;

impl ReservationEngine {
    pub fn new(store: Arc<dyn ReservationStore>, policy: ReservationPolicy) -> Self {
        Self { store, policy }
    }

    /// Atomically claim `seats` on `show_id` for `requester`.
    ///
    /// All-or-nothing: on any conflict nothing is written and the error
    /// carries the show's current occupancy so the caller can re-pick.
    /// Not idempotent; retrying after a failure is safe only because
    /// failure implies no mutation happened.
    pub async fn reserve_seats(
        &self,
        show_id: Uuid,
        seats: &[String],
        requester: &str,
    ) -> Result<Reservation, ReservationError> {
        let seats = validate_seats(seats)?;
        if requester.trim().is_empty() {
            return Err(ReservationError::InvalidRequest("requester is required".into()));
        }

        let show = self
            .store
            .show(show_id)
            .await?
            .ok_or(ReservationError::ShowNotFound(show_id))?;

        let amount = show.seat_price * seats.len() as i64;
        let booking = Booking::new(show_id, requester.to_string(), seats, amount, show.currency);
        let expires_at = booking.created_at + self.policy.hold_expiry;

        match self.store.reserve(&booking, expires_at).await? {
            ClaimOutcome::Claimed => {
                info!(
                    booking_id = %booking.id,
                    show_id = %show_id,
                    seats = booking.seats.len(),
                    amount,
                    "seats reserved"
                );
                Ok(Reservation {
                    booking_id: booking.id,
                    show_id,
                    seats: booking.seats,
                    amount: booking.amount,
                    currency: booking.currency,
                    expires_at,
                })
            }
            ClaimOutcome::Conflict { taken } => {
                // Present the full current occupancy, not just the clash.
                let occupied = self
                    .store
                    .occupied_seats(show_id)
                    .await?
                    .unwrap_or(taken);
                Err(ReservationError::SeatConflict { occupied })
            }
            ClaimOutcome::ShowMissing => Err(ReservationError::ShowNotFound(show_id)),
        }
    }

    pub async fn show(&self, show_id: Uuid) -> Result<Show, ReservationError> {
        self.store
            .show(show_id)
            .await?
            .ok_or(ReservationError::ShowNotFound(show_id))
    }

    /// Snapshot of held seat labels; last committed state, no freshness
    /// guarantee.
    pub async fn occupied_seats(&self, show_id: Uuid) -> Result<Vec<String>, ReservationError> {
        self.store
            .occupied_seats(show_id)
            .await?
            .ok_or(ReservationError::ShowNotFound(show_id))
    }

    /// Schedule screenings with empty seat maps. Start times already in the
    /// past are skipped; if nothing remains the request is rejected.
    pub async fn schedule_shows(
        &self,
        movie_ref: &str,
        seat_price: i64,
        starts_at: &[DateTime<Utc>],
    ) -> Result<Vec<Show>, ReservationError> {
        if movie_ref.trim().is_empty() {
            return Err(ReservationError::InvalidRequest("movie reference is required".into()));
        }
        if seat_price <= 0 {
            return Err(ReservationError::InvalidRequest("seat price must be positive".into()));
        }
        if starts_at.is_empty() {
            return Err(ReservationError::InvalidRequest("at least one show time is required".into()));
        }

        let now = Utc::now();
        let mut created = Vec::new();
        for &when in starts_at {
            if when < now {
                continue;
            }
            let show = Show::new(
                movie_ref.to_string(),
                when,
                seat_price,
                self.policy.currency.clone(),
            );
            self.store.create_show(&show).await?;
            created.push(show);
        }

        if created.is_empty() {
            return Err(ReservationError::InvalidRequest(
                "all provided show times are in the past".into(),
            ));
        }
        info!(movie_ref, count = created.len(), "shows scheduled");
        Ok(created)
    }

    /// Shows from the start of today (UTC) onward, soonest first.
    pub async fn upcoming_shows(&self) -> Result<Vec<Show>, ReservationError> {
        let start_of_today = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Ok(self.store.upcoming_shows(start_of_today).await?)
    }

    /// The requester's bookings, newest first.
    pub async fn bookings_for(&self, requester: &str) -> Result<Vec<Booking>, ReservationError> {
        Ok(self.store.bookings_for(requester).await?)
    }
}

fn validate_seats(seats: &[String]) -> Result<Vec<String>, ReservationError> {
    if seats.is_empty() {
        return Err(ReservationError::InvalidRequest("no seats selected".into()));
    }

    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(seats.len());
    for seat in seats {
        let label = seat.trim();
        if label.is_empty() || label.len() > MAX_SEAT_LABEL_LEN {
            return Err(ReservationError::InvalidRequest(format!(
                "malformed seat label {seat:?}"
            )));
        }
        if !seen.insert(label.to_string()) {
            return Err(ReservationError::InvalidRequest(format!(
                "seat {label} requested twice"
            )));
        }
        cleaned.push(label.to_string());
    }
    Ok(cleaned)
}
