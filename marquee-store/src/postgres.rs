use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use marquee_core::{
    Booking, BookingStatus, ClaimOutcome, PaidOutcome, ReleaseOutcome, ReleaseTask,
    ReservationStore, Show, StoreError, TaskState,
};

/// Postgres-backed reservation store.
///
/// Occupancy lives in `show_seats`, whose `(show_id, seat_label)` primary
/// key makes a second claim of a held seat impossible; the reservation and
/// release paths each run as one transaction so partial claims never commit.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

// Row structs for type-safe querying, converted into domain types below.

#[derive(sqlx::FromRow)]
struct ShowRow {
    id: Uuid,
    movie_ref: String,
    starts_at: DateTime<Utc>,
    seat_price: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    show_id: Uuid,
    requester: String,
    seats: Vec<String>,
    amount: i64,
    currency: String,
    status: String,
    payment_session: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    booking_id: Uuid,
    run_at: DateTime<Utc>,
    state: String,
    attempts: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, StoreError> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown booking status {}", row.status)))?;
        Ok(Booking {
            id: row.id,
            show_id: row.show_id,
            requester: row.requester,
            seats: row.seats,
            amount: row.amount,
            currency: row.currency,
            status,
            payment_session: row.payment_session,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<TaskRow> for ReleaseTask {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, StoreError> {
        let state = TaskState::parse(&row.state)
            .ok_or_else(|| StoreError::Backend(format!("unknown task state {}", row.state)))?;
        Ok(ReleaseTask {
            booking_id: row.booking_id,
            run_at: row.run_at,
            state,
            attempts: row.attempts,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str =
    "id, show_id, requester, seats, amount, currency, status, payment_session, created_at, updated_at";

impl PgStore {
    async fn seat_map(&self, show_id: Uuid) -> Result<BTreeMap<String, String>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT seat_label, holder_id FROM show_seats WHERE show_id = $1")
                .bind(show_id)
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(rows.into_iter().collect())
    }

    fn show_from(row: ShowRow, occupied: BTreeMap<String, String>) -> Show {
        Show {
            id: row.id,
            movie_ref: row.movie_ref,
            starts_at: row.starts_at,
            seat_price: row.seat_price,
            currency: row.currency,
            occupied,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn create_show(&self, show: &Show) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO shows (id, movie_ref, starts_at, seat_price, currency, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(show.id)
        .bind(&show.movie_ref)
        .bind(show.starts_at)
        .bind(show.seat_price)
        .bind(&show.currency)
        .bind(show.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn show(&self, id: Uuid) -> Result<Option<Show>, StoreError> {
        let row: Option<ShowRow> = sqlx::query_as(
            "SELECT id, movie_ref, starts_at, seat_price, currency, created_at
             FROM shows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => {
                let occupied = self.seat_map(row.id).await?;
                Ok(Some(Self::show_from(row, occupied)))
            }
            None => Ok(None),
        }
    }

    async fn upcoming_shows(&self, from: DateTime<Utc>) -> Result<Vec<Show>, StoreError> {
        let rows: Vec<ShowRow> = sqlx::query_as(
            "SELECT id, movie_ref, starts_at, seat_price, currency, created_at
             FROM shows WHERE starts_at >= $1 ORDER BY starts_at",
        )
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut shows = Vec::with_capacity(rows.len());
        for row in rows {
            let occupied = self.seat_map(row.id).await?;
            shows.push(Self::show_from(row, occupied));
        }
        Ok(shows)
    }

    async fn occupied_seats(&self, show_id: Uuid) -> Result<Option<Vec<String>>, StoreError> {
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM shows WHERE id = $1")
            .bind(show_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        if exists.is_none() {
            return Ok(None);
        }

        let labels: Vec<String> = sqlx::query_scalar(
            "SELECT seat_label FROM show_seats WHERE show_id = $1 ORDER BY seat_label",
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(Some(labels))
    }

    async fn reserve(
        &self,
        booking: &Booking,
        release_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM shows WHERE id = $1")
            .bind(booking.show_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        if exists.is_none() {
            return Ok(ClaimOutcome::ShowMissing);
        }

        sqlx::query(
            "INSERT INTO bookings (id, show_id, requester, seats, amount, currency, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id)
        .bind(booking.show_id)
        .bind(&booking.requester)
        .bind(&booking.seats)
        .bind(booking.amount)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        // The claim itself: one insert per requested seat, all inside this
        // transaction. Any seat already in the map is skipped by the primary
        // key conflict, so a short row count means the claim must not commit.
        let claimed = sqlx::query(
            "INSERT INTO show_seats (show_id, seat_label, holder_id, booking_id)
             SELECT $1, seat, $2, $3 FROM unnest($4::text[]) AS seat
             ON CONFLICT (show_id, seat_label) DO NOTHING",
        )
        .bind(booking.show_id)
        .bind(&booking.requester)
        .bind(booking.id)
        .bind(&booking.seats)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        if claimed.rows_affected() as usize != booking.seats.len() {
            tx.rollback().await.map_err(store_err)?;
            let taken: Vec<String> = sqlx::query_scalar(
                "SELECT seat_label FROM show_seats
                 WHERE show_id = $1 AND seat_label = ANY($2) ORDER BY seat_label",
            )
            .bind(booking.show_id)
            .bind(&booking.seats)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
            return Ok(ClaimOutcome::Conflict { taken });
        }

        sqlx::query("INSERT INTO seat_release_tasks (booking_id, run_at) VALUES ($1, $2)")
            .bind(booking.id)
            .bind(release_at)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(ClaimOutcome::Claimed)
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for(&self, requester: &str) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE requester = $1 ORDER BY created_at DESC"
        ))
        .bind(requester)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn attach_payment_session(
        &self,
        booking_id: Uuid,
        session_ref: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE bookings SET payment_session = $2, updated_at = now()
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(booking_id)
        .bind(session_ref)
        .execute(&self.pool)
        .await;
        match res {
            Ok(done) => Ok(done.rows_affected() == 1),
            // The partial unique index on bookings.payment_session rejects a
            // session ref already attached to another booking.
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(StoreError::Conflict(format!(
                    "payment session {session_ref} is already attached to another booking"
                )))
            }
            Err(err) => Err(store_err(err)),
        }
    }

    async fn booking_by_payment_session(
        &self,
        session_ref: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_session = $1"
        ))
        .bind(session_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn mark_paid(&self, booking_id: Uuid) -> Result<PaidOutcome, StoreError> {
        let res = sqlx::query(
            "UPDATE bookings SET status = 'PAID', payment_session = NULL, updated_at = now()
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        if res.rows_affected() == 1 {
            return Ok(PaidOutcome::Marked);
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match status.as_deref() {
            Some("PAID") => Ok(PaidOutcome::AlreadyPaid),
            Some("CANCELLED") => Ok(PaidOutcome::AfterRelease),
            Some(other) => Err(StoreError::Backend(format!("unexpected booking status {other}"))),
            None => Ok(PaidOutcome::Missing),
        }
    }

    async fn release_if_unpaid(&self, booking_id: Uuid) -> Result<ReleaseOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // The authoritative last-read check: the status predicate makes the
        // cancel lose cleanly to a payment that already committed.
        let seats: Option<Vec<String>> = sqlx::query_scalar(
            "UPDATE bookings SET status = 'CANCELLED', updated_at = now()
             WHERE id = $1 AND status = 'PENDING' RETURNING seats",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        match seats {
            Some(seats) => {
                // Exclusivity of the claim means these rows can only belong
                // to this booking; deleting by booking id is a retry no-op.
                sqlx::query("DELETE FROM show_seats WHERE booking_id = $1")
                    .bind(booking_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                tx.commit().await.map_err(store_err)?;
                Ok(ReleaseOutcome::Released { seats })
            }
            None => {
                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
                        .bind(booking_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(store_err)?;
                match status.as_deref() {
                    Some("PAID") => Ok(ReleaseOutcome::StillPaid),
                    Some("CANCELLED") => Ok(ReleaseOutcome::AlreadyCancelled),
                    Some(other) => {
                        Err(StoreError::Backend(format!("unexpected booking status {other}")))
                    }
                    None => Ok(ReleaseOutcome::Missing),
                }
            }
        }
    }

    async fn claim_due_release_tasks(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReleaseTask>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "UPDATE seat_release_tasks t SET state = 'RUNNING', updated_at = now()
             FROM (
                 SELECT booking_id FROM seat_release_tasks
                 WHERE state = 'ARMED' AND run_at <= $1
                 ORDER BY run_at LIMIT $2
                 FOR UPDATE SKIP LOCKED
             ) due
             WHERE t.booking_id = due.booking_id
             RETURNING t.booking_id, t.run_at, t.state, t.attempts, t.updated_at",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(ReleaseTask::try_from).collect()
    }

    async fn complete_release_task(&self, booking_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE seat_release_tasks SET state = 'DONE', updated_at = now() WHERE booking_id = $1",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn retry_release_task(
        &self,
        booking_id: Uuid,
        next_run: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let attempts: i32 = sqlx::query_scalar(
            "UPDATE seat_release_tasks
             SET state = 'ARMED', run_at = $2, attempts = attempts + 1, updated_at = now()
             WHERE booking_id = $1 RETURNING attempts",
        )
        .bind(booking_id)
        .bind(next_run)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(attempts)
    }

    async fn requeue_stale_release_tasks(
        &self,
        stuck_since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let res = sqlx::query(
            "UPDATE seat_release_tasks SET state = 'ARMED', updated_at = now()
             WHERE state = 'RUNNING' AND updated_at < $1",
        )
        .bind(stuck_since)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(res.rows_affected())
    }
}
