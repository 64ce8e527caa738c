use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marquee_core::Booking;
use marquee_engine::Reservation;

use crate::auth::require_claims;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ReserveRequest {
    show_id: Uuid,
    seats: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BookingView {
    id: Uuid,
    show_id: Uuid,
    seats: Vec<String>,
    amount: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            show_id: b.show_id,
            seats: b.seats,
            amount: b.amount,
            currency: b.currency,
            status: b.status.to_string(),
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentSessionRequest {
    session_ref: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(reserve).get(list_mine))
        .route("/v1/bookings/{id}", get(status))
        .route("/v1/bookings/{id}/payment-session", post(register_payment_session))
}

async fn reserve(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let claims = require_claims(&state.auth.secret, bearer.token())?;

    let reservation = state
        .engine
        .reserve_seats(req.show_id, &req.seats, &claims.sub)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn list_mine(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let claims = require_claims(&state.auth.secret, bearer.token())?;

    let bookings = state.engine.bookings_for(&claims.sub).await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

async fn status(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, ApiError> {
    let claims = require_claims(&state.auth.secret, bearer.token())?;

    let booking = state.bridge.booking_status(id, &claims.sub).await?;
    Ok(Json(booking.into()))
}

async fn register_payment_session(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentSessionRequest>,
) -> Result<StatusCode, ApiError> {
    let claims = require_claims(&state.auth.secret, bearer.token())?;
    if req.session_ref.trim().is_empty() {
        return Err(ApiError::BadRequest("session_ref is required".into()));
    }

    state
        .bridge
        .register_session(id, &claims.sub, &req.session_ref)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
