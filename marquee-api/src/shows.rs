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

use marquee_core::Show;

use crate::auth::{require_claims, ROLE_ADMIN};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateShowsRequest {
    movie_ref: String,
    /// Per-seat price in minor units.
    seat_price: i64,
    starts_at: Vec<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ShowSummary {
    id: Uuid,
    movie_ref: String,
    starts_at: DateTime<Utc>,
    seat_price: i64,
    currency: String,
    occupied_seats: Vec<String>,
}

impl From<Show> for ShowSummary {
    fn from(show: Show) -> Self {
        let occupied_seats = show.occupied_labels();
        Self {
            id: show.id,
            movie_ref: show.movie_ref,
            starts_at: show.starts_at,
            seat_price: show.seat_price,
            currency: show.currency,
            occupied_seats,
        }
    }
}

#[derive(Debug, Serialize)]
struct OccupiedSeatsResponse {
    occupied_seats: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows", post(create_shows).get(list_shows))
        .route("/v1/shows/{id}", get(get_show))
        .route("/v1/shows/{id}/seats", get(occupied_seats))
}

async fn create_shows(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<CreateShowsRequest>,
) -> Result<(StatusCode, Json<Vec<ShowSummary>>), ApiError> {
    let claims = require_claims(&state.auth.secret, bearer.token())?;
    if claims.role != ROLE_ADMIN {
        return Err(ApiError::Forbidden("scheduling shows requires an admin token".into()));
    }

    let created = state
        .engine
        .schedule_shows(&req.movie_ref, req.seat_price, &req.starts_at)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(created.into_iter().map(ShowSummary::from).collect()),
    ))
}

async fn list_shows(State(state): State<AppState>) -> Result<Json<Vec<ShowSummary>>, ApiError> {
    let shows = state.engine.upcoming_shows().await?;
    Ok(Json(shows.into_iter().map(ShowSummary::from).collect()))
}

async fn get_show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShowSummary>, ApiError> {
    let show = state.engine.show(id).await?;
    Ok(Json(show.into()))
}

async fn occupied_seats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OccupiedSeatsResponse>, ApiError> {
    let occupied_seats = state.engine.occupied_seats(id).await?;
    Ok(Json(OccupiedSeatsResponse { occupied_seats }))
}
