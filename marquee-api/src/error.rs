use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use marquee_core::ReservationError;

#[derive(Debug)]
pub enum ApiError {
    Authentication(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    /// Requested seats are taken; the body carries current occupancy so the
    /// client can offer a new selection.
    SeatConflict { occupied: Vec<String> },
    Conflict(String),
    Internal(String),
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ReservationError::ShowNotFound(id) => ApiError::NotFound(format!("show {id} not found")),
            ReservationError::BookingNotFound(id) => {
                ApiError::NotFound(format!("booking {id} not found"))
            }
            ReservationError::SeatConflict { occupied } => ApiError::SeatConflict { occupied },
            ReservationError::Forbidden => {
                ApiError::Forbidden("booking belongs to another user".to_string())
            }
            ReservationError::InvalidState(msg) => ApiError::Conflict(msg),
            ReservationError::Storage(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": msg }))
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::SeatConflict { occupied } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "selected seats are no longer available",
                    "occupied_seats": occupied,
                }),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::Internal(msg) => {
                tracing::error!("internal server error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
