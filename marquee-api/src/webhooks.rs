use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use marquee_core::ReservationError;
use marquee_engine::Confirmation;

use crate::error::ApiError;
use crate::state::AppState;

/// Payment provider event envelope: event type plus the checkout-session
/// object, with our booking id carried in the session metadata.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: SessionObject,
}

#[derive(Debug, Deserialize)]
pub struct SessionObject {
    pub id: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    received: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
///
/// Duplicate deliveries are acknowledged as success; only storage failures
/// return an error so the provider retries.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<WebhookAck>, ApiError> {
    tracing::info!(
        event = %payload.id,
        kind = %payload.type_,
        session = %payload.data.object.id,
        "payment webhook received"
    );

    if payload.type_ != "checkout.session.completed" {
        tracing::debug!(kind = %payload.type_, "unhandled webhook event type");
        return Ok(Json(WebhookAck { received: true }));
    }

    let booking_id = payload
        .data
        .object
        .metadata
        .as_ref()
        .and_then(|m| m.get("booking_id"))
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());

    let result = match booking_id {
        Some(id) => state.bridge.confirm_booking(id).await,
        None => state.bridge.confirm_session(&payload.data.object.id).await,
    };

    match result {
        Ok(Confirmation::Confirmed | Confirmation::Duplicate) => {
            Ok(Json(WebhookAck { received: true }))
        }
        // Already logged as a reconciliation alert; acknowledging stops the
        // provider from redelivering an event we cannot act on.
        Ok(Confirmation::AfterRelease) => Ok(Json(WebhookAck { received: true })),
        // Unknown booking or already-cleared session link: nothing to do.
        Err(ReservationError::BookingNotFound(_)) | Err(ReservationError::InvalidRequest(_)) => {
            tracing::warn!(session = %payload.data.object.id, "webhook did not match an open booking");
            Ok(Json(WebhookAck { received: true }))
        }
        Err(err) => Err(err.into()),
    }
}
