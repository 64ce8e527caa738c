use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use marquee_core::{Booking, PaidOutcome, ReservationError, ReservationStore, StoreError};

/// Result of a payment confirmation. Duplicates are success, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    /// Already paid; duplicate delivery from the provider.
    Duplicate,
    /// The expiry step released the seats before the confirmation landed.
    /// Acknowledged so the provider stops retrying, but flagged for
    /// reconciliation: the money moved and the seats are gone.
    AfterRelease,
}

/// Bridges external payment-completed notifications into booking state.
pub struct PaymentBridge {
    store: Arc<dyn ReservationStore>,
}

impl PaymentBridge {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    /// Idempotent `Pending -> Paid`; clears the stored session link.
    pub async fn confirm_booking(&self, booking_id: Uuid) -> Result<Confirmation, ReservationError> {
        match self.store.mark_paid(booking_id).await? {
            PaidOutcome::Marked => {
                info!(booking_id = %booking_id, "booking marked paid");
                Ok(Confirmation::Confirmed)
            }
            PaidOutcome::AlreadyPaid => {
                debug!(booking_id = %booking_id, "duplicate payment confirmation ignored");
                Ok(Confirmation::Duplicate)
            }
            PaidOutcome::AfterRelease => {
                error!(
                    booking_id = %booking_id,
                    "payment confirmed after seats were released; needs reconciliation"
                );
                Ok(Confirmation::AfterRelease)
            }
            PaidOutcome::Missing => Err(ReservationError::BookingNotFound(booking_id)),
        }
    }

    /// Confirm via the provider session reference stored at reservation
    /// time. The link is cleared once paid, so a duplicate that arrives
    /// with only the session id resolves to nothing; callers treat that as
    /// already-processed.
    pub async fn confirm_session(&self, session_ref: &str) -> Result<Confirmation, ReservationError> {
        let booking = self
            .store
            .booking_by_payment_session(session_ref)
            .await?
            .ok_or_else(|| {
                ReservationError::InvalidRequest(format!("unknown payment session {session_ref}"))
            })?;
        self.confirm_booking(booking.id).await
    }

    /// Store the provider session reference on a still-pending booking.
    /// Only the booking's owner may attach a session.
    pub async fn register_session(
        &self,
        booking_id: Uuid,
        requester: &str,
        session_ref: &str,
    ) -> Result<(), ReservationError> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or(ReservationError::BookingNotFound(booking_id))?;
        if booking.requester != requester {
            return Err(ReservationError::Forbidden);
        }

        match self.store.attach_payment_session(booking_id, session_ref).await {
            Ok(true) => {
                debug!(booking_id = %booking_id, "payment session attached");
                Ok(())
            }
            Ok(false) => Err(ReservationError::InvalidState(format!(
                "booking is {} and can no longer start payment",
                booking.status
            ))),
            // The session ref is bound to a different booking; the caller
            // sent a stale or reused reference, not a server fault.
            Err(StoreError::Conflict(msg)) => Err(ReservationError::InvalidState(msg)),
            Err(err) => Err(err.into()),
        }
    }

    /// Current state of a booking, owner only. Read-only.
    pub async fn booking_status(
        &self,
        booking_id: Uuid,
        requester: &str,
    ) -> Result<Booking, ReservationError> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or(ReservationError::BookingNotFound(booking_id))?;
        if booking.requester != requester {
            return Err(ReservationError::Forbidden);
        }
        Ok(booking)
    }
}
