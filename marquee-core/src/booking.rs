use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reservation attempt's durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub show_id: Uuid,
    pub requester: String,
    /// Seat labels in the order they were requested; unique within the booking.
    pub seats: Vec<String>,
    /// Total in minor units: seat price at reservation time x seat count.
    pub amount: i64,
    pub currency: String,
    pub status: BookingStatus,
    /// Provider session reference, stored at reservation time and cleared
    /// once the booking is paid.
    pub payment_session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment lifecycle. `Paid` and `Cancelled` are terminal; both transitions
/// are conditional writes on the current state being `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "PAID" => Some(BookingStatus::Paid),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Booking {
    pub fn new(
        show_id: Uuid,
        requester: String,
        seats: Vec<String>,
        amount: i64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            show_id,
            requester,
            seats,
            amount,
            currency,
            status: BookingStatus::Pending,
            payment_session: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [BookingStatus::Pending, BookingStatus::Paid, BookingStatus::Cancelled] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("EXPIRED"), None);
    }
}
