use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A scheduled screening with its own price and seat-holder map.
///
/// `occupied` is the single canonical occupancy representation: seat label
/// mapped to holder id, absent key means free. Only the reservation
/// transaction adds keys and only the release step removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub id: Uuid,
    /// Opaque reference into the movie catalog (metadata lives elsewhere).
    pub movie_ref: String,
    pub starts_at: DateTime<Utc>,
    /// Per-seat price in minor units.
    pub seat_price: i64,
    pub currency: String,
    pub occupied: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Show {
    pub fn new(movie_ref: String, starts_at: DateTime<Utc>, seat_price: i64, currency: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_ref,
            starts_at,
            seat_price,
            currency,
            occupied: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Held seat labels, sorted.
    pub fn occupied_labels(&self) -> Vec<String> {
        self.occupied.keys().cloned().collect()
    }
}
