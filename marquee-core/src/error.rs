use uuid::Uuid;

/// Failures surfaced by the storage layer. A `StoreError` always means the
/// operation was not applied; callers may retry the identical request.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation failed: {0}")]
    Backend(String),

    /// A uniqueness rule rejected the write, such as a payment session
    /// reference already attached to a different booking. Retrying the
    /// identical request will fail again.
    #[error("conflicting write: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Reservation engine error taxonomy. These cross the engine boundary as
/// structured results, never as panics.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("show not found: {0}")]
    ShowNotFound(Uuid),

    /// One or more requested seats were already held. Carries the show's
    /// current occupancy so the caller can pick different seats.
    #[error("requested seats are no longer available")]
    SeatConflict { occupied: Vec<String> },

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("requester does not own this booking")]
    Forbidden,

    #[error("booking is not in a state that allows this: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
