pub mod booking;
pub mod error;
pub mod show;
pub mod store;
pub mod task;

pub use booking::{Booking, BookingStatus};
pub use error::{ReservationError, StoreError};
pub use show::Show;
pub use store::{ClaimOutcome, PaidOutcome, ReleaseOutcome, ReservationStore};
pub use task::{ReleaseTask, TaskState};
