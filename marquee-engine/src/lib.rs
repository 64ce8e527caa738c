pub mod expiry;
pub mod payment;
pub mod reservation;

pub use expiry::{ReleasePolicy, ReleaseWorker};
pub use payment::{Confirmation, PaymentBridge};
pub use reservation::{Reservation, ReservationEngine, ReservationPolicy};
