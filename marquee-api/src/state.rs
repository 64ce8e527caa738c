use std::sync::Arc;

use marquee_engine::{PaymentBridge, ReservationEngine};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub bridge: Arc<PaymentBridge>,
    pub auth: AuthConfig,
}
