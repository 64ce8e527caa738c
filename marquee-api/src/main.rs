use std::net::SocketAddr;
use std::sync::Arc;

use marquee_api::{app, state::AuthConfig, AppState};
use marquee_core::ReservationStore;
use marquee_engine::{PaymentBridge, ReleasePolicy, ReleaseWorker, ReservationEngine, ReservationPolicy};
use marquee_store::{DbClient, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,marquee_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = marquee_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store: Arc<dyn ReservationStore> = Arc::new(PgStore::new(db.pool.clone()));
    let rules = &config.business_rules;

    let engine = Arc::new(ReservationEngine::new(
        store.clone(),
        ReservationPolicy::new(rules.hold_expiry_seconds, rules.currency.clone()),
    ));
    let bridge = Arc::new(PaymentBridge::new(store.clone()));

    // Durable delayed-release runner; holds survive restarts in the task table.
    let worker = ReleaseWorker::new(
        store.clone(),
        ReleasePolicy::new(
            rules.release_poll_seconds,
            rules.release_batch_size,
            rules.release_retry_seconds,
            rules.release_alert_attempts,
            rules.release_stale_seconds,
        ),
    );
    tokio::spawn(worker.run());

    let app_state = AppState {
        engine,
        bridge,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app(app_state))
        .await
        .expect("Server error");
}
