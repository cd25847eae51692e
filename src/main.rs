use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use booking_agent::config::AppConfig;
use booking_agent::db;
use booking_agent::handlers;
use booking_agent::services::availability::ScheduleAvailability;
use booking_agent::services::controller::BookingController;
use booking_agent::services::conversation;
use booking_agent::services::messaging;
use booking_agent::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let source = ScheduleAvailability::new(
        Arc::clone(&db),
        config.opening_hours.clone(),
        config.services.clone(),
    );
    let controller = BookingController::new(Arc::new(source), config.services.clone())
        .with_policy(config.unavailable_policy)
        .with_confirmation(config.require_confirmation);

    tracing::info!(
        services = %config.services.to_human_readable(),
        hours = %config.opening_hours.to_human_readable(),
        slot_minutes = config.opening_hours.slot_minutes,
        policy = config.unavailable_policy.as_str(),
        require_confirmation = config.require_confirmation,
        "booking controller ready"
    );

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        controller,
        messaging: messaging::from_config(&config),
    });

    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = conversation::sweep_expired(&sweeper) {
                tracing::error!(error = %e, "failed to expire conversations");
            }
        }
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
