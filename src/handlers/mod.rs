pub mod admin;
pub mod chat;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/conversations", post(chat::create_conversation))
        .route(
            "/api/conversations/:id",
            get(chat::get_conversation).delete(chat::delete_conversation),
        )
        .route("/api/conversations/:id/messages", post(chat::send_message))
        .route("/webhook/sms", post(webhook::sms_webhook))
        .route("/api/admin/reservations", get(admin::get_reservations))
        .route(
            "/api/admin/reservations/:id/cancel",
            post(admin::cancel_reservation),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
