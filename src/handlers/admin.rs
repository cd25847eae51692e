use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Reservation, ReservationStatus};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/reservations
#[derive(Deserialize)]
pub struct ReservationsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ReservationResponse {
    id: String,
    conversation_id: String,
    customer_name: String,
    service: String,
    date_time: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            conversation_id: r.conversation_id,
            customer_name: r.customer_name,
            service: r.service,
            date_time: r.date_time.format("%Y-%m-%d %H:%M").to_string(),
            status: r.status.as_str().to_string(),
            created_at: r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            updated_at: r.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn get_reservations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ReservationsQuery>,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let reservations = {
        let db = state.db()?;
        queries::get_all_reservations(&db, query.status.as_deref(), limit)?
    };

    Ok(Json(reservations.into_iter().map(ReservationResponse::from).collect()))
}

// POST /api/admin/reservations/:id/cancel
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db()?;
    if !queries::update_reservation_status(&db, &id, ReservationStatus::Cancelled)? {
        return Err(AppError::NotFound(format!("reservation {id}")));
    }
    let reservation = queries::get_reservation_by_id(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("reservation {id}")))?;

    tracing::info!(reservation = %id, "reservation cancelled by admin");
    Ok(Json(reservation.into()))
}
