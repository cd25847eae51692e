use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, BookingError};
use crate::models::{BookingData, BookingStatus, ConversationMessage, Field};
use crate::services::conversation;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub status: BookingStatus,
    pub awaiting: Option<Field>,
    pub booking: BookingData,
    pub messages: Vec<ConversationMessage>,
    pub expires_at: String,
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct TurnResponse {
    pub reply: String,
    pub status: BookingStatus,
    pub awaiting: Option<Field>,
    pub booking: BookingData,
}

fn into_app_error(e: anyhow::Error) -> AppError {
    match e.downcast::<BookingError>() {
        Ok(booking) => AppError::Booking(booking),
        Err(other) => AppError::Internal(other),
    }
}

// POST /api/conversations
pub async fn create_conversation(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let conv = conversation::start_conversation(&state)?;
    tracing::info!(conversation = %conv.id, "conversation started");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": conv.id })),
    )
        .into_response())
}

// GET /api/conversations/:id
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conv = conversation::get_conversation(&state, &id)?
        .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;

    Ok(Json(ConversationResponse {
        id: conv.id,
        status: conv.state.status,
        awaiting: conv.state.awaiting,
        booking: conv.state.booking,
        messages: conv.state.messages,
        expires_at: conv.expires_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}

// POST /api/conversations/:id/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let turn = conversation::process_message(&state, &id, message)
        .await
        .map_err(into_app_error)?;

    Ok(Json(TurnResponse {
        reply: turn.reply,
        status: turn.state.status,
        awaiting: turn.state.awaiting,
        booking: turn.state.booking,
    }))
}

// DELETE /api/conversations/:id
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if conversation::abandon_conversation(&state, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("conversation {id}")))
    }
}
