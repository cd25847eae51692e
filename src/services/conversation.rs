use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::db::queries;
use crate::models::{BookingStatus, Conversation};
use crate::services::controller::Turn;
use crate::state::AppState;

/// Runs one customer message through the booking controller, persisting the
/// conversation between turns. Finished conversations are discarded.
pub async fn process_message(
    state: &Arc<AppState>,
    conversation_id: &str,
    message: &str,
) -> anyhow::Result<Turn> {
    let conv = {
        let db = state.db()?;
        queries::get_conversation(&db, conversation_id)?
    }
    .unwrap_or_else(|| new_conversation(state, conversation_id));

    let turn = state
        .controller
        .handle_turn_in(conversation_id, &conv.state, message)?;

    tracing::info!(
        conversation = conversation_id,
        from = conv.state.status.as_str(),
        to = turn.state.status.as_str(),
        "processed message"
    );

    if turn.state.status.is_terminal() {
        {
            let db = state.db()?;
            queries::delete_conversation(&db, conversation_id)?;
        }
        if turn.state.status == BookingStatus::Confirmed {
            let booking = &turn.state.booking;
            let owner_msg = format!(
                "New booking: {} for {} on {} at {}",
                booking.service.as_deref().unwrap_or("service"),
                booking.customer_name.as_deref().unwrap_or("Unknown"),
                booking
                    .date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                booking
                    .time
                    .map(|t| t.format("%H:%M").to_string())
                    .unwrap_or_default(),
            );
            notify_owner(state, &owner_msg).await;
        }
        return Ok(turn);
    }

    let now = Utc::now().naive_utc();
    let updated = Conversation {
        id: conversation_id.to_string(),
        state: turn.state.clone(),
        last_activity: now,
        expires_at: now + ttl(state),
    };
    {
        let db = state.db()?;
        queries::save_conversation(&db, &updated)?;
    }

    Ok(turn)
}

/// Stores an empty conversation so it can be looked up before the first message.
pub fn start_conversation(state: &Arc<AppState>) -> anyhow::Result<Conversation> {
    let id = uuid::Uuid::new_v4().to_string();
    let conv = new_conversation(state, &id);
    let db = state.db()?;
    queries::save_conversation(&db, &conv)?;
    Ok(conv)
}

pub fn get_conversation(state: &Arc<AppState>, conversation_id: &str) -> anyhow::Result<Option<Conversation>> {
    let db = state.db()?;
    queries::get_conversation(&db, conversation_id)
}

pub fn abandon_conversation(state: &Arc<AppState>, conversation_id: &str) -> anyhow::Result<bool> {
    let db = state.db()?;
    let removed = queries::delete_conversation(&db, conversation_id)?;
    if removed {
        tracing::info!(conversation = conversation_id, "conversation abandoned");
    }
    Ok(removed)
}

/// Drops conversations whose TTL ran out. Returns how many were removed.
pub fn sweep_expired(state: &Arc<AppState>) -> anyhow::Result<usize> {
    let db = state.db()?;
    let count = queries::expire_old_conversations(&db)?;
    if count > 0 {
        tracing::info!(count, "expired abandoned conversations");
    }
    Ok(count)
}

fn ttl(state: &AppState) -> Duration {
    Duration::minutes(state.config.conversation_ttl_minutes)
}

fn new_conversation(state: &AppState, id: &str) -> Conversation {
    let now = Utc::now().naive_utc();
    Conversation {
        id: id.to_string(),
        state: Default::default(),
        last_activity: now,
        expires_at: now + ttl(state),
    }
}

async fn notify_owner(state: &Arc<AppState>, message: &str) {
    if state.config.owner_phone.is_empty() {
        tracing::debug!("owner_phone not configured, skipping notification");
        return;
    }

    if let Err(e) = state
        .messaging
        .send_message(&state.config.owner_phone, message)
        .await
    {
        tracing::error!(error = %e, "failed to notify owner");
    }
}
