use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::booking_state::BookingState;

/// A booking conversation as persisted between turns, keyed by the chat
/// session id or the customer's phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub state: BookingState,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
