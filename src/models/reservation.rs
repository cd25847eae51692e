use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A confirmed booking as stored by the schedule-backed availability source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub conversation_id: String,
    pub customer_name: String,
    pub service: String,
    pub date_time: NaiveDateTime,
    pub status: ReservationStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => ReservationStatus::Cancelled,
            _ => ReservationStatus::Confirmed,
        }
    }
}
