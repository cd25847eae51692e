use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::availability::AvailabilitySlot;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Collecting,
    Validating,
    Confirmed,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Collecting => "collecting",
            BookingStatus::Validating => "validating",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "validating" => BookingStatus::Validating,
            "confirmed" => BookingStatus::Confirmed,
            "rejected" => BookingStatus::Rejected,
            _ => BookingStatus::Collecting,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Rejected)
    }
}

/// A required booking field. Declaration order is the order in which
/// missing fields are asked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Service,
    Date,
    Time,
    CustomerName,
}

impl Field {
    pub const PRIORITY: [Field; 4] = [Field::Service, Field::Date, Field::Time, Field::CustomerName];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Service => "service",
            Field::Date => "date",
            Field::Time => "time",
            Field::CustomerName => "customer_name",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingData {
    pub service: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(default, with = "super::time_format::hhmm_option")]
    pub time: Option<NaiveTime>,
    pub customer_name: Option<String>,
}

impl BookingData {
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Service => self.service.as_deref().is_some_and(|s| !s.trim().is_empty()),
            Field::Date => self.date.is_some(),
            Field::Time => self.time.is_some(),
            Field::CustomerName => self
                .customer_name
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty()),
        }
    }

    pub fn first_missing(&self) -> Option<Field> {
        Field::PRIORITY.into_iter().find(|f| !self.has(*f))
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    pub fn clear(&mut self, field: Field) {
        match field {
            Field::Service => self.service = None,
            Field::Date => self.date = None,
            Field::Time => self.time = None,
            Field::CustomerName => self.customer_name = None,
        }
    }

    /// The requested (date, time, service) triple, once all three are known.
    pub fn slot(&self) -> Option<AvailabilitySlot> {
        match (&self.service, self.date, self.time) {
            (Some(service), Some(date), Some(time)) if self.has(Field::Service) => {
                Some(AvailabilitySlot {
                    date,
                    time,
                    service: service.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn date_time(&self) -> Option<NaiveDateTime> {
        Some(self.date?.and_time(self.time?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingState {
    pub booking: BookingData,
    pub messages: Vec<ConversationMessage>,
    pub status: BookingStatus,
    /// The field the last outbound message asked for.
    pub awaiting: Option<Field>,
}

impl BookingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ConversationMessage {
            role: "user".to_string(),
            content: content.to_string(),
        });
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.messages.push(ConversationMessage {
            role: "assistant".to_string(),
            content: content.to_string(),
        });
    }
}
