use std::sync::Arc;

use chrono::NaiveDate;

use crate::errors::BookingError;
use crate::models::{AvailabilitySlot, BookingData, BookingState, BookingStatus, Field, ServiceCatalog};
use crate::services::availability::AvailabilitySource;
use crate::services::extraction::{self, Extracted, ReplySignal};
use crate::services::scheduling::{self, format_time, format_times, SchedulingError};

/// What to do when the requested slot turns out to be taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnavailablePolicy {
    /// Drop the time (or the whole day when nothing is left) and ask again.
    #[default]
    Reprompt,
    /// End the conversation with a rejection.
    Reject,
}

impl UnavailablePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailablePolicy::Reprompt => "reprompt",
            UnavailablePolicy::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "reject" => UnavailablePolicy::Reject,
            _ => UnavailablePolicy::Reprompt,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub state: BookingState,
    pub reply: String,
}

/// Drives one booking conversation a turn at a time: collect the missing
/// fields, validate the slot, confirm or refuse.
pub struct BookingController {
    source: Arc<dyn AvailabilitySource>,
    catalog: ServiceCatalog,
    policy: UnavailablePolicy,
    require_confirmation: bool,
    today: Option<NaiveDate>,
}

impl BookingController {
    pub fn new(source: Arc<dyn AvailabilitySource>, catalog: ServiceCatalog) -> Self {
        Self {
            source,
            catalog,
            policy: UnavailablePolicy::default(),
            require_confirmation: false,
            today: None,
        }
    }

    pub fn with_policy(mut self, policy: UnavailablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ask "Do you confirm the booking?" before reserving.
    pub fn with_confirmation(mut self, require: bool) -> Self {
        self.require_confirmation = require;
        self
    }

    /// Pins the date that "today" and "tomorrow" resolve against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn handle_turn(&self, state: &BookingState, inbound: &str) -> Result<Turn, BookingError> {
        self.handle_turn_in("", state, inbound)
    }

    /// Advances `state` by one inbound message. `state` is left untouched, so
    /// on error the caller still holds the previous turn.
    pub fn handle_turn_in(
        &self,
        conversation_id: &str,
        state: &BookingState,
        inbound: &str,
    ) -> Result<Turn, BookingError> {
        let mut next = state.clone();
        next.push_user(inbound);

        if next.status.is_terminal() {
            let reply = closing_message(&next);
            next.push_assistant(&reply);
            return Ok(Turn { state: next, reply });
        }

        let extracted = extraction::extract(inbound, &self.catalog, next.awaiting, self.today());
        let changed = merge(&mut next.booking, &extracted);

        let reply = self.advance(conversation_id, &mut next, changed, extracted.signal)?;
        next.push_assistant(&reply);

        tracing::debug!(
            conversation = conversation_id,
            status = next.status.as_str(),
            awaiting = next.awaiting.map(|f| f.as_str()),
            changed,
            "turn handled"
        );

        Ok(Turn { state: next, reply })
    }

    fn advance(
        &self,
        conversation_id: &str,
        state: &mut BookingState,
        changed: bool,
        signal: Option<ReplySignal>,
    ) -> Result<String, BookingError> {
        let slot = match state.booking.slot() {
            Some(slot) if state.booking.is_complete() => slot,
            _ => return Ok(self.ask_for_missing(state)),
        };

        let proposed = state.status == BookingStatus::Validating;
        state.status = BookingStatus::Validating;
        state.awaiting = None;

        if self.require_confirmation && proposed && !changed {
            return match signal {
                Some(ReplySignal::Affirmative) => self.finalize(conversation_id, state, &slot),
                Some(ReplySignal::Negative) => {
                    state.booking.clear(Field::Time);
                    state.status = BookingStatus::Collecting;
                    state.awaiting = Some(Field::Time);
                    Ok("No problem. Which time would you prefer instead?".to_string())
                }
                None => Ok(confirmation_question(&state.booking)),
            };
        }

        match scheduling::validate_slot(self.source.as_ref(), &slot) {
            Ok(()) if self.require_confirmation => Ok(confirmation_question(&state.booking)),
            Ok(()) => self.finalize(conversation_id, state, &slot),
            Err(SchedulingError::Lookup(e)) => Err(BookingError::Availability(e)),
            Err(refusal) => Ok(self.refuse(state, refusal)),
        }
    }

    fn ask_for_missing(&self, state: &mut BookingState) -> String {
        let Some(field) = state.booking.first_missing() else {
            // slot() and is_complete() disagree only on blank strings, which
            // first_missing already reports
            return "Could you give me more details about your booking?".to_string();
        };

        state.status = BookingStatus::Collecting;
        state.awaiting = Some(field);

        let booking = &state.booking;
        match field {
            Field::Service => format!(
                "Hi! What service do you need? We have {}.",
                self.catalog.to_human_readable()
            ),
            Field::Date => format!(
                "Perfect, a {}. When do you need it? (today, tomorrow, day after tomorrow, or a date like 2024-01-31)",
                booking.service.as_deref().unwrap_or("booking")
            ),
            Field::Time => self.ask_for_time(booking),
            Field::CustomerName => "Great. What name should I put the booking under?".to_string(),
        }
    }

    fn ask_for_time(&self, booking: &BookingData) -> String {
        let (Some(date), Some(service)) = (booking.date, booking.service.as_deref()) else {
            return "What time would you like?".to_string();
        };
        match self.source.available_times(date, service) {
            Ok(times) if !times.is_empty() => format!(
                "We have these available times for {}: {}. Which one do you prefer?",
                date.format("%Y-%m-%d"),
                format_times(&times)
            ),
            Ok(_) => format!("What time would you like on {}?", date.format("%Y-%m-%d")),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list available times");
                format!("What time would you like on {}?", date.format("%Y-%m-%d"))
            }
        }
    }

    fn finalize(
        &self,
        conversation_id: &str,
        state: &mut BookingState,
        slot: &AvailabilitySlot,
    ) -> Result<String, BookingError> {
        let name = state.booking.customer_name.clone().unwrap_or_default();

        let reserved = self
            .source
            .reserve(slot, &name, conversation_id)
            .map_err(BookingError::Availability)?;
        if !reserved {
            tracing::info!(conversation = conversation_id, "slot taken before it could be reserved");
            return Ok(self.refuse(state, scheduling::unavailable(self.source.as_ref(), slot)));
        }

        state.status = BookingStatus::Confirmed;
        state.awaiting = None;

        tracing::info!(
            conversation = conversation_id,
            service = %slot.service,
            date = %slot.date,
            time = %format_time(slot.time),
            "booking confirmed"
        );

        Ok(format!(
            "Excellent! Your {} appointment for {} at {} is confirmed, {}. See you soon!",
            slot.service,
            slot.date.format("%Y-%m-%d"),
            format_time(slot.time),
            name
        ))
    }

    fn refuse(&self, state: &mut BookingState, refusal: SchedulingError) -> String {
        let explanation = refusal.to_string();
        let day_is_full = matches!(
            &refusal,
            SchedulingError::Unavailable { alternatives, .. } if alternatives.is_empty()
        );

        tracing::info!(policy = self.policy.as_str(), day_is_full, "requested slot unavailable");

        match self.policy {
            UnavailablePolicy::Reject => {
                state.status = BookingStatus::Rejected;
                state.awaiting = None;
                format!("{explanation} Feel free to start a new booking for another time.")
            }
            UnavailablePolicy::Reprompt if day_is_full => {
                state.booking.clear(Field::Date);
                state.booking.clear(Field::Time);
                state.status = BookingStatus::Collecting;
                state.awaiting = Some(Field::Date);
                format!("{explanation} Which other day works for you?")
            }
            UnavailablePolicy::Reprompt => {
                state.booking.clear(Field::Time);
                state.status = BookingStatus::Collecting;
                state.awaiting = Some(Field::Time);
                format!("{explanation} Which one do you prefer?")
            }
        }
    }
}

/// Copies newly mentioned values into `booking`. Returns whether anything changed.
fn merge(booking: &mut BookingData, extracted: &Extracted) -> bool {
    let mut changed = false;

    if let Some(service) = &extracted.service {
        if booking.service.as_ref() != Some(service) {
            booking.service = Some(service.clone());
            changed = true;
        }
    }
    if extracted.date.is_some() && booking.date != extracted.date {
        booking.date = extracted.date;
        changed = true;
    }
    if extracted.time.is_some() && booking.time != extracted.time {
        booking.time = extracted.time;
        changed = true;
    }
    if let Some(name) = &extracted.customer_name {
        if booking.customer_name.as_ref() != Some(name) {
            booking.customer_name = Some(name.clone());
            changed = true;
        }
    }

    changed
}

fn confirmation_question(booking: &BookingData) -> String {
    format!(
        "Perfect, I'm confirming your appointment:\n• Service: {}\n• Date: {}\n• Time: {}\n• Name: {}\n\nDo you confirm the booking?",
        booking.service.as_deref().unwrap_or_default(),
        booking
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        booking.time.map(format_time).unwrap_or_default(),
        booking.customer_name.as_deref().unwrap_or_default(),
    )
}

fn closing_message(state: &BookingState) -> String {
    match state.status {
        BookingStatus::Confirmed => {
            let booking = &state.booking;
            format!(
                "Your {} appointment for {} at {} is already confirmed. See you soon!",
                booking.service.as_deref().unwrap_or("booking"),
                booking
                    .date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                booking.time.map(format_time).unwrap_or_default(),
            )
        }
        _ => "This booking request is closed. Start a new conversation to pick another time."
            .to_string(),
    }
}
