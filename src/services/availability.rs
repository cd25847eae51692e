use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::models::{AvailabilitySlot, OpeningHours, Reservation, ReservationStatus, ServiceCatalog};

/// Answers "is this date/time/service bookable?". Lookups are synchronous.
pub trait AvailabilitySource: Send + Sync {
    fn is_available(&self, slot: &AvailabilitySlot) -> anyhow::Result<bool>;

    /// Free start times for `service` on `date`, offered when a request is refused.
    fn available_times(&self, _date: NaiveDate, _service: &str) -> anyhow::Result<Vec<NaiveTime>> {
        Ok(vec![])
    }

    /// Claims the slot. Returns `false` when it is no longer free.
    fn reserve(
        &self,
        slot: &AvailabilitySlot,
        _customer_name: &str,
        _conversation_id: &str,
    ) -> anyhow::Result<bool> {
        self.is_available(slot)
    }
}

/// A fixed list of bookable slots.
#[derive(Debug, Clone, Default)]
pub struct StaticAvailability {
    slots: HashSet<AvailabilitySlot>,
}

#[derive(Deserialize)]
struct StaticAvailabilityFile {
    slots: Vec<AvailabilitySlot>,
}

impl StaticAvailability {
    pub fn new<I: IntoIterator<Item = AvailabilitySlot>>(slots: I) -> Self {
        Self {
            slots: slots
                .into_iter()
                .map(|mut s| {
                    s.service = s.service.trim().to_lowercase();
                    s
                })
                .collect(),
        }
    }

    /// `{"slots":[{"date":"2024-01-01","time":"10:00","service":"haircut"}]}`
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let file: StaticAvailabilityFile =
            serde_json::from_str(s).context("invalid availability slot list")?;
        Ok(Self::new(file.slots))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl AvailabilitySource for StaticAvailability {
    fn is_available(&self, slot: &AvailabilitySlot) -> anyhow::Result<bool> {
        Ok(self.slots.contains(slot))
    }

    fn available_times(&self, date: NaiveDate, service: &str) -> anyhow::Result<Vec<NaiveTime>> {
        let mut times: Vec<NaiveTime> = self
            .slots
            .iter()
            .filter(|s| s.date == date && s.service == service)
            .map(|s| s.time)
            .collect();
        times.sort();
        Ok(times)
    }
}

/// Opening hours plus the reservations already stored in SQLite.
pub struct ScheduleAvailability {
    db: Arc<Mutex<Connection>>,
    hours: OpeningHours,
    catalog: ServiceCatalog,
    now: Option<NaiveDateTime>,
}

impl ScheduleAvailability {
    pub fn new(db: Arc<Mutex<Connection>>, hours: OpeningHours, catalog: ServiceCatalog) -> Self {
        Self {
            db,
            hours,
            catalog,
            now: None,
        }
    }

    /// Pins the clock that decides which slots are already in the past.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    fn conn(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    fn offered(&self, slot: &AvailabilitySlot) -> bool {
        self.catalog.contains(&slot.service)
            && slot.date.and_time(slot.time) > self.now()
            && self.hours.is_open_at(slot.date, slot.time)
    }
}

impl AvailabilitySource for ScheduleAvailability {
    fn is_available(&self, slot: &AvailabilitySlot) -> anyhow::Result<bool> {
        if !self.offered(slot) {
            return Ok(false);
        }
        let db = self.conn()?;
        let taken = queries::is_slot_taken(&db, &slot.service, &slot.date.and_time(slot.time))?;
        Ok(!taken)
    }

    fn available_times(&self, date: NaiveDate, service: &str) -> anyhow::Result<Vec<NaiveTime>> {
        if !self.catalog.contains(service) {
            return Ok(vec![]);
        }
        let now = self.now();
        if date < now.date() {
            return Ok(vec![]);
        }
        let taken = {
            let db = self.conn()?;
            queries::taken_times(&db, service, date)?
        };
        Ok(self
            .hours
            .times_on(date)
            .into_iter()
            .filter(|t| date.and_time(*t) > now && !taken.contains(t))
            .collect())
    }

    fn reserve(
        &self,
        slot: &AvailabilitySlot,
        customer_name: &str,
        conversation_id: &str,
    ) -> anyhow::Result<bool> {
        if !self.offered(slot) {
            return Ok(false);
        }

        // check and insert under one lock so two conversations cannot both win
        let db = self.conn()?;
        let date_time = slot.date.and_time(slot.time);
        if queries::is_slot_taken(&db, &slot.service, &date_time)? {
            return Ok(false);
        }

        let now = Utc::now().naive_utc();
        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            customer_name: customer_name.to_string(),
            service: slot.service.clone(),
            date_time,
            status: ReservationStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };
        queries::create_reservation(&db, &reservation)?;

        tracing::info!(
            reservation = %reservation.id,
            service = %reservation.service,
            date_time = %reservation.date_time,
            "reservation stored"
        );
        Ok(true)
    }
}
