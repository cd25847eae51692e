use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::time_format::hhmm;

/// A bookable (date, time, service) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AvailabilitySlot {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningWindow {
    pub day: String,
    pub start: String,
    pub end: String,
}

/// Weekly opening hours, cut into fixed-length bookable slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningHours {
    pub slots: Vec<OpeningWindow>,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

fn default_slot_minutes() -> u32 {
    60
}

const DAY_ORDER: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

impl Default for OpeningHours {
    /// 9:00, 10:00, 11:00, 15:00, 16:00 and 17:00 every day.
    fn default() -> Self {
        let slots = DAY_ORDER
            .iter()
            .flat_map(|day| {
                [("09:00", "12:00"), ("15:00", "18:00")].map(|(start, end)| OpeningWindow {
                    day: day.to_string(),
                    start: start.to_string(),
                    end: end.to_string(),
                })
            })
            .collect();
        Self {
            slots,
            slot_minutes: default_slot_minutes(),
        }
    }
}

impl OpeningHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: OpeningHours = serde_json::from_str(s)?;
        for slot in &hours.slots {
            parse_weekday(&slot.day)?;
            let start = parse_time(&slot.start)?;
            let end = parse_time(&slot.end)?;
            if end <= start {
                return Err(anyhow::anyhow!(
                    "window ends before it starts: {} {}-{}",
                    slot.day,
                    slot.start,
                    slot.end
                ));
            }
        }
        if hours.slot_minutes == 0 {
            return Err(anyhow::anyhow!("slot_minutes must be positive"));
        }
        Ok(hours)
    }

    pub fn with_slot_minutes(mut self, minutes: u32) -> Self {
        self.slot_minutes = minutes.max(1);
        self
    }

    /// Start times of every slot that fits entirely inside a window on `date`.
    pub fn times_on(&self, date: NaiveDate) -> Vec<NaiveTime> {
        let weekday = weekday_key(date.weekday());
        let step = Duration::minutes(i64::from(self.slot_minutes));

        let mut times: Vec<NaiveTime> = self
            .slots
            .iter()
            .filter(|w| w.day.to_lowercase() == weekday)
            .filter_map(|w| Some((parse_time(&w.start).ok()?, parse_time(&w.end).ok()?)))
            .flat_map(|(start, end)| {
                let mut out = vec![];
                let mut t = start;
                // NaiveTime arithmetic wraps at midnight, so compare as durations
                while t.signed_duration_since(start) + step <= end.signed_duration_since(start) {
                    out.push(t);
                    t += step;
                }
                out
            })
            .collect();

        times.sort();
        times.dedup();
        times
    }

    pub fn is_open_at(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.times_on(date).contains(&time)
    }

    pub fn to_human_readable(&self) -> String {
        if self.slots.is_empty() {
            return String::new();
        }

        let mut sorted_slots = self.slots.clone();
        sorted_slots.sort_by(|a, b| {
            let a_idx = day_index(&a.day);
            let b_idx = day_index(&b.day);
            a_idx.cmp(&b_idx).then_with(|| a.start.cmp(&b.start))
        });

        sorted_slots
            .iter()
            .map(|s| {
                let day = capitalize(&s.day);
                format!("{day}: {}-{}", s.start, s.end)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn day_index(day: &str) -> usize {
    DAY_ORDER
        .iter()
        .position(|d| *d == day.to_lowercase())
        .unwrap_or(7)
}

fn weekday_key(weekday: Weekday) -> &'static str {
    DAY_ORDER[weekday.num_days_from_monday() as usize]
}

pub fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<()> {
    if DAY_ORDER.contains(&s.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("invalid weekday: {s}"))
    }
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}
