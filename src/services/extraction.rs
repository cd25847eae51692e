//! Rule based field extraction for a single inbound message.
//!
//! Nothing here fails: text that does not parse simply yields no value, and
//! the controller keeps asking for the field.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::availability::capitalize;
use crate::models::{Field, ServiceCatalog};

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid regex"));
static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})[:.h](\d{2})\s*([ap]\.?m\.?)?(?:\s|$|[^\w])").expect("valid regex")
});
static MERIDIEM_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*([ap])\.?m\b\.?").expect("valid regex"));
static AT_HOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bat\s+(\d{1,2})\b(?:[^:\d]|$)").expect("valid regex"));
static BARE_HOUR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{1,2})\s*[.!]?\s*$").expect("valid regex"));
static NAME_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:my name is|my name's|name is|name:|call me)\s*").expect("valid regex")
});
static SELF_INTRO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:i'm|i am|im|this is|it's|it is)\s+").expect("valid regex"));

const AFFIRMATIVE: &[&str] = &[
    "yes", "yeah", "yep", "sure", "ok", "okay", "perfect", "confirm", "confirmed", "correct",
];
const NEGATIVE: &[&str] = &["no", "nope", "not", "another", "different", "cancel"];

/// Words that end a name or rule out a bare reply being one.
const STOP_WORDS: &[&str] = &[
    "and", "at", "for", "on", "i", "i'd", "i'm", "want", "would", "like", "need", "please",
    "book", "booking", "appointment", "today", "tomorrow", "the", "a", "an", "to", "with", "yes",
    "no", "ok", "okay", "hi", "hello", "hey", "thanks", "thank", "you", "sure", "maybe",
];

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// Relative date words; together with the weekdays they end a name.
const DATE_WORDS: &[&str] = &["today", "tonight", "tomorrow", "day", "after", "next", "this"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySignal {
    Affirmative,
    Negative,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub service: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub customer_name: Option<String>,
    pub signal: Option<ReplySignal>,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.customer_name.is_none()
    }
}

/// Pulls whatever booking fields `message` mentions. `awaiting` is the field
/// the previous question asked for; it lets a bare "10" be a time and a bare
/// "Al" be a name.
pub fn extract(
    message: &str,
    catalog: &ServiceCatalog,
    awaiting: Option<Field>,
    today: NaiveDate,
) -> Extracted {
    let lower = message.to_lowercase();

    let service = catalog.find_in(message).map(str::to_string);
    let date = extract_date(&lower, today);
    let time = extract_time(&lower, awaiting == Some(Field::Time));
    let signal = extract_signal(&lower);

    let mut extracted = Extracted {
        service,
        date,
        time,
        customer_name: None,
        signal,
    };

    extracted.customer_name = extract_name(message, catalog, awaiting == Some(Field::CustomerName));

    // A bare reply only counts as a name when nothing else was recognised
    if extracted.customer_name.is_none()
        && awaiting == Some(Field::CustomerName)
        && extracted.is_empty()
        && extracted.signal.is_none()
    {
        extracted.customer_name = bare_name(message, catalog);
    }

    extracted
}

pub fn extract_date(lower: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DATE.captures(lower) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if lower.contains("day after tomorrow") {
        return Some(today + Duration::days(2));
    }
    if has_word(lower, "tomorrow") {
        return Some(today + Duration::days(1));
    }
    if has_word(lower, "today") || has_word(lower, "tonight") {
        return Some(today);
    }

    WEEKDAYS
        .iter()
        .find(|(name, _)| has_word(lower, name))
        .map(|(_, weekday)| next_weekday(today, *weekday))
}

/// The next `weekday` strictly after `today`.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let from = today.weekday().num_days_from_monday() as i64;
    let to = weekday.num_days_from_monday() as i64;
    let mut ahead = (to - from).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

pub fn extract_time(lower: &str, allow_bare_hour: bool) -> Option<NaiveTime> {
    // Dates like 2024-01-01 must not leak digits into the time patterns
    let text = ISO_DATE.replace_all(lower, " ");

    if let Some(caps) = CLOCK_TIME.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let meridiem = caps.get(3).map(|m| m.as_str().starts_with('p'));
        return to_time(hour, minute, meridiem);
    }

    if let Some(caps) = MERIDIEM_TIME.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        let pm = caps[2].eq_ignore_ascii_case("p");
        return to_time(hour, 0, Some(pm));
    }

    if let Some(caps) = AT_HOUR.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        return to_time(hour, 0, None);
    }

    if allow_bare_hour {
        if let Some(caps) = BARE_HOUR.captures(&text) {
            let hour: u32 = caps[1].parse().ok()?;
            return to_time(hour, 0, None);
        }
    }

    None
}

fn to_time(hour: u32, minute: u32, pm: Option<bool>) -> Option<NaiveTime> {
    let hour = match pm {
        None => hour,
        Some(_) if hour == 0 || hour > 12 => return None,
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        Some(_) => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn extract_signal(lower: &str) -> Option<ReplySignal> {
    let words = words(lower);
    if words.iter().any(|w| NEGATIVE.contains(w)) || lower.contains("doesn't work") {
        return Some(ReplySignal::Negative);
    }
    if words.iter().any(|w| AFFIRMATIVE.contains(w)) || lower.contains("sounds good") {
        return Some(ReplySignal::Affirmative);
    }
    None
}

fn extract_name(message: &str, catalog: &ServiceCatalog, awaiting_name: bool) -> Option<String> {
    if let Some(m) = NAME_MARKER.find(message) {
        return name_from(&message[m.end()..], catalog);
    }
    if awaiting_name {
        if let Some(m) = SELF_INTRO.find(message) {
            return name_from(&message[m.end()..], catalog);
        }
    }
    None
}

/// Up to three name-like words. The name ends at the first word that is not
/// one, at a service or date word, and after a word closed by punctuation.
fn name_from(text: &str, catalog: &ServiceCatalog) -> Option<String> {
    let mut parts = vec![];

    for raw in text.split_whitespace() {
        let word = raw.trim_end_matches(|c: char| ",.!?;:".contains(c));
        if !is_name_word(word) || is_booking_word(word, catalog) {
            break;
        }
        parts.push(capitalize_name(word));
        if parts.len() == 3 || word.len() != raw.len() {
            break;
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn bare_name(message: &str, catalog: &ServiceCatalog) -> Option<String> {
    let trimmed = message.trim().trim_end_matches(['.', '!']);
    let count = trimmed.split_whitespace().count();
    if count == 0 || count > 3 {
        return None;
    }
    if !trimmed.split_whitespace().all(is_name_word) {
        return None;
    }
    name_from(trimmed, catalog)
}

/// Words that belong to the booking rather than to a name.
fn is_booking_word(word: &str, catalog: &ServiceCatalog) -> bool {
    let lower = word.to_lowercase();
    DATE_WORDS.contains(&lower.as_str())
        || WEEKDAYS.iter().any(|(day, _)| *day == lower)
        || catalog
            .services()
            .iter()
            .any(|service| service.split_whitespace().any(|w| w == lower))
}

fn is_name_word(w: &str) -> bool {
    !w.is_empty()
        && w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-')
        && w.chars().next().is_some_and(char::is_alphabetic)
        && !STOP_WORDS.contains(&w.to_lowercase().as_str())
}

fn capitalize_name(w: &str) -> String {
    w.split('-').map(capitalize).collect::<Vec<_>>().join("-")
}

fn words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect()
}

fn has_word(lower: &str, word: &str) -> bool {
    words(lower).contains(&word)
}
