use std::env;

use anyhow::Context;

use crate::models::{OpeningHours, ServiceCatalog};
use crate::services::controller::UnavailablePolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub services: ServiceCatalog,
    pub opening_hours: OpeningHours,
    pub require_confirmation: bool,
    pub unavailable_policy: UnavailablePolicy,
    pub conversation_ttl_minutes: i64,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub owner_phone: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "booking.db".to_string(),
            admin_token: "changeme".to_string(),
            services: ServiceCatalog::default(),
            opening_hours: OpeningHours::default(),
            require_confirmation: false,
            unavailable_policy: UnavailablePolicy::default(),
            conversation_ttl_minutes: 30,
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_phone_number: String::new(),
            owner_phone: String::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let services = match env::var("SERVICES") {
            Ok(v) if !v.trim().is_empty() => ServiceCatalog::from_csv(&v),
            _ => defaults.services,
        };
        anyhow::ensure!(!services.is_empty(), "SERVICES must name at least one service");

        let opening_hours = match env::var("OPENING_HOURS") {
            Ok(v) if !v.trim().is_empty() => {
                OpeningHours::from_json(&v).context("OPENING_HOURS is not valid opening hours JSON")?
            }
            _ => defaults.opening_hours,
        };
        let opening_hours = match env::var("SLOT_MINUTES").ok().and_then(|v| v.parse().ok()) {
            Some(minutes) => opening_hours.with_slot_minutes(minutes),
            None => opening_hours,
        };

        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            services,
            opening_hours,
            require_confirmation: env::var("REQUIRE_CONFIRMATION")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.require_confirmation),
            unavailable_policy: env::var("UNAVAILABLE_POLICY")
                .map(|v| UnavailablePolicy::parse(&v))
                .unwrap_or(defaults.unavailable_policy),
            conversation_ttl_minutes: env::var("CONVERSATION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(defaults.conversation_ttl_minutes),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            owner_phone: env::var("OWNER_PHONE").unwrap_or_default(),
        })
    }
}
