pub mod twilio;

use async_trait::async_trait;

use crate::config::AppConfig;

/// Outbound half of the message exchange. Inbound messages arrive through
/// the HTTP handlers.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Used when no SMS account is configured: outbound messages are only logged.
pub struct LogOnlyProvider;

#[async_trait]
impl MessagingProvider for LogOnlyProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, body, "outbound message (not delivered, no SMS provider configured)");
        Ok(())
    }
}

pub fn from_config(config: &AppConfig) -> Box<dyn MessagingProvider> {
    match twilio::TwilioSmsProvider::from_config(config) {
        Some(provider) => {
            tracing::info!(from = %config.twilio_phone_number, "using Twilio SMS provider");
            Box::new(provider)
        }
        None => {
            tracing::warn!("Twilio credentials not set, outbound messages will only be logged");
            Box::new(LogOnlyProvider)
        }
    }
}
