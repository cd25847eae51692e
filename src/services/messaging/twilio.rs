use anyhow::Context;
use async_trait::async_trait;

use super::MessagingProvider;
use crate::config::AppConfig;

/// Twilio rejects bodies longer than this.
const MAX_BODY_CHARS: usize = 1600;

pub struct TwilioSmsProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsProvider {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }

    /// `None` unless account SID, auth token and sender number are all set.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if config.twilio_account_sid.is_empty()
            || config.twilio_auth_token.is_empty()
            || config.twilio_phone_number.is_empty()
        {
            return None;
        }
        Some(Self::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_phone_number.clone(),
        ))
    }
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl MessagingProvider for TwilioSmsProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let body = truncate_body(body);

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .context("failed to send Twilio SMS")?
            .error_for_status()
            .context("Twilio API returned error")?;

        tracing::debug!(to, chars = body.chars().count(), "sms sent");
        Ok(())
    }
}
