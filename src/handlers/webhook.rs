use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::services::conversation;
use crate::state::AppState;

const FALLBACK_REPLY: &str = "Sorry, I'm having trouble right now. Please try again in a moment.";
const EMPTY_TWIML: &str = "<Response></Response>";

/// An incoming SMS webhook. Twilio signs every posted parameter, so the
/// whole form is kept alongside the fields the booking flow reads.
#[derive(Debug, Default)]
pub struct InboundSms {
    pub from: String,
    pub to: String,
    pub body: String,
    pub message_sid: Option<String>,
    params: Vec<(String, String)>,
}

impl From<Vec<(String, String)>> for InboundSms {
    fn from(params: Vec<(String, String)>) -> Self {
        let field = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        let from = field("From").unwrap_or_default();
        let to = field("To").unwrap_or_default();
        let body = field("Body").unwrap_or_default();
        let message_sid = field("MessageSid");

        Self {
            from,
            to,
            body,
            message_sid,
            params,
        }
    }
}

impl InboundSms {
    fn signed_params(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }
}

fn signature_mac(auth_token: &str, url: &str, params: &[(&str, &str)]) -> Option<Hmac<Sha1>> {
    let mut mac = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());

    let mut sorted = params.to_vec();
    sorted.sort_unstable_by_key(|(name, _)| *name);
    for (name, value) in sorted {
        mac.update(name.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// Checks an `X-Twilio-Signature` value: base64 HMAC-SHA1 over the request
/// URL followed by every POST parameter name and value, sorted by name.
pub fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(&str, &str)],
) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    signature_mac(auth_token, url, params)
        .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The public URL Twilio posted to, honouring a reverse proxy's forwarded headers.
fn public_url(headers: &HeaderMap) -> String {
    let proto = header_str(headers, "x-forwarded-proto").unwrap_or("https");
    let host = header_str(headers, "x-forwarded-host")
        .or_else(|| header_str(headers, "host"))
        .unwrap_or("localhost");
    format!("{proto}://{host}/webhook/sms")
}

fn forbidden(reason: &'static str) -> Response {
    tracing::warn!(reason, "rejected SMS webhook");
    (StatusCode::FORBIDDEN, reason).into_response()
}

#[allow(clippy::result_large_err)]
fn authenticate(state: &AppState, headers: &HeaderMap, sms: &InboundSms) -> Result<(), Response> {
    let token = state.config.twilio_auth_token.as_str();
    if token.is_empty() {
        return Ok(());
    }

    match header_str(headers, "x-twilio-signature") {
        None | Some("") => Err(forbidden("Missing signature")),
        Some(signature) => {
            if validate_twilio_signature(token, signature, &public_url(headers), &sms.signed_params()) {
                Ok(())
            } else {
                Err(forbidden("Invalid signature"))
            }
        }
    }
}

fn twiml() -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], EMPTY_TWIML).into_response()
}

// POST /webhook/sms
pub async fn sms_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    let sms = InboundSms::from(params);
    if let Err(rejection) = authenticate(&state, &headers, &sms) {
        return rejection;
    }

    let sender = sms.from.trim();
    let text = sms.body.trim();
    tracing::info!(from = sender, sid = sms.message_sid.as_deref().unwrap_or(""), "incoming SMS");

    if sender.is_empty() || text.is_empty() {
        return twiml();
    }

    // one conversation per customer number
    let reply = match conversation::process_message(&state, sender, text).await {
        Ok(turn) => turn.reply,
        Err(e) => {
            tracing::error!(error = %e, from = sender, "booking turn failed");
            FALLBACK_REPLY.to_string()
        }
    };

    if let Err(e) = state.messaging.send_message(sender, &reply).await {
        tracing::error!(error = %e, to = sender, "failed to deliver reply");
    }

    twiml()
}
