use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use chrono::{Duration, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tower::ServiceExt;

use booking_agent::config::AppConfig;
use booking_agent::db::{self, queries};
use booking_agent::handlers;
use booking_agent::models::{BookingState, Conversation, OpeningHours, ServiceCatalog};
use booking_agent::services::availability::ScheduleAvailability;
use booking_agent::services::controller::BookingController;
use booking_agent::services::conversation;
use booking_agent::services::messaging::MessagingProvider;
use booking_agent::state::AppState;

// ── Mock Providers ──

type Outbox = Arc<Mutex<Vec<(String, String)>>>;

struct MockMessaging {
    sent: Outbox,
}

#[async_trait]
impl MessagingProvider for MockMessaging {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Helpers ──

const CUSTOMER: &str = "+15551110000";
const OWNER: &str = "+15559999999";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        twilio_auth_token: "".to_string(), // empty = skip signature validation
        twilio_phone_number: "+15551234567".to_string(),
        owner_phone: OWNER.to_string(),
        ..AppConfig::default()
    }
}

fn build_state(config: AppConfig) -> (Arc<AppState>, Outbox) {
    let conn = db::init_db(":memory:").unwrap();
    let db = Arc::new(Mutex::new(conn));
    let source = ScheduleAvailability::new(
        Arc::clone(&db),
        OpeningHours::default(),
        ServiceCatalog::default(),
    )
    .with_now(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap());
    let controller = BookingController::new(Arc::new(source), ServiceCatalog::default())
        .with_policy(config.unavailable_policy)
        .with_confirmation(config.require_confirmation)
        .with_today(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

    let sent: Outbox = Arc::new(Mutex::new(vec![]));
    let state = Arc::new(AppState {
        db,
        config,
        controller,
        messaging: Box::new(MockMessaging {
            sent: Arc::clone(&sent),
        }),
    });
    (state, sent)
}

fn test_state() -> (Arc<AppState>, Outbox) {
    build_state(test_config())
}

async fn read_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn create_conversation(state: &Arc<AppState>) -> String {
    let res = handlers::router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    read_json(res).await["id"].as_str().unwrap().to_string()
}

async fn send(state: &Arc<AppState>, id: &str, message: &str) -> (StatusCode, serde_json::Value) {
    let res = handlers::router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/conversations/{id}/messages"))
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::json!({ "message": message }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = res.status();
    (status, read_json(res).await)
}

async fn get_status(state: &Arc<AppState>, method: &str, uri: &str) -> StatusCode {
    handlers::router(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

fn sms_params(body: &str) -> Vec<(&'static str, String)> {
    vec![
        ("From", CUSTOMER.to_string()),
        ("To", "+15551234567".to_string()),
        ("Body", body.to_string()),
        ("MessageSid", "SM_test".to_string()),
        ("SmsSid", "SM_test".to_string()),
        ("AccountSid", "AC_test".to_string()),
        ("NumMedia", "0".to_string()),
        ("FromCountry", "US".to_string()),
    ]
}

fn encode_form(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| {
            let encoded = v
                .replace('%', "%25")
                .replace('&', "%26")
                .replace(',', "%2C")
                .replace('\'', "%27")
                .replace('+', "%2B")
                .replace(' ', "+");
            format!("{k}={encoded}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn sms_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/sms")
        .header("Host", "example.com")
        .header("Content-Type", "application/x-www-form-urlencoded");
    if let Some(sig) = signature {
        builder = builder.header("X-Twilio-Signature", sig);
    }
    builder
        .body(Body::from(encode_form(&sms_params(body))))
        .unwrap()
}

fn twilio_sign(token: &str, url: &str, params: &[(&str, String)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let mut data = url.to_string();
    for (k, v) in &sorted {
        data.push_str(k);
        data.push_str(v);
    }
    let mut mac = Hmac::<Sha1>::new_from_slice(token.as_bytes()).unwrap();
    mac.update(data.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

async fn admin_get(state: &Arc<AppState>, uri: &str, token: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    handlers::router(state.clone())
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn admin_cancel(state: &Arc<AppState>, id: &str) -> axum::response::Response {
    handlers::router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/admin/reservations/{id}/cancel"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let res = handlers::router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

// ── Conversation API Tests ──

#[tokio::test]
async fn test_conversation_collects_fields_until_confirmed() {
    let (state, sent) = test_state();
    let id = create_conversation(&state).await;

    let (status, json) = send(&state, &id, "I'd like a haircut").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "collecting");
    assert_eq!(json["awaiting"], "date");
    assert_eq!(json["booking"]["service"], "haircut");

    let (_, json) = send(&state, &id, "tomorrow").await;
    assert_eq!(json["awaiting"], "time");
    assert_eq!(json["booking"]["date"], "2024-01-02");

    let (_, json) = send(&state, &id, "3pm").await;
    assert_eq!(json["awaiting"], "customer_name");
    assert_eq!(json["booking"]["time"], "15:00");

    // the stored conversation follows the turns
    let res = handlers::router(state.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stored = read_json(res).await;
    assert_eq!(stored["status"], "collecting");
    assert_eq!(stored["messages"].as_array().unwrap().len(), 6);

    let (_, json) = send(&state, &id, "Alice").await;
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["awaiting"], serde_json::Value::Null);
    assert_eq!(
        json["reply"],
        "Excellent! Your haircut appointment for 2024-01-02 at 15:00 is confirmed, Alice. See you soon!"
    );

    // finished conversations are discarded
    assert_eq!(
        get_status(&state, "GET", &format!("/api/conversations/{id}")).await,
        StatusCode::NOT_FOUND
    );

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, OWNER);
    assert!(sent[0].1.contains("haircut"));
    assert!(sent[0].1.contains("Alice"));
}

#[tokio::test]
async fn test_message_to_unknown_id_starts_conversation() {
    let (state, _) = test_state();
    let (status, json) = send(&state, "fresh-id", "hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "collecting");
    assert_eq!(json["awaiting"], "service");

    assert_eq!(
        get_status(&state, "GET", "/api/conversations/fresh-id").await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_taken_slot_reprompts_with_alternatives() {
    let (state, _) = test_state();

    let first = create_conversation(&state).await;
    let (_, json) = send(&state, &first, "My name is Al, I'd like a haircut tomorrow at 3pm").await;
    assert_eq!(json["status"], "confirmed");

    let second = create_conversation(&state).await;
    let (status, json) = send(&state, &second, "My name is Bo, I'd like a haircut tomorrow at 3pm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "collecting");
    assert_eq!(json["awaiting"], "time");
    assert_eq!(json["booking"]["time"], serde_json::Value::Null);
    let reply = json["reply"].as_str().unwrap();
    assert!(reply.contains("not available"));
    assert!(reply.contains("16:00"));
}

#[tokio::test]
async fn test_past_date_is_not_booked() {
    let (state, sent) = test_state();
    let id = create_conversation(&state).await;

    let (_, json) = send(&state, &id, "my name is Al, haircut on 2023-12-18 at 10:00").await;
    assert_eq!(json["status"], "collecting");
    assert_eq!(json["awaiting"], "date");
    assert_eq!(json["booking"]["customer_name"], "Al");
    assert_eq!(json["booking"]["date"], serde_json::Value::Null);

    let res = admin_get(&state, "/api/admin/reservations", Some("test-token")).await;
    assert!(read_json(res).await.as_array().unwrap().is_empty());
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_name_stops_before_rest_of_sentence() {
    let (state, _) = test_state();
    let id = create_conversation(&state).await;

    let (_, json) = send(&state, &id, "my name is Al, haircut tomorrow at 10:00").await;
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["booking"]["customer_name"], "Al");
    assert!(json["reply"].as_str().unwrap().ends_with("is confirmed, Al. See you soon!"));
}

#[tokio::test]
async fn test_reject_policy_ends_conversation() {
    let config = AppConfig {
        unavailable_policy: booking_agent::services::controller::UnavailablePolicy::Reject,
        ..test_config()
    };
    let (state, _) = build_state(config);

    let first = create_conversation(&state).await;
    send(&state, &first, "My name is Al, I'd like a haircut tomorrow at 3pm").await;

    let second = create_conversation(&state).await;
    let (_, json) = send(&state, &second, "My name is Bo, I'd like a haircut tomorrow at 3pm").await;
    assert_eq!(json["status"], "rejected");
    assert_eq!(
        get_status(&state, "GET", &format!("/api/conversations/{second}")).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_confirmation_step_waits_for_yes() {
    let config = AppConfig {
        require_confirmation: true,
        ..test_config()
    };
    let (state, _) = build_state(config);
    let id = create_conversation(&state).await;

    let (_, json) = send(&state, &id, "My name is Al, I'd like a haircut tomorrow at 3pm").await;
    assert_eq!(json["status"], "validating");
    assert!(json["reply"].as_str().unwrap().ends_with("Do you confirm the booking?"));

    let (_, json) = send(&state, &id, "yes").await;
    assert_eq!(json["status"], "confirmed");
}

#[tokio::test]
async fn test_empty_message_is_bad_request() {
    let (state, _) = test_state();
    let id = create_conversation(&state).await;
    let (status, json) = send(&state, &id, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_unknown_conversation_is_not_found() {
    let (state, _) = test_state();
    assert_eq!(
        get_status(&state, "GET", "/api/conversations/nope").await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        get_status(&state, "DELETE", "/api/conversations/nope").await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_abandon_conversation() {
    let (state, _) = test_state();
    let id = create_conversation(&state).await;
    send(&state, &id, "haircut please").await;

    let uri = format!("/api/conversations/{id}");
    assert_eq!(get_status(&state, "DELETE", &uri).await, StatusCode::NO_CONTENT);
    assert_eq!(get_status(&state, "GET", &uri).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_conversation_is_swept() {
    let (state, _) = test_state();
    let past = Utc::now().naive_utc() - Duration::minutes(5);
    {
        let db = state.db().unwrap();
        queries::save_conversation(
            &db,
            &Conversation {
                id: "stale".to_string(),
                state: BookingState::new(),
                last_activity: past - Duration::minutes(30),
                expires_at: past,
            },
        )
        .unwrap();
    }

    assert_eq!(
        get_status(&state, "GET", "/api/conversations/stale").await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(conversation::sweep_expired(&state).unwrap(), 1);
    assert_eq!(conversation::sweep_expired(&state).unwrap(), 0);
}

// ── Webhook Tests ──

#[tokio::test]
async fn test_webhook_replies_to_sender() {
    let (state, sent) = test_state();

    let res = handlers::router(state.clone())
        .oneshot(sms_request("I'd like a haircut", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/xml"
    );
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<Response></Response>");

    {
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, CUSTOMER);
        assert!(sent[0].1.contains("When do you need it"));
    }

    // the sender's number keys the conversation
    let conv = conversation::get_conversation(&state, CUSTOMER)
        .unwrap()
        .unwrap();
    assert_eq!(conv.state.booking.service.as_deref(), Some("haircut"));
}

#[tokio::test]
async fn test_webhook_booking_notifies_owner() {
    let (state, sent) = test_state();

    let res = handlers::router(state.clone())
        .oneshot(sms_request("My name is Al, I'd like a haircut tomorrow at 3pm", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, OWNER);
    assert_eq!(sent[1].0, CUSTOMER);
    assert!(sent[1].1.starts_with("Excellent!"));
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let config = AppConfig {
        twilio_auth_token: "secret".to_string(),
        ..test_config()
    };
    let (state, sent) = build_state(config);

    let res = handlers::router(state.clone())
        .oneshot(sms_request("haircut", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = handlers::router(state)
        .oneshot(sms_request("haircut", Some("bogus")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_accepts_valid_signature() {
    let config = AppConfig {
        twilio_auth_token: "secret".to_string(),
        ..test_config()
    };
    let (state, sent) = build_state(config);

    let signature = twilio_sign("secret", "https://example.com/webhook/sms", &sms_params("haircut"));
    let res = handlers::router(state)
        .oneshot(sms_request("haircut", Some(&signature)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

// ── Admin API Tests ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let (state, _) = test_state();
    let res = admin_get(&state, "/api/admin/reservations", None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = admin_get(&state, "/api/admin/reservations", Some("wrong-token")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_lists_and_cancels_reservations() {
    let (state, _) = test_state();
    let id = create_conversation(&state).await;
    send(&state, &id, "My name is Al, I'd like a haircut tomorrow at 3pm").await;

    let res = admin_get(&state, "/api/admin/reservations", Some("test-token")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = read_json(res).await;
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["customer_name"], "Al");
    assert_eq!(list[0]["service"], "haircut");
    assert_eq!(list[0]["date_time"], "2024-01-02 15:00");
    assert_eq!(list[0]["status"], "confirmed");
    assert_eq!(list[0]["conversation_id"], id.as_str());
    let reservation_id = list[0]["id"].as_str().unwrap().to_string();

    let res = admin_cancel(&state, &reservation_id).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["status"], "cancelled");

    let res = admin_get(
        &state,
        "/api/admin/reservations?status=confirmed",
        Some("test-token"),
    )
    .await;
    assert!(read_json(res).await.as_array().unwrap().is_empty());

    // a cancelled slot can be booked again
    let again = create_conversation(&state).await;
    let (_, json) = send(&state, &again, "My name is Bo, I'd like a haircut tomorrow at 3pm").await;
    assert_eq!(json["status"], "confirmed");
}

#[tokio::test]
async fn test_admin_cancel_unknown_reservation() {
    let (state, _) = test_state();
    let res = admin_cancel(&state, "missing").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
