//! Fixtures shared by the router-level test suites

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use time::{macros::datetime, OffsetDateTime};
use tower::ServiceExt;

use eventhub_shared::{MemoryStore, NewUser, Role, User, UserStore};

use crate::{
    auth::password::fast_params,
    clock::ManualClock,
    config::{Config, TransportKind},
    email::{MailError, Mailer},
    routes::create_router,
    state::AppState,
};

pub const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);
pub const PASSWORD: &str = "teatPassword123";

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Keeps every message instead of sending it
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// The code inside `<h1>` of the newest message to `to`
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let mail = sent.iter().rev().find(|m| m.to == to)?;
        let start = mail.html.find("<h1>")? + "<h1>".len();
        let end = mail.html[start..].find("</h1>")? + start;
        Some(mail.html[start..end].to_string())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}

pub fn test_config(transport: TransportKind) -> Config {
    let mut config = Config::from_lookup(|key| {
        let value = match key {
            "DATABASE_URL" => "postgres://localhost/eventhub_test",
            "ACCESS_TOKEN_SECRET" => "test-access-secret",
            "REFRESH_TOKEN_SECRET" => "test-refresh-secret",
            "COOKIE_SECRET" => "test-cookie-secret",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap();
    config.session_transport = transport;
    config.password_hash = fast_params();
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn error_code(&self) -> &str {
        self.body["errorCode"].as_str().unwrap_or_default()
    }

    pub fn cookies(&self) -> String {
        cookie_header(&self.headers)
    }
}

/// `name=value` pairs of every Set-Cookie, joined for a Cookie header
pub fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub async fn send_to(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_transport(TransportKind::Cookie)
    }

    pub fn with_transport(transport: TransportKind) -> Self {
        Self::with_config(test_config(transport))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::with_clock(
            config,
            store.clone(),
            mailer.clone(),
            clock.clone(),
        )
        .unwrap();
        Self {
            router: create_router(state.clone()),
            state,
            store,
            clock,
            mailer,
        }
    }

    /// Insert a user directly, bypassing signup
    pub async fn seed_user(&self, email: &str, role: Role, verified: bool) -> User {
        let hash = self.state.hasher.hash(PASSWORD).unwrap();
        let user = self
            .store
            .insert_user(NewUser::new("Awais", email, hash, role, NOW).unwrap())
            .await
            .unwrap();
        if verified {
            self.store.mark_email_verified(user.id).await.unwrap();
        }
        self.store.find_user_by_id(user.id).await.unwrap().unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send_to(&self.router, request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send(json_request("POST", uri, body, None)).await
    }

    /// Log in with [`PASSWORD`] and return the session cookies
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post(
                "/api/v1/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.cookies()
    }
}

pub fn json_request(method: &str, uri: &str, body: Value, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}
