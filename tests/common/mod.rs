// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use calendar_assistant::config::Config;
use calendar_assistant::db::{MemoryUserStore, UserStore};
use calendar_assistant::error::AppError;
use calendar_assistant::middleware::auth::{create_jwt, AuthSession};
use calendar_assistant::models::{
    AuthProvider, BillingProvider, CalendarEvent, OAuthToken, Subscription, Tier, User,
};
use calendar_assistant::routes::create_router;
use calendar_assistant::services::calendar::{parse_rfc3339, Calendar, CalendarFactory};
use calendar_assistant::services::gemini::{GenerateRequest, LlmClient};
use calendar_assistant::services::kms::encrypt_token;
use calendar_assistant::services::oauth::OAuthEndpoints;
use calendar_assistant::services::{
    KmsService, OAuthProvider, PayPalClient, PlanCatalog, SessionCache, StripeClient,
};
use calendar_assistant::AppState;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Firestore store pointed at the emulator.
#[allow(dead_code)]
pub async fn test_db() -> calendar_assistant::db::FirestoreDb {
    calendar_assistant::db::FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Doubles ─────────────────────────────────────────────────────────────────

/// User store that counts `get_user` calls.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryUserStore,
    gets: AtomicUsize,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl UserStore for CountingStore {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers interleave
        tokio::task::yield_now().await;
        self.inner.get_user(email).await
    }

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        self.inner.find_by_provider_id(provider, provider_id).await
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<User>, AppError> {
        self.inner.find_by_subscription_id(subscription_id).await
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        self.inner.create_user(user).await
    }

    async fn update_oauth_link(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
        oauth_token_encrypted: &str,
    ) -> Result<(), AppError> {
        self.inner
            .update_oauth_link(email, provider, provider_id, oauth_token_encrypted)
            .await
    }

    async fn update_subscription(
        &self,
        email: &str,
        subscription: &Subscription,
    ) -> Result<(), AppError> {
        self.inner.update_subscription(email, subscription).await
    }
}

/// In-memory calendar with the same window semantics as the vendor adapters.
#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    next_id: AtomicUsize,
}

#[async_trait]
impl Calendar for FakeCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> Result<(), AppError> {
        let mut event = event.clone();
        if event.id.is_empty() {
            event.id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn remove_event(&self, event: &CalendarEvent) -> Result<(), AppError> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| {
            if event.id.is_empty() {
                !(e.title == event.title && e.start_time == event.start_time)
            } else {
                e.id != event.id
            }
        });
        if events.len() == before {
            return Err(AppError::Upstream("event not found".to_string()));
        }
        Ok(())
    }

    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .filter(|e| {
                let (Ok(s), Ok(t)) = (
                    parse_rfc3339(&e.start_time, "start"),
                    parse_rfc3339(&e.end_time, "end"),
                ) else {
                    return false;
                };
                s >= start && t <= end
            })
            .cloned()
            .collect())
    }
}

/// Factory that counts builds and hands out fresh `FakeCalendar`s.
#[derive(Default)]
pub struct FakeCalendarFactory {
    builds: AtomicUsize,
}

#[allow(dead_code)]
impl FakeCalendarFactory {
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl CalendarFactory for FakeCalendarFactory {
    fn build(
        &self,
        _provider: AuthProvider,
        _token: OAuthToken,
    ) -> Result<Arc<dyn Calendar>, AppError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeCalendar::default()))
    }
}

/// LLM double that always answers with the same parts.
pub struct ScriptedLlm {
    pub parts: Vec<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, _request: &GenerateRequest) -> Result<Vec<String>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.parts.clone())
    }
}

// ─── App construction ────────────────────────────────────────────────────────

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub users: Arc<CountingStore>,
    pub factory: Arc<FakeCalendarFactory>,
    pub llm: Arc<ScriptedLlm>,
}

/// Create a test app with offline doubles.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default(), PlanCatalog::default())
}

/// Create a test app with a custom config (e.g. vendor bases on a mock server).
#[allow(dead_code)]
pub fn create_test_app_with(config: Config, plans: PlanCatalog) -> TestApp {
    build_test_app(config, plans, None)
}

/// Create a test app whose Google sign-in talks to mock endpoints.
#[allow(dead_code)]
pub fn create_test_app_with_google(endpoints: OAuthEndpoints) -> TestApp {
    build_test_app(Config::test_default(), PlanCatalog::default(), Some(endpoints))
}

fn build_test_app(
    config: Config,
    plans: PlanCatalog,
    google_endpoints: Option<OAuthEndpoints>,
) -> TestApp {
    let http = reqwest::Client::new();
    let kms = KmsService::new_mock();
    let users = Arc::new(CountingStore::default());
    let factory = Arc::new(FakeCalendarFactory::default());
    let llm = Arc::new(ScriptedLlm {
        parts: vec!["{\"understood\":true,".to_string(), "\"action\":\"info\"}".to_string()],
        calls: AtomicUsize::new(0),
    });

    let sessions = Arc::new(SessionCache::new(
        users.clone(),
        kms.clone(),
        factory.clone(),
        llm.clone(),
        std::time::Duration::from_secs(config.chat_timeout_secs),
    ));

    let stripe = config
        .stripe_secret_key
        .as_deref()
        .map(|key| StripeClient::new(http.clone(), &config.stripe_api_base, key));
    let paypal = match (&config.paypal_client_id, &config.paypal_client_secret) {
        (Some(id), Some(secret)) => Some(Arc::new(PayPalClient::new(
            http.clone(),
            &config.paypal_api_base,
            id,
            secret,
        ))),
        _ => None,
    };

    let mut google = OAuthProvider::google(&config, http.clone());
    if let Some(endpoints) = google_endpoints {
        google = google.with_endpoints(endpoints);
    }

    let state = Arc::new(AppState {
        google_oauth: Arc::new(google),
        microsoft_oauth: OAuthProvider::microsoft(&config, http.clone()).map(Arc::new),
        config,
        users: users.clone(),
        kms,
        http,
        calendars: factory.clone(),
        sessions,
        stripe,
        paypal,
        plans,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        users,
        factory,
        llm,
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[allow(dead_code)]
pub fn test_token() -> OAuthToken {
    OAuthToken {
        access_token: "ya29.test".to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: Some("1//refresh".to_string()),
        expiry: Some(Utc::now() + chrono::Duration::hours(1)),
    }
}

/// Store an OAuth user with an encrypted credential and optional tier.
#[allow(dead_code)]
pub async fn seed_user(app: &TestApp, email: &str, provider: AuthProvider, tier: Option<Tier>) {
    let blob = encrypt_token(&app.state.kms, &test_token(), email)
        .await
        .unwrap();
    let mut user = User::with_oauth(email, provider, "provider-123", blob);
    user.subscription = tier.map(|t| Subscription {
        provider: BillingProvider::Paypal,
        status: "ACTIVE".to_string(),
        plan: Some(t),
        external_id: format!("I-{}", email),
    });
    app.users.create_user(&user).await.unwrap();
}

/// Issue a session for an email.
#[allow(dead_code)]
pub fn session_for(app: &TestApp, email: &str) -> AuthSession {
    let (token, expires_at) = create_jwt(email, &app.state.config.jwt_signing_key).unwrap();
    AuthSession {
        email: email.to_string(),
        token,
        expires_at,
    }
}

/// Build a JSON request, optionally with a Bearer session token.
#[allow(dead_code)]
pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Build a bodiless GET request, optionally with a Bearer session token.
#[allow(dead_code)]
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
