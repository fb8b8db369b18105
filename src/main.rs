// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar Assistant API Server
//!
//! Serves sign-in, subscriptions, the calendar and mail proxy, and the
//! Gemini-backed scheduling chat.

use calendar_assistant::{
    config::Config,
    db::{FirestoreDb, UserStore},
    services::{
        gemini::DisabledLlm, http::build_client, CalendarFactory, GeminiClient, KmsService,
        LlmClient, OAuthProvider, PayPalClient, PlanCatalog, ProviderCalendarFactory,
        SessionCache, StripeClient,
    },
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired session cache entries are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Calendar Assistant API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");
    let users: Arc<dyn UserStore> = Arc::new(db);

    // Initialize KMS service
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        KmsService::TOKEN_KEY_NAME,
    )
    .await
    .expect("Failed to initialize KMS service");
    tracing::info!("KMS service initialized");

    let http = build_client().expect("Failed to build HTTP client");

    // OAuth providers and the calendar adapter factory
    let google_oauth = Arc::new(OAuthProvider::google(&config, http.clone()));
    let microsoft_oauth = OAuthProvider::microsoft(&config, http.clone()).map(Arc::new);
    if microsoft_oauth.is_none() {
        tracing::warn!("Microsoft credentials not set, Microsoft sign-in disabled");
    }
    let calendars: Arc<dyn CalendarFactory> = Arc::new(ProviderCalendarFactory::new(
        http.clone(),
        google_oauth.clone(),
        microsoft_oauth.clone(),
    ));

    let llm: Arc<dyn LlmClient> = match config.gemini_api_key.as_deref() {
        Some(key) => Arc::new(GeminiClient::new(http.clone(), &config.gemini_api_base, key)),
        None => {
            tracing::warn!("GEMINI_SECRET_KEY not set, chat disabled");
            Arc::new(DisabledLlm)
        }
    };

    // Session cache, swept in the background
    let sessions = Arc::new(SessionCache::new(
        users.clone(),
        kms.clone(),
        calendars.clone(),
        llm,
        Duration::from_secs(config.chat_timeout_secs),
    ));
    sessions.clone().spawn_sweeper(SESSION_SWEEP_INTERVAL);

    // Billing
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

    let mut plans =
        PlanCatalog::load(&config.subscriptions_file).expect("Failed to load subscription plans");
    if let Some(paypal) = paypal.as_deref() {
        plans.provision(paypal).await;
        tracing::info!(mode = %config.paypal_mode, plans = plans.len(), "PayPal plans ready");
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        users,
        kms,
        http,
        google_oauth,
        microsoft_oauth,
        calendars,
        sessions,
        stripe,
        paypal,
        plans,
    });

    // Build router
    let app = calendar_assistant::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("calendar_assistant=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
