mod admin;
mod auth;
mod billing;
mod config;
mod db;
mod errors;
mod events;
mod generation;
mod identity;
mod ledger;
mod llm_client;
mod models;
mod registry;
mod resumes;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::billing::provider::StripeClient;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::resumes::extraction::DocumentExtractor;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and apply migrations
    let pool = create_pool(&config.database_url).await?;
    let store = PgStore::new(pool);
    store.migrate().await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.llm_timeout)?;
    info!(
        "LLM client initialized (model: {}, timeout: {:?})",
        llm_client::MODEL,
        config.llm_timeout
    );

    // Initialize payment provider
    let payments = StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_webhook_secret.clone(),
    )?;
    info!("Stripe client initialized");

    // Build app state
    let state = AppState::new(
        Arc::new(store),
        Arc::new(llm),
        Arc::new(payments),
        Arc::new(DocumentExtractor),
        config.clone(),
    );

    // Make sure there is always a registered prompt to fall back on
    if let Some(seeded) = state.registry.seed_default().await? {
        info!("Seeded default prompt version {}", seeded.id);
    }

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to APP_BASE_URL once the web app is deployed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
