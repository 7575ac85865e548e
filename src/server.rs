// Server setup and configuration

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::db::KeyStore;
use crate::endpoints::{AppState, auth_handler, jwks_handler, method_not_allowed};
use crate::error::Result;
use crate::jwks::JwksPublisher;
use crate::key_management::KeyGenerator;
use crate::registry::{KeyRegistry, SeededKeys};
use crate::token::TokenIssuer;

pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const AUTH_PATH: &str = "/auth";

/// Create the application router with all endpoints.
///
/// Wrong methods on known paths and every unknown path answer 405.
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        // axum would otherwise answer HEAD through the GET handler
        .route(JWKS_PATH, get(jwks_handler).head(method_not_allowed))
        .route(AUTH_PATH, post(auth_handler))
        .fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Wire the core components around `store` and seed it.
///
/// Returns only once both keys are persisted, so the state is ready to serve.
pub async fn build_state(
    config: &ServerConfig,
    store: KeyStore,
) -> Result<(AppState, SeededKeys)> {
    let store = store.with_timeout(config.store_timeout);
    let registry = KeyRegistry::new(
        store.clone(),
        KeyGenerator::new(config.key_bits)?,
        config.current_key_ttl,
        config.expired_key_age,
    );
    let seeded = registry.bootstrap(Utc::now().timestamp()).await?;

    let state = AppState::new(
        JwksPublisher::new(store.clone()),
        TokenIssuer::new(store, config.token_ttl, config.expired_token_age),
    );
    Ok((state, seeded))
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let store = KeyStore::open_fresh(&config.db_path)
        .with_context(|| format!("open key store at {}", config.db_path.display()))?;
    let (app_state, seeded) = build_state(&config, store.clone())
        .await
        .context("bootstrap signing keys")?;
    let stored = store.count().await.context("count stored keys")?;
    info!(
        current_kid = seeded.current_kid,
        expired_kid = seeded.expired_kid,
        stored,
        "signing keys ready"
    );

    let app = create_app(app_state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "JWKS server listening");
    info!("GET  {JWKS_PATH} - key set");
    info!("POST {AUTH_PATH} - issue token (?expired=true for the expired key)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    info!("JWKS server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
