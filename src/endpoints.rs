// HTTP handlers for key discovery and token issuance

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;

use crate::error::JwksError;
use crate::jwks::JwksPublisher;
use crate::token::{TokenIssuer, TokenMode};
use crate::types::AuthQuery;

/// Shared handles passed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub publisher: Arc<JwksPublisher>,
    pub issuer: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(publisher: JwksPublisher, issuer: TokenIssuer) -> Self {
        Self {
            publisher: Arc::new(publisher),
            issuer: Arc::new(issuer),
        }
    }
}

/// JWKS endpoint handler - serves public keys in JWKS format
/// Only returns keys that have not expired
pub async fn jwks_handler(State(state): State<AppState>) -> Result<Response, JwksError> {
    let now = Utc::now().timestamp();
    let document = state.publisher.publish(now).await?;
    let body = serde_json::to_string(&document)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Auth endpoint handler - issues a signed JWT as plain text
/// `?expired=true` signs with the expired key and backdates `exp`
pub async fn auth_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, JwksError> {
    let params = AuthQuery::from_pairs(pairs);
    let now = Utc::now().timestamp();
    let mode = TokenMode::from_expired_flag(params.wants_expired());
    let signed = state.issuer.issue(mode, now).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        signed.token,
    )
        .into_response())
}

/// Rejects unsupported methods and unknown paths alike.
pub async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
