// Integration tests for the JWKS server router

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use jwks_server::config::ServerConfig;
use jwks_server::db::KeyStore;
use jwks_server::registry::SeededKeys;
use jwks_server::server::{build_state, create_app};
use jwks_server::types::{Claims, JwksDocument};
use tokio::task::JoinSet;
use tower::ServiceExt;

async fn bootstrapped_app() -> (Router, SeededKeys) {
    let store = KeyStore::in_memory().expect("store open failed");
    let (state, seeded) = build_state(&ServerConfig::default(), store)
        .await
        .expect("bootstrap failed");
    (create_app(state), seeded)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

async fn fetch_jwks(app: &Router) -> JwksDocument {
    let (status, _, body) = send(app, Method::GET, "/.well-known/jwks.json").await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_str(&body).expect("JWKS body is not valid JSON")
}

/// Decode the payload segment without checking the signature.
fn unverified_claims(token: &str) -> Claims {
    let payload = token.split('.').nth(1).expect("token has no payload");
    let bytes = URL_SAFE_NO_PAD.decode(payload).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Test the complete JWKS endpoint functionality
#[tokio::test]
async fn test_jwks_endpoint_integration() {
    let (app, seeded) = bootstrapped_app().await;

    let (status, content_type, body) = send(&app, Method::GET, "/.well-known/jwks.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let keys = json["keys"].as_array().expect("keys array missing");
    assert!(!keys.is_empty());

    let key = &keys[0];
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["use"], "sig");
    assert_eq!(key["kid"], seeded.current_kid.to_string());
    assert!(key["n"].is_string());
    assert!(key["e"].is_string());
}

/// Test JWKS only returns valid (non-expired) keys
#[tokio::test]
async fn test_jwks_filters_expired_keys() {
    let (app, seeded) = bootstrapped_app().await;
    let doc = fetch_jwks(&app).await;

    let kids: Vec<&str> = doc.keys.iter().map(|k| k.kid.as_str()).collect();
    assert_eq!(kids, vec![seeded.current_kid.to_string()]);
    assert!(!kids.contains(&seeded.expired_kid.to_string().as_str()));
}

/// Repeated discovery calls return the same key ids in the same order
#[tokio::test]
async fn test_jwks_is_stable_across_calls() {
    let (app, _) = bootstrapped_app().await;
    let first = fetch_jwks(&app).await;
    let second = fetch_jwks(&app).await;
    assert_eq!(first, second);
}

/// Test POST /auth endpoint without body
#[tokio::test]
async fn test_auth_endpoint_returns_compact_jwt() {
    let (app, seeded) = bootstrapped_app().await;

    let (status, content_type, token) = send(&app, Method::POST, "/auth").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));

    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "JWT should have 3 parts");
    assert!(parts.iter().all(|p| !p.is_empty()));

    let header = decode_header(&token).unwrap();
    assert_eq!(header.kid, Some(seeded.current_kid.to_string()));

    let claims = unverified_claims(&token);
    assert_eq!(claims.user, "username");
    assert!(claims.exp > Utc::now().timestamp());
}

/// The issued token verifies against the key published under its kid
#[tokio::test]
async fn test_auth_token_verifies_with_jwks() {
    let (app, _) = bootstrapped_app().await;

    let (_, _, token) = send(&app, Method::POST, "/auth").await;
    let doc = fetch_jwks(&app).await;

    let kid = decode_header(&token).unwrap().kid.unwrap();
    let jwk = doc
        .keys
        .iter()
        .find(|k| k.kid == kid)
        .expect("token kid not in JWKS");
    let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    let data = decode::<Claims>(&token, &key, &validation).expect("token verification failed");
    assert_eq!(data.claims.user, "username");
}

/// Test expired parameter functionality
#[tokio::test]
async fn test_auth_endpoint_expired_parameter() {
    let (app, seeded) = bootstrapped_app().await;

    let (status, _, token) = send(&app, Method::POST, "/auth?expired=true").await;
    assert_eq!(status, StatusCode::OK);

    let header = decode_header(&token).unwrap();
    assert_eq!(header.kid, Some(seeded.expired_kid.to_string()));

    let claims = unverified_claims(&token);
    assert!(claims.exp < Utc::now().timestamp());

    let doc = fetch_jwks(&app).await;
    assert!(doc.keys.iter().all(|k| Some(&k.kid) != header.kid.as_ref()));
}

/// A false-like value keeps the normal path
#[tokio::test]
async fn test_auth_endpoint_expired_false() {
    let (app, seeded) = bootstrapped_app().await;

    let (status, _, token) = send(&app, Method::POST, "/auth?expired=false").await;
    assert_eq!(status, StatusCode::OK);
    let header = decode_header(&token).unwrap();
    assert_eq!(header.kid, Some(seeded.current_kid.to_string()));
}

/// Repeated `expired` keys are accepted and the first value decides
#[tokio::test]
async fn test_auth_endpoint_repeated_expired_parameter() {
    let (app, seeded) = bootstrapped_app().await;

    let (status, _, token) = send(&app, Method::POST, "/auth?expired=1&expired=2").await;
    assert_eq!(status, StatusCode::OK);
    let header = decode_header(&token).unwrap();
    assert_eq!(header.kid, Some(seeded.expired_kid.to_string()));

    let (status, _, token) = send(&app, Method::POST, "/auth?expired=false&expired=true").await;
    assert_eq!(status, StatusCode::OK);
    let header = decode_header(&token).unwrap();
    assert_eq!(header.kid, Some(seeded.current_kid.to_string()));
}

/// Parallel discovery and issuance against a file-backed store
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_key_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        db_path: dir.path().join("keys.db"),
        ..ServerConfig::default()
    };
    let store = KeyStore::open_fresh(&config.db_path).unwrap();
    let (state, seeded) = build_state(&config, store).await.unwrap();
    let app = create_app(state);
    let current_kid = seeded.current_kid.to_string();

    let mut requests = JoinSet::new();
    for i in 0..32 {
        let app = app.clone();
        requests.spawn(async move {
            if i % 2 == 0 {
                let (status, _, body) = send(&app, Method::GET, "/.well-known/jwks.json").await;
                let kids = serde_json::from_str::<JwksDocument>(&body)
                    .map(|doc| doc.keys.into_iter().map(|k| k.kid).collect::<Vec<_>>())
                    .unwrap_or_default();
                (status, kids)
            } else {
                let (status, _, token) = send(&app, Method::POST, "/auth").await;
                let kid = decode_header(&token).ok().and_then(|h| h.kid);
                (status, kid.into_iter().collect())
            }
        });
    }

    let mut completed = 0;
    while let Some(joined) = requests.join_next().await {
        let (status, kids) = joined.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(kids, vec![current_kid.clone()]);
        completed += 1;
    }
    assert_eq!(completed, 32);
}

/// Test method validation on both endpoints
#[tokio::test]
async fn test_method_validation() {
    let (app, _) = bootstrapped_app().await;

    for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
        let (status, _, _) = send(&app, method.clone(), "/.well-known/jwks.json").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} on jwks");
    }
    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
        let (status, _, _) = send(&app, method.clone(), "/auth").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} on auth");
    }
}

/// Test invalid endpoints return 405
#[tokio::test]
async fn test_invalid_endpoints() {
    let (app, _) = bootstrapped_app().await;

    for (method, uri) in [
        (Method::GET, "/invalid"),
        (Method::POST, "/invalid"),
        (Method::GET, "/jwks"),
        (Method::GET, "/"),
    ] {
        let (status, _, _) = send(&app, method, uri).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
    }
}

/// A file-backed server start recreates the database with the seeded pair
#[tokio::test]
async fn test_file_store_is_recreated_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("totally_not_my_privateKeys.db");
    let config = ServerConfig {
        db_path: path.clone(),
        ..ServerConfig::default()
    };

    for _ in 0..2 {
        let store = KeyStore::open_fresh(&config.db_path).unwrap();
        let (_, seeded) = build_state(&config, store.clone()).await.unwrap();
        assert_eq!((seeded.current_kid, seeded.expired_kid), (1, 2));
        assert_eq!(store.count().await.unwrap(), 2);
    }
    assert!(path.exists());
}
