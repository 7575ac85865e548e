// JWKS server: publishes RSA public keys and issues RS256 tokens
//
// Two keys are generated at startup, one current and one already expired.
// GET /.well-known/jwks.json lists only the current one; POST /auth signs a
// token with it, or with the expired key when `?expired=true` is given.

use jwks_server::{config::ServerConfig, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match ServerConfig::from_env() {
        Ok(config) => server::start_server(config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!("Server error: {e:#}");
        std::process::exit(1);
    }
}
