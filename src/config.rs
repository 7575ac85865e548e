// Server configuration sourced from environment variables

use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DB_FILE: &str = "totally_not_my_privateKeys.db";
pub const MIN_KEY_BITS: usize = 2048;
/// Ten years; the current key is never rotated while the process runs.
pub const DEFAULT_CURRENT_KEY_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Runtime settings for the JWKS server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// SQLite file; removed and recreated on every start.
    pub db_path: PathBuf,
    pub key_bits: usize,
    /// How long the current key stays valid after bootstrap.
    pub current_key_ttl: Duration,
    /// How far in the past the expired key's expiry is placed.
    pub expired_key_age: Duration,
    /// Claim `exp` horizon for normal tokens.
    pub token_ttl: Duration,
    /// How far in the past the claim `exp` is placed for expired tokens.
    pub expired_token_age: Duration,
    /// Upper bound on a single storage call.
    pub store_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            key_bits: MIN_KEY_BITS,
            current_key_ttl: DEFAULT_CURRENT_KEY_TTL,
            expired_key_age: Duration::from_secs(3600),
            token_ttl: Duration::from_secs(300),
            expired_token_age: Duration::from_secs(3600),
            store_timeout: Duration::from_millis(2000),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to
    /// defaults for anything unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = parse_or("JWKS_BIND", &lookup, defaults.bind_addr)?;
        let db_path = lookup("JWKS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let key_bits = parse_or("JWKS_KEY_BITS", &lookup, defaults.key_bits)?;
        let current_key_ttl =
            secs_or("JWKS_CURRENT_KEY_TTL_SECS", &lookup, defaults.current_key_ttl)?;
        let expired_key_age =
            secs_or("JWKS_EXPIRED_KEY_AGE_SECS", &lookup, defaults.expired_key_age)?;
        let token_ttl = secs_or("JWKS_TOKEN_TTL_SECS", &lookup, defaults.token_ttl)?;
        let expired_token_age =
            secs_or("JWKS_EXPIRED_TOKEN_AGE_SECS", &lookup, defaults.expired_token_age)?;
        let store_timeout = parse_or(
            "JWKS_STORE_TIMEOUT_MS",
            &lookup,
            defaults.store_timeout.as_millis() as u64,
        )
        .map(Duration::from_millis)?;

        let config = Self {
            bind_addr,
            db_path,
            key_bits,
            current_key_ttl,
            expired_key_age,
            token_ttl,
            expired_token_age,
            store_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_bits < MIN_KEY_BITS {
            bail!(
                "JWKS_KEY_BITS must be at least {MIN_KEY_BITS}, got {}",
                self.key_bits
            );
        }
        let durations = [
            ("JWKS_CURRENT_KEY_TTL_SECS", self.current_key_ttl),
            ("JWKS_EXPIRED_KEY_AGE_SECS", self.expired_key_age),
            ("JWKS_TOKEN_TTL_SECS", self.token_ttl),
            ("JWKS_EXPIRED_TOKEN_AGE_SECS", self.expired_token_age),
            ("JWKS_STORE_TIMEOUT_MS", self.store_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }
        // A token must never outlive the key that signed it.
        if self.current_key_ttl <= self.token_ttl {
            bail!(
                "JWKS_CURRENT_KEY_TTL_SECS ({}) must exceed JWKS_TOKEN_TTL_SECS ({})",
                self.current_key_ttl.as_secs(),
                self.token_ttl.as_secs()
            );
        }
        Ok(())
    }
}

fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().with_context(|| format!("parse {name}")),
        None => Ok(default),
    }
}

fn secs_or<F>(name: &str, lookup: &F, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(name, lookup, default.as_secs()).map(Duration::from_secs)
}
