// Signed token issuance

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use std::time::Duration;
use tracing::debug;

use crate::db::KeyStore;
use crate::error::{JwksError, Result};
use crate::types::{Claims, KeyRecord};

/// Fixed subject asserted by every issued token.
pub const TOKEN_USER: &str = "username";

/// Which key, and which kind of claim expiry, an issuance request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Current key, `exp` in the near future.
    Current,
    /// Expired key, `exp` already in the past.
    Expired,
}

impl TokenMode {
    pub fn from_expired_flag(want_expired: bool) -> Self {
        if want_expired {
            TokenMode::Expired
        } else {
            TokenMode::Current
        }
    }

    fn wants_expired(self) -> bool {
        self == TokenMode::Expired
    }
}

/// A compact-serialized JWT together with what went into it.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub kid: i64,
    pub claims: Claims,
}

/// Signs RS256 tokens with keys selected from the store.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    store: KeyStore,
    token_ttl: Duration,
    expired_token_age: Duration,
}

impl TokenIssuer {
    pub fn new(store: KeyStore, token_ttl: Duration, expired_token_age: Duration) -> Self {
        Self {
            store,
            token_ttl,
            expired_token_age,
        }
    }

    /// Issue a token for `mode` at time `now`.
    ///
    /// In [`TokenMode::Expired`] both the signing key and the `exp` claim are
    /// invalid. A missing key is an error; the other kind is never substituted.
    pub async fn issue(&self, mode: TokenMode, now: i64) -> Result<SignedToken> {
        let key = self
            .store
            .get_any(now, mode.wants_expired())
            .await
            .map_err(|e| match e {
                JwksError::NotFound { .. } => match mode {
                    TokenMode::Current => JwksError::NoCurrentKey,
                    TokenMode::Expired => JwksError::NoExpiredKey,
                },
                other => other,
            })?;

        let exp = match mode {
            TokenMode::Current => now.saturating_add(secs(self.token_ttl)),
            TokenMode::Expired => now.saturating_sub(secs(self.expired_token_age)),
        };
        let claims = Claims {
            user: TOKEN_USER.to_string(),
            exp,
        };

        let token = sign(&key, &claims)?;
        debug!(kid = key.kid, ?mode, exp, "issued token");
        Ok(SignedToken {
            token,
            kid: key.kid,
            claims,
        })
    }
}

fn sign(key: &KeyRecord, claims: &Claims) -> Result<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid.to_string());

    let encoding_key = EncodingKey::from_rsa_pem(&key.material).map_err(|e| {
        JwksError::InvalidKeyMaterial {
            kid: key.kid,
            message: e.to_string(),
        }
    })?;
    Ok(encode(&header, claims, &encoding_key)?)
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
