// Key-set discovery document

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rsa::traits::PublicKeyParts;
use tracing::debug;

use crate::db::KeyStore;
use crate::error::Result;
use crate::types::{JsonWebKey, JwksDocument, PublicKeyRecord};

pub const ALGORITHM: &str = "RS256";
pub const KEY_TYPE: &str = "RSA";
pub const KEY_USE: &str = "sig";

/// Renders the public halves of all current keys as a JWKS document.
#[derive(Debug, Clone)]
pub struct JwksPublisher {
    store: KeyStore,
}

impl JwksPublisher {
    pub fn new(store: KeyStore) -> Self {
        Self { store }
    }

    /// Only keys with `exp > as_of` are published; expired keys stay in the
    /// store but never appear here.
    pub async fn publish(&self, as_of: i64) -> Result<JwksDocument> {
        let records = self.store.list_valid(as_of).await?;
        let keys: Vec<JsonWebKey> = records.iter().map(to_jwk).collect();
        debug!(count = keys.len(), as_of, "published key set");
        Ok(JwksDocument { keys })
    }
}

/// Encode a public key as a JWK: modulus and exponent as big-endian bytes,
/// base64url without padding.
pub fn to_jwk(record: &PublicKeyRecord) -> JsonWebKey {
    let n_bytes = record.public_key.n().to_bytes_be();
    let e_bytes = record.public_key.e().to_bytes_be();

    JsonWebKey {
        alg: ALGORITHM.to_string(),
        kty: KEY_TYPE.to_string(),
        key_use: KEY_USE.to_string(),
        kid: record.kid.to_string(),
        n: URL_SAFE_NO_PAD.encode(&n_bytes),
        e: URL_SAFE_NO_PAD.encode(&e_bytes),
    }
}
