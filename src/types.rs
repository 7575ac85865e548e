// Data structures for the JWKS server

use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

/// Full key record as stored, private PEM included.
#[derive(Clone)]
pub struct KeyRecord {
    pub kid: i64,               // Key ID assigned by the store
    pub material: Vec<u8>,      // PKCS#1 PEM of the private key
    pub expires_at: i64,        // Expiry, seconds since epoch
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("kid", &self.kid)
            .field("material", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Public half of a stored key, as handed to the publisher.
#[derive(Debug, Clone)]
pub struct PublicKeyRecord {
    pub kid: i64,
    pub public_key: RsaPublicKey,
    pub expires_at: i64,
}

/// JSON Web Key structure for JWKS response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub alg: String, // Algorithm (RS256)
    pub kty: String, // Key type (RSA)
    #[serde(rename = "use")]
    pub key_use: String, // Key usage (sig for signature)
    pub kid: String, // Key ID
    pub n: String,   // Modulus (base64url)
    pub e: String,   // Exponent (base64url)
}

/// JWKS document format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<JsonWebKey>,
}

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user: String, // Fixed subject assertion
    pub exp: i64,     // Expires at
}

/// Query parameters for auth endpoint
#[derive(Debug, Default)]
pub struct AuthQuery {
    pub expired: Option<String>,
}

impl AuthQuery {
    /// Build from raw query pairs. Repeated keys are allowed; the first
    /// `expired` wins.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let expired = pairs
            .into_iter()
            .find(|(name, _)| name == "expired")
            .map(|(_, value)| value);
        Self { expired }
    }

    /// `?expired` and `?expired=<anything but a false-like value>` select the
    /// expired path.
    pub fn wants_expired(&self) -> bool {
        match self.expired.as_deref().map(str::trim) {
            None => false,
            Some(value) => !matches!(
                value.to_ascii_lowercase().as_str(),
                "false" | "0" | "no" | "off"
            ),
        }
    }
}
