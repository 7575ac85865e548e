// RSA key generation with validity windows

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::time::Duration;

use crate::config::MIN_KEY_BITS;
use crate::error::{JwksError, Result};

/// Where a freshly generated key's expiry sits relative to its creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Valid until `now + ttl`.
    Current(Duration),
    /// Already expired, `age` before `now`.
    Expired(Duration),
}

impl Validity {
    pub fn expires_at(self, now: i64) -> i64 {
        match self {
            Validity::Current(ttl) => now.saturating_add(secs(ttl)),
            Validity::Expired(age) => now.saturating_sub(secs(age)),
        }
    }
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Serialized private key (PKCS#1 PEM).
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    pub fn from_private_key(key: &RsaPrivateKey) -> Result<Self> {
        let pem = key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| JwksError::generation(e.to_string()))?;
        Ok(Self(pem.as_bytes().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Parse stored PEM back into a private key.
pub fn decode_private_key(kid: i64, material: &[u8]) -> Result<RsaPrivateKey> {
    let pem = std::str::from_utf8(material).map_err(|e| JwksError::InvalidKeyMaterial {
        kid,
        message: e.to_string(),
    })?;
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| JwksError::InvalidKeyMaterial {
        kid,
        message: e.to_string(),
    })
}

/// Derive the public half of stored key material.
pub fn decode_public_key(kid: i64, material: &[u8]) -> Result<RsaPublicKey> {
    decode_private_key(kid, material).map(|key| key.to_public_key())
}

/// A generated key together with its computed expiry.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub material: KeyMaterial,
    pub expires_at: i64,
}

/// Produces fresh RSA key pairs.
#[derive(Debug, Clone, Copy)]
pub struct KeyGenerator {
    bits: usize,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self { bits: MIN_KEY_BITS }
    }
}

impl KeyGenerator {
    pub fn new(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(JwksError::generation(format!(
                "refusing to generate {bits}-bit RSA key, minimum is {MIN_KEY_BITS}"
            )));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Generate a new key pair whose expiry is placed according to `validity`
    /// relative to `now`.
    pub fn generate(&self, validity: Validity, now: i64) -> Result<GeneratedKey> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| JwksError::generation(e.to_string()))?;
        Ok(GeneratedKey {
            material: KeyMaterial::from_private_key(&private_key)?,
            expires_at: validity.expires_at(now),
        })
    }
}
