// Startup seeding of the key store

use std::time::Duration;
use tracing::info;

use crate::db::KeyStore;
use crate::error::{JwksError, Result};
use crate::key_management::{KeyGenerator, Validity};

/// Ids of the pair of keys seeded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededKeys {
    pub current_kid: i64,
    pub expired_kid: i64,
}

/// Guarantees the store holds one current and one expired key before the
/// server accepts traffic.
#[derive(Debug, Clone)]
pub struct KeyRegistry {
    store: KeyStore,
    generator: KeyGenerator,
    current_ttl: Duration,
    expired_age: Duration,
}

impl KeyRegistry {
    pub fn new(
        store: KeyStore,
        generator: KeyGenerator,
        current_ttl: Duration,
        expired_age: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            current_ttl,
            expired_age,
        }
    }

    /// Generate and insert one current and one already-expired key.
    ///
    /// Each call seeds its own pair; records from earlier calls are left in
    /// place. Must finish before the first request is served.
    pub async fn bootstrap(&self, now: i64) -> Result<SeededKeys> {
        let current_kid = self.seed(Validity::Current(self.current_ttl), now).await?;
        let expired_kid = self.seed(Validity::Expired(self.expired_age), now).await?;
        Ok(SeededKeys {
            current_kid,
            expired_kid,
        })
    }

    async fn seed(&self, validity: Validity, now: i64) -> Result<i64> {
        let generator = self.generator;
        // RSA generation is CPU-bound.
        let generated = tokio::task::spawn_blocking(move || generator.generate(validity, now))
            .await
            .map_err(|e| JwksError::generation(e.to_string()))??;
        let expires_at = generated.expires_at;
        let kid = self.store.insert(generated.material, expires_at).await?;
        info!(kid, expires_at, ?validity, bits = generator.bits(), "seeded signing key");
        Ok(kid)
    }
}
