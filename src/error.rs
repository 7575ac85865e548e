// Error taxonomy for key storage, generation and token issuance

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;

/// Errors produced by the key lifecycle and issuance core.
///
/// None of these are recoverable within a request. At the HTTP boundary they
/// all surface as `500 Internal Server Error`.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// The storage medium is unavailable or a statement failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A storage call did not complete within its deadline.
    #[error("Storage call timed out after {0:?}")]
    StorageTimeout(Duration),

    /// The blocking storage task failed or the database file could not be reset.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// RSA key generation failed.
    #[error("Key generation error: {message}")]
    Generation { message: String },

    /// No stored key matched the requested expiry condition.
    #[error("No {} key found", key_role(.wanted_expired))]
    NotFound { wanted_expired: bool },

    /// Issuance asked for the current key and none exists.
    #[error("No current signing key available")]
    NoCurrentKey,

    /// Issuance asked for the expired key and none exists.
    #[error("No expired signing key available")]
    NoExpiredKey,

    /// Stored key material could not be parsed.
    #[error("Invalid key material for kid {kid}: {message}")]
    InvalidKeyMaterial { kid: i64, message: String },

    /// A response document could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// JWT construction or signing failed.
    #[error("Token signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

fn key_role(wanted_expired: &bool) -> &'static str {
    if *wanted_expired { "expired" } else { "current" }
}

impl JwksError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Whether the failure originated in the storage medium.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::StorageTimeout(_) | Self::StorageUnavailable { .. }
        )
    }
}

impl IntoResponse for JwksError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, storage = self.is_storage(), "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    }
}

pub type Result<T, E = JwksError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_wanted_key() {
        let current = JwksError::NotFound {
            wanted_expired: false,
        };
        let expired = JwksError::NotFound {
            wanted_expired: true,
        };
        assert_eq!(current.to_string(), "No current key found");
        assert_eq!(expired.to_string(), "No expired key found");
    }

    #[test]
    fn storage_variants_are_classified() {
        assert!(JwksError::StorageTimeout(Duration::from_millis(5)).is_storage());
        assert!(JwksError::storage_unavailable("blocking task cancelled").is_storage());
        assert!(!JwksError::NoCurrentKey.is_storage());
    }

    #[test]
    fn every_error_maps_to_500() {
        let response = JwksError::NoExpiredKey.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = JwksError::generation("entropy").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
