use adharvest_core::{CollectionType, Platform};
use thiserror::Error;

/// Errors returned by platform adapters.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("{platform} API error (status {status}): {message}")]
    Api {
        platform: Platform,
        status: u16,
        message: String,
    },

    /// The platform throttled the request.
    #[error("{platform} rate limit reached: {message}")]
    RateLimited { platform: Platform, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response was valid JSON but lacked a required field.
    #[error("unexpected {platform} response: {detail}")]
    UnexpectedResponse { platform: Platform, detail: String },

    #[error("{platform} does not support {operation}")]
    Unsupported {
        platform: Platform,
        operation: &'static str,
    },

    #[error("{platform} does not collect {collection_type}")]
    UnsupportedCollection {
        platform: Platform,
        collection_type: CollectionType,
    },

    #[error("{platform} credential has no account id")]
    MissingAccountId { platform: Platform },

    #[error("{platform} credential is missing its API secret")]
    MissingApiSecret { platform: Platform },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("request signing failed: {0}")]
    Signing(String),
}

impl PlatformError {
    /// Whether another attempt at the same request could succeed.
    ///
    /// Transport failures, platform rejections, throttling and malformed
    /// responses are all worth another attempt. Problems with the request
    /// setup itself are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Http(_)
            | PlatformError::Api { .. }
            | PlatformError::RateLimited { .. }
            | PlatformError::Deserialize { .. }
            | PlatformError::UnexpectedResponse { .. } => true,
            PlatformError::Unsupported { .. }
            | PlatformError::UnsupportedCollection { .. }
            | PlatformError::MissingAccountId { .. }
            | PlatformError::MissingApiSecret { .. }
            | PlatformError::InvalidBaseUrl { .. }
            | PlatformError::Signing(_) => false,
        }
    }

    /// Whether the platform refused the credential itself, as with a
    /// revoked grant or an unauthorized client, rather than failing to
    /// serve the request.
    #[must_use]
    pub fn is_credential_rejection(&self) -> bool {
        matches!(
            self,
            PlatformError::Api {
                status: 400 | 401 | 403,
                ..
            }
        )
    }
}
