use std::time::Duration;

use adharvest_core::Platform;
use adharvest_platforms::PlatformError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Failure of one collection attempt.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Missing integration, platform config or adapter. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("chunk exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollectError {
    /// Whether the failure should consume a retry rather than fail the chunk
    /// outright.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CollectError::Config(_) => false,
            CollectError::Credential(e) => e.is_retryable(),
            CollectError::Platform(e) => e.is_transient(),
            CollectError::Timeout(_) | CollectError::Store(_) => true,
        }
    }

    /// Log label separating deadline expiry from every other failure.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            CollectError::Timeout(_) => "timeout",
            CollectError::Config(_) => "config_error",
            CollectError::Credential(_) => "credential_error",
            CollectError::Store(_) => "store_error",
            CollectError::Platform(_) => "platform_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("integration {0} not found")]
    IntegrationNotFound(Uuid),

    #[error("no stored credential for integration {integration_id}")]
    CredentialNotFound { integration_id: Uuid },

    #[error("integration {integration_id} has no OAuth client credentials")]
    MissingClientCredentials { integration_id: Uuid },

    #[error("{platform} token refresh failed: {cause}")]
    RefreshFailed { platform: Platform, cause: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CredentialError {
    /// Refresh rejections and store hiccups may clear up; missing data will
    /// not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CredentialError::RefreshFailed { .. } | CredentialError::Store(_)
        )
    }
}

/// Failures of the OAuth initiate/callback flow.
///
/// Each variant has a stable [`OAuthError::code`] that the HTTP layer puts in
/// the `oauth_error` redirect parameter.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth is not enabled for {0}")]
    Disabled(Platform),

    #[error("missing required parameter: {0}")]
    MissingParameters(&'static str),

    #[error("no OAuth client credentials available for {platform}")]
    MissingClientCredentials { platform: Platform },

    #[error("unknown or invalid state token")]
    InvalidState,

    #[error("authorization session expired")]
    SessionExpired,

    #[error("authorization session already used")]
    SessionUsed,

    #[error("authorization denied by provider: {0}")]
    AccessDenied(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(#[source] PlatformError),

    #[error("building authorization URL failed: {0}")]
    AuthorizationUrl(#[source] PlatformError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl OAuthError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::Disabled(_) => "oauth_disabled",
            OAuthError::MissingParameters(_) => "missing_parameters",
            OAuthError::MissingClientCredentials { .. } => "missing_client_credentials",
            OAuthError::InvalidState => "invalid_state",
            OAuthError::SessionExpired => "session_expired",
            OAuthError::SessionUsed => "session_used",
            OAuthError::AccessDenied(_) => "access_denied",
            OAuthError::TokenExchange(_) => "token_exchange_failed",
            OAuthError::AuthorizationUrl(_) => "authorization_url_failed",
            OAuthError::Storage(_) => "storage_failed",
        }
    }
}
