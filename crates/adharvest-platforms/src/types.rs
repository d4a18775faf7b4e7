//! Inputs and outputs shared by all adapters.

use std::fmt;

/// Credential material an adapter needs to call a platform.
///
/// `access_token` is the OAuth access token, or the API key for platforms
/// that use static keys. Debug output never includes secret values.
#[derive(Clone)]
pub struct PlatformCredential {
    pub access_token: String,
    pub account_id: Option<String>,
    /// Request-signing secret (Naver's secret key).
    pub api_secret: Option<String>,
}

impl fmt::Debug for PlatformCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformCredential")
            .field("access_token", &"[redacted]")
            .field("account_id", &self.account_id)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Tokens issued by a refresh or an authorization-code exchange.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds, when the platform reports one.
    pub expires_in: Option<i64>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Parameters of the browser redirect that starts an OAuth authorization.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub scopes: &'a [String],
    /// S256 PKCE challenge, for adapters that use PKCE.
    pub code_challenge: Option<&'a str>,
}

/// Parameters for trading an authorization code for tokens.
#[derive(Clone, Copy)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub code_verifier: Option<&'a str>,
}

impl fmt::Debug for CodeExchange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeExchange")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("code", &"[redacted]")
            .field("client_secret", &"[redacted]")
            .finish_non_exhaustive()
    }
}

/// HTTP client settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "adharvest/0.1 (ad-performance-collector)".to_string(),
        }
    }
}
