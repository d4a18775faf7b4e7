//! OAuth authorization: initiate and callback.
//!
//! Initiation stores a short-lived authorization session keyed by a random
//! state token, with the client secret parked under a temporary vault
//! reference. The callback validates the session, exchanges the code,
//! stores the resulting tokens and creates the integration. Sessions whose
//! callback never arrives are expired by [`sweep_expired_sessions`].

use adharvest_core::{
    AuthorizationSession, Integration, IntegrationType, NewAuthorizationSession, NewIntegration,
    Platform, SessionStatus,
};
use adharvest_platforms::{AuthorizationRequest, CodeExchange, TokenGrant};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::context::CollectorContext;
use crate::error::OAuthError;
use crate::store::StoreError;

/// Where the OAuth client id and secret come from.
#[derive(Clone)]
pub enum CredentialSource {
    /// The client registered for the advertiser's organization.
    Organization,
    Provided {
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Organization => f.write_str("Organization"),
            CredentialSource::Provided { client_id, .. } => f
                .debug_struct("Provided")
                .field("client_id", client_id)
                .field("client_secret", &"[redacted]")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub account_id: Option<String>,
    pub source: CredentialSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateResponse {
    pub authorization_url: String,
    pub state_token: String,
}

/// URL-safe base64 of 32 random bytes.
fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// S256 PKCE challenge for `verifier`.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Client id and plaintext secret for `request`.
async fn resolve_client(
    ctx: &CollectorContext,
    request: &InitiateRequest,
) -> Result<(String, String), OAuthError> {
    let missing = || OAuthError::MissingClientCredentials {
        platform: request.platform,
    };
    match &request.source {
        CredentialSource::Provided {
            client_id,
            client_secret,
        } => {
            if client_id.is_empty() || client_secret.is_empty() {
                return Err(missing());
            }
            Ok((client_id.clone(), client_secret.clone()))
        }
        CredentialSource::Organization => {
            let authorizations = &ctx.stores().authorizations;
            let organization_id = match authorizations
                .advertiser_organization(request.advertiser_id)
                .await
            {
                Ok(id) => id,
                Err(StoreError::NotFound) => return Err(missing()),
                Err(e) => return Err(e.into()),
            };
            let client = authorizations
                .org_oauth_client(organization_id, request.platform)
                .await?
                .ok_or_else(missing)?;
            let secret = match ctx.stores().secrets.get(client.client_secret_ref).await {
                Ok(secret) => secret,
                Err(StoreError::NotFound) => return Err(missing()),
                Err(e) => return Err(e.into()),
            };
            Ok((client.client_id, secret))
        }
    }
}

/// Starts an authorization and returns the provider URL to send the
/// browser to.
///
/// # Errors
///
/// - [`OAuthError::Disabled`] if the platform has OAuth turned off.
/// - [`OAuthError::MissingClientCredentials`] if no client is available.
/// - [`OAuthError::Storage`] if the session cannot be saved.
pub async fn initiate_oauth(
    ctx: &CollectorContext,
    request: &InitiateRequest,
) -> Result<InitiateResponse, OAuthError> {
    let platform = request.platform;
    let config = ctx
        .platforms()
        .get(platform)
        .filter(|c| c.oauth_enabled)
        .ok_or(OAuthError::Disabled(platform))?;
    let adapter = ctx
        .adapters()
        .get(platform)
        .ok_or(OAuthError::Disabled(platform))?;

    let (client_id, client_secret) = resolve_client(ctx, request).await?;

    let state_token = random_token();
    let code_verifier = adapter.uses_pkce().then(random_token);
    let code_challenge = code_verifier.as_deref().map(pkce_challenge);
    let redirect_uri = ctx.settings().oauth_redirect_uri.clone();

    let authorization_url = adapter
        .authorization_url(&AuthorizationRequest {
            client_id: &client_id,
            redirect_uri: &redirect_uri,
            state: &state_token,
            scopes: &config.oauth_scopes,
            code_challenge: code_challenge.as_deref(),
        })
        .map_err(OAuthError::AuthorizationUrl)?;

    let secrets = &ctx.stores().secrets;
    let temp_secret_ref = secrets
        .put(
            &client_secret,
            &format!("temporary {platform} oauth client secret"),
        )
        .await?;

    let session = ctx
        .stores()
        .authorizations
        .create_session(&NewAuthorizationSession {
            state_token: state_token.clone(),
            advertiser_id: request.advertiser_id,
            platform,
            code_verifier,
            client_id,
            client_secret_ref: temp_secret_ref,
            redirect_uri,
            account_id: request.account_id.clone(),
            expires_at: Utc::now() + ctx.settings().session_ttl,
        })
        .await;
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            if let Err(del) = secrets.delete(temp_secret_ref).await {
                tracing::warn!(error = %del, "failed to delete temporary client secret");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        session_id = %session.id,
        advertiser_id = %request.advertiser_id,
        %platform,
        pkce = session.code_verifier.is_some(),
        "oauth authorization initiated"
    );

    Ok(InitiateResponse {
        authorization_url,
        state_token,
    })
}

/// Removes the session's temporary client secret. Failures are logged only.
async fn discard_temp_secret(ctx: &CollectorContext, session: &AuthorizationSession) {
    if let Err(e) = ctx.stores().secrets.delete(session.client_secret_ref).await {
        tracing::warn!(session_id = %session.id, error = %e, "failed to delete temporary client secret");
    }
}

async fn mark_session(ctx: &CollectorContext, session: &AuthorizationSession, status: SessionStatus) {
    if let Err(e) = ctx
        .stores()
        .authorizations
        .mark_session_status(session.id, status)
        .await
    {
        tracing::warn!(session_id = %session.id, error = %e, "failed to update session status");
    }
}

/// Returns a session claimed by this callback to `failed`.
async fn release_claim(ctx: &CollectorContext, session: &AuthorizationSession) {
    match ctx
        .stores()
        .authorizations
        .fail_claimed_session(session.id)
        .await
    {
        Ok(true) => {}
        Ok(false) => tracing::warn!(session_id = %session.id, "claimed session changed state during callback"),
        Err(e) => tracing::warn!(session_id = %session.id, error = %e, "failed to update session status"),
    }
}

/// Loads the pending, unexpired session for `state`.
async fn load_session(ctx: &CollectorContext, state: &str) -> Result<AuthorizationSession, OAuthError> {
    let session = ctx
        .stores()
        .authorizations
        .session_by_state(state)
        .await?
        .ok_or(OAuthError::InvalidState)?;

    match session.status {
        SessionStatus::Pending => {}
        SessionStatus::Completed => return Err(OAuthError::SessionUsed),
        SessionStatus::Expired => return Err(OAuthError::SessionExpired),
        SessionStatus::Failed => return Err(OAuthError::InvalidState),
    }
    if session.is_expired_at(Utc::now()) {
        tracing::info!(session_id = %session.id, "oauth callback arrived after session expiry");
        mark_session(ctx, &session, SessionStatus::Expired).await;
        discard_temp_secret(ctx, &session).await;
        return Err(OAuthError::SessionExpired);
    }
    Ok(session)
}

/// Stores the granted tokens and a permanent copy of the client secret,
/// then creates the integration.
async fn store_integration(
    ctx: &CollectorContext,
    session: &AuthorizationSession,
    client_secret: &str,
    grant: &TokenGrant,
) -> Result<Integration, OAuthError> {
    let secrets = &ctx.stores().secrets;
    let platform = session.platform;
    let label = |what: &str| format!("{platform} {what} for advertiser {}", session.advertiser_id);

    let access_token_ref = secrets.put(&grant.access_token, &label("access token")).await?;
    let refresh_token_ref = match &grant.refresh_token {
        Some(token) => Some(secrets.put(token, &label("refresh token")).await?),
        None => None,
    };
    let client_secret_ref = secrets.put(client_secret, &label("oauth client secret")).await?;

    let integration = ctx
        .stores()
        .authorizations
        .replace_integration(&NewIntegration {
            advertiser_id: session.advertiser_id,
            platform,
            integration_type: IntegrationType::OAuth,
            account_id: session.account_id.clone(),
            client_id: Some(session.client_id.clone()),
            access_token_ref: Some(access_token_ref),
            refresh_token_ref,
            client_secret_ref: Some(client_secret_ref),
            token_expires_at: grant
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
        .await?;
    Ok(integration)
}

/// Completes an authorization from the provider's redirect.
///
/// # Errors
///
/// Every failure maps to a stable [`OAuthError::code`] suitable for the
/// redirect query string. A session is single-use: a second callback with
/// the same state fails with [`OAuthError::SessionUsed`].
pub async fn complete_oauth(
    ctx: &CollectorContext,
    code: Option<&str>,
    state: Option<&str>,
) -> Result<Integration, OAuthError> {
    let state = state
        .filter(|s| !s.is_empty())
        .ok_or(OAuthError::MissingParameters("state"))?;
    let code = code
        .filter(|c| !c.is_empty())
        .ok_or(OAuthError::MissingParameters("code"))?;

    let session = load_session(ctx, state).await?;
    let platform = session.platform;
    let adapter = ctx
        .adapters()
        .get(platform)
        .ok_or(OAuthError::Disabled(platform))?;

    let client_secret = match ctx.stores().secrets.get(session.client_secret_ref).await {
        Ok(secret) => secret,
        Err(StoreError::NotFound) => {
            mark_session(ctx, &session, SessionStatus::Failed).await;
            return Err(OAuthError::MissingClientCredentials { platform });
        }
        Err(e) => return Err(e.into()),
    };

    // Claim before talking to the provider; a concurrent callback with the
    // same state loses here.
    if !ctx
        .stores()
        .authorizations
        .complete_session(session.id)
        .await?
    {
        return Err(OAuthError::SessionUsed);
    }

    let grant = adapter
        .exchange_code(&CodeExchange {
            code,
            client_id: &session.client_id,
            client_secret: &client_secret,
            redirect_uri: &session.redirect_uri,
            code_verifier: session.code_verifier.as_deref(),
        })
        .await;
    let grant = match grant {
        Ok(grant) => grant,
        Err(e) => {
            tracing::warn!(session_id = %session.id, %platform, error = %e, "oauth code exchange failed");
            release_claim(ctx, &session).await;
            discard_temp_secret(ctx, &session).await;
            return Err(OAuthError::TokenExchange(e));
        }
    };

    let integration = match store_integration(ctx, &session, &client_secret, &grant).await {
        Ok(integration) => integration,
        Err(e) => {
            release_claim(ctx, &session).await;
            discard_temp_secret(ctx, &session).await;
            return Err(e);
        }
    };
    discard_temp_secret(ctx, &session).await;

    tracing::info!(
        integration_id = %integration.id,
        advertiser_id = %integration.advertiser_id,
        %platform,
        "oauth integration created"
    );
    Ok(integration)
}

/// Closes the session behind a callback the provider answered with an
/// error, such as a user denying consent. Returns `false` when `state` is
/// unknown or its session is no longer pending.
///
/// # Errors
///
/// Returns [`OAuthError::Storage`] if the session cannot be read or updated.
pub async fn abandon_oauth(
    ctx: &CollectorContext,
    state: &str,
    reason: &str,
) -> Result<bool, OAuthError> {
    let authorizations = &ctx.stores().authorizations;
    let Some(session) = authorizations.session_by_state(state).await? else {
        return Ok(false);
    };
    if !authorizations
        .mark_session_status(session.id, SessionStatus::Failed)
        .await?
    {
        return Ok(false);
    }
    discard_temp_secret(ctx, &session).await;

    tracing::info!(
        session_id = %session.id,
        platform = %session.platform,
        reason,
        "oauth authorization abandoned at provider"
    );
    Ok(true)
}

/// Expires pending sessions whose callback never arrived and deletes their
/// temporary client secrets. Returns how many sessions were expired.
///
/// # Errors
///
/// Returns [`OAuthError::Storage`] if the stale sessions cannot be updated.
pub async fn sweep_expired_sessions(ctx: &CollectorContext) -> Result<usize, OAuthError> {
    let expired = ctx
        .stores()
        .authorizations
        .expire_stale_sessions(Utc::now())
        .await?;
    for session in &expired {
        discard_temp_secret(ctx, session).await;
    }
    if !expired.is_empty() {
        tracing::info!(expired = expired.len(), "expired abandoned oauth sessions");
    }
    Ok(expired.len())
}
