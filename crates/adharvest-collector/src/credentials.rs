//! Credential resolution and on-demand OAuth refresh.
//!
//! Token-mode integrations return the stored secret as-is. OAuth-mode
//! integrations return the cached access token while it is outside the
//! refresh window and otherwise refresh it through the platform adapter,
//! storing the new token under a fresh secret reference.
//!
//! Refreshes are serialized per integration: a caller that waited on the
//! lock re-reads the integration first and reuses a token another caller
//! just stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use adharvest_core::{Integration, IntegrationStatus, IntegrationType};
use adharvest_platforms::{PlatformAdapters, PlatformCredential};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CredentialError;
use crate::store::{CollectionStore, SecretStore, StoreError};

/// A credential ready for an adapter call.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: PlatformCredential,
    pub token_type: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
    /// The token was refreshed during this call.
    pub refreshed: bool,
}

/// Response body of the resolve-token operation.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
    pub refreshed: bool,
}

impl From<ResolvedCredential> for TokenResponse {
    fn from(resolved: ResolvedCredential) -> Self {
        Self {
            access_token: resolved.credential.access_token,
            token_type: resolved.token_type,
            expires_at: resolved.expires_at,
            refreshed: resolved.refreshed,
        }
    }
}

pub struct CredentialResolver {
    collections: Arc<dyn CollectionStore>,
    secrets: Arc<dyn SecretStore>,
    adapters: PlatformAdapters,
    refresh_window: chrono::Duration,
    refresh_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("refresh_window", &self.refresh_window)
            .finish_non_exhaustive()
    }
}

impl CredentialResolver {
    #[must_use]
    pub fn new(
        collections: Arc<dyn CollectionStore>,
        secrets: Arc<dyn SecretStore>,
        adapters: PlatformAdapters,
        refresh_window: chrono::Duration,
    ) -> Self {
        Self {
            collections,
            secrets,
            adapters,
            refresh_window,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a usable credential for `integration_id`, refreshing an
    /// expiring OAuth token first.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::IntegrationNotFound`] for unknown or deleted
    ///   integrations.
    /// - [`CredentialError::CredentialNotFound`] when no token is stored.
    /// - [`CredentialError::MissingClientCredentials`] when a refresh is due
    ///   but the client id or secret is missing.
    /// - [`CredentialError::RefreshFailed`] when the platform rejects the
    ///   refresh. The integration is marked expired.
    pub async fn resolve(&self, integration_id: Uuid) -> Result<ResolvedCredential, CredentialError> {
        let integration = self.load(integration_id).await?;

        if integration.integration_type == IntegrationType::Token
            || self.is_fresh(&integration, Utc::now())
        {
            return self.cached(&integration).await;
        }

        let lock = self.lock_for(integration_id);
        let _guard = lock.lock().await;

        let integration = self.load(integration_id).await?;
        if self.is_fresh(&integration, Utc::now()) {
            tracing::debug!(%integration_id, "token refreshed by a concurrent caller");
            return self.cached(&integration).await;
        }
        self.refresh(&integration).await
    }

    /// Tokens without a recorded expiry are treated as non-expiring.
    fn is_fresh(&self, integration: &Integration, now: DateTime<Utc>) -> bool {
        integration
            .token_expires_at
            .is_none_or(|expires_at| expires_at - now > self.refresh_window)
    }

    fn lock_for(&self, integration_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(integration_id).or_default())
    }

    async fn load(&self, integration_id: Uuid) -> Result<Integration, CredentialError> {
        match self.collections.get_integration(integration_id).await {
            Ok(integration) => Ok(integration),
            Err(StoreError::NotFound) => Err(CredentialError::IntegrationNotFound(integration_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a secret, mapping a dangling reference to `None`.
    async fn read_secret(&self, reference: Option<Uuid>) -> Result<Option<String>, CredentialError> {
        let Some(id) = reference else {
            return Ok(None);
        };
        match self.secrets.get(id).await {
            Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
            Ok(_) | Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Current access token: primary reference first, legacy reference second.
    async fn stored_token(&self, integration: &Integration) -> Result<String, CredentialError> {
        if let Some(token) = self.read_secret(integration.access_token_ref).await? {
            return Ok(token);
        }
        if let Some(token) = self.read_secret(integration.legacy_access_token_ref).await? {
            tracing::debug!(integration_id = %integration.id, "using legacy token reference");
            return Ok(token);
        }
        Err(CredentialError::CredentialNotFound {
            integration_id: integration.id,
        })
    }

    async fn cached(&self, integration: &Integration) -> Result<ResolvedCredential, CredentialError> {
        let access_token = self.stored_token(integration).await?;
        // Token-mode integrations keep the request-signing secret (Naver)
        // under the client secret reference.
        let api_secret = match integration.integration_type {
            IntegrationType::Token => self.read_secret(integration.client_secret_ref).await?,
            IntegrationType::OAuth => None,
        };
        Ok(ResolvedCredential {
            credential: PlatformCredential {
                access_token,
                account_id: integration.account_id.clone(),
                api_secret,
            },
            token_type: "Bearer",
            expires_at: integration.token_expires_at,
            refreshed: false,
        })
    }

    async fn refresh(&self, integration: &Integration) -> Result<ResolvedCredential, CredentialError> {
        let platform = integration.platform;
        let missing_client = || CredentialError::MissingClientCredentials {
            integration_id: integration.id,
        };

        // Platforms without refresh tokens re-exchange the current token.
        let refresh_input = match self.read_secret(integration.refresh_token_ref).await? {
            Some(token) => token,
            None => self.stored_token(integration).await?,
        };
        let client_id = integration.client_id.as_deref().ok_or_else(missing_client)?;
        let client_secret = self
            .read_secret(integration.client_secret_ref)
            .await?
            .ok_or_else(missing_client)?;

        let Some(adapter) = self.adapters.get(platform) else {
            return Err(CredentialError::RefreshFailed {
                platform,
                cause: "no adapter registered".to_string(),
            });
        };

        let grant = match adapter.refresh(&refresh_input, client_id, &client_secret).await {
            Ok(grant) => grant,
            Err(e) if e.is_transient() && !e.is_credential_rejection() => {
                let cause = e.to_string();
                tracing::warn!(
                    integration_id = %integration.id,
                    %platform,
                    error = %cause,
                    "token refresh failed transiently; integration left active"
                );
                return Err(CredentialError::RefreshFailed { platform, cause });
            }
            Err(e) => {
                let cause = e.to_string();
                tracing::warn!(
                    integration_id = %integration.id,
                    %platform,
                    error = %cause,
                    "token refresh rejected; marking integration expired"
                );
                if let Err(mark_err) = self
                    .collections
                    .mark_integration_status(
                        integration.id,
                        IntegrationStatus::Expired,
                        Some(&format!("token refresh failed: {cause}")),
                    )
                    .await
                {
                    tracing::error!(
                        integration_id = %integration.id,
                        error = %mark_err,
                        "failed to mark integration expired"
                    );
                }
                return Err(CredentialError::RefreshFailed { platform, cause });
            }
        };

        let now = Utc::now();
        let expires_at = grant
            .expires_in
            .map(|secs| now + chrono::Duration::seconds(secs));
        let new_ref = self
            .secrets
            .put(
                &grant.access_token,
                &format!("{platform} access token for integration {}", integration.id),
            )
            .await?;
        self.collections
            .update_access_token(integration.id, new_ref, expires_at)
            .await?;

        if let Some(old_ref) = integration.access_token_ref.filter(|old| *old != new_ref) {
            if let Err(e) = self.secrets.delete(old_ref).await {
                tracing::warn!(
                    integration_id = %integration.id,
                    error = %e,
                    "failed to delete superseded access token secret"
                );
            }
        }

        tracing::info!(
            integration_id = %integration.id,
            %platform,
            expires_at = ?expires_at,
            "access token refreshed"
        );

        Ok(ResolvedCredential {
            credential: PlatformCredential {
                access_token: grant.access_token,
                account_id: integration.account_id.clone(),
                api_secret: None,
            },
            token_type: "Bearer",
            expires_at,
            refreshed: true,
        })
    }
}
