use std::sync::Arc;
use std::time::Duration;

use adharvest_core::{AppConfig, Integration, Platform, PlatformConfig, PlatformRegistry};
use adharvest_platforms::{PlatformAdapter, PlatformAdapters};
use uuid::Uuid;

use crate::credentials::CredentialResolver;
use crate::error::CollectError;
use crate::store::{StoreError, Stores};

/// Tunables for the collection core.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Chunks claimed per queue worker invocation.
    pub batch_size: usize,
    /// Deadline for one chunk attempt.
    pub chunk_timeout: Duration,
    /// Extra lease time on top of `chunk_timeout`.
    pub lease_grace: Duration,
    /// First retry delay on the direct path; doubles per attempt.
    pub backoff_base: Duration,
    /// OAuth tokens expiring within this window are refreshed.
    pub refresh_window: chrono::Duration,
    pub oauth_redirect_uri: String,
    pub session_ttl: chrono::Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            chunk_timeout: Duration::from_secs(600),
            lease_grace: Duration::from_secs(60),
            backoff_base: Duration::from_secs(1),
            refresh_window: chrono::Duration::minutes(5),
            oauth_redirect_uri: "http://localhost:3000/api/v1/oauth/callback".to_string(),
            session_ttl: chrono::Duration::minutes(15),
        }
    }
}

impl CollectorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.worker_batch_size,
            chunk_timeout: Duration::from_secs(config.worker_chunk_timeout_secs),
            oauth_redirect_uri: config.oauth_redirect_uri.clone(),
            ..Self::default()
        }
    }
}

/// Everything the collection operations share, built once at startup.
#[derive(Debug)]
pub struct CollectorContext {
    stores: Stores,
    adapters: PlatformAdapters,
    platforms: PlatformRegistry,
    settings: CollectorSettings,
    credentials: CredentialResolver,
}

impl CollectorContext {
    #[must_use]
    pub fn new(
        stores: Stores,
        adapters: PlatformAdapters,
        platforms: PlatformRegistry,
        settings: CollectorSettings,
    ) -> Self {
        let credentials = CredentialResolver::new(
            Arc::clone(&stores.collections),
            Arc::clone(&stores.secrets),
            adapters.clone(),
            settings.refresh_window,
        );
        Self {
            stores,
            adapters,
            platforms,
            settings,
            credentials,
        }
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    #[must_use]
    pub fn adapters(&self) -> &PlatformAdapters {
        &self.adapters
    }

    #[must_use]
    pub fn platforms(&self) -> &PlatformRegistry {
        &self.platforms
    }

    #[must_use]
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    pub(crate) fn platform_config(&self, platform: Platform) -> Result<&PlatformConfig, CollectError> {
        self.platforms
            .get(platform)
            .ok_or_else(|| CollectError::Config(format!("no platform config for {platform}")))
    }

    pub(crate) fn adapter(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>, CollectError> {
        self.adapters
            .get(platform)
            .ok_or_else(|| CollectError::Config(format!("no adapter registered for {platform}")))
    }

    /// Live integration, with a missing one reported as a config error.
    pub(crate) async fn load_integration(&self, id: Uuid) -> Result<Integration, CollectError> {
        match self.stores.collections.get_integration(id).await {
            Ok(integration) => Ok(integration),
            Err(StoreError::NotFound) => {
                Err(CollectError::Config(format!("integration {id} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
