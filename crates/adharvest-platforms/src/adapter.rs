use std::collections::HashMap;
use std::sync::Arc;

use adharvest_core::{CollectionType, DateRange, MetricRow, Platform, PlatformRegistry};
use async_trait::async_trait;

use crate::error::PlatformError;
use crate::google::GoogleAdsAdapter;
use crate::meta::MetaAdsAdapter;
use crate::naver::NaverAdsAdapter;
use crate::types::{AuthorizationRequest, CodeExchange, HttpSettings, PlatformCredential, TokenGrant};

/// One advertising platform's API, as seen by the collector.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetches every row of `collection_type` for `range`.
    async fn fetch_chunk(
        &self,
        credential: &PlatformCredential,
        range: DateRange,
        collection_type: CollectionType,
    ) -> Result<Vec<MetricRow>, PlatformError>;

    /// Trades `refresh_input` for a new access token.
    ///
    /// `refresh_input` is the refresh token for platforms that issue one, or
    /// the current long-lived token for platforms that re-exchange it.
    async fn refresh(
        &self,
        _refresh_input: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<TokenGrant, PlatformError> {
        Err(PlatformError::Unsupported {
            platform: self.platform(),
            operation: "token refresh",
        })
    }

    /// Whether the authorization flow uses a PKCE verifier.
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Browser URL that starts an OAuth authorization.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Unsupported`] for platforms without OAuth.
    fn authorization_url(&self, _request: &AuthorizationRequest<'_>) -> Result<String, PlatformError> {
        Err(PlatformError::Unsupported {
            platform: self.platform(),
            operation: "oauth authorization",
        })
    }

    /// Exchanges an authorization code for tokens usable by
    /// [`PlatformAdapter::fetch_chunk`].
    async fn exchange_code(&self, _exchange: &CodeExchange<'_>) -> Result<TokenGrant, PlatformError> {
        Err(PlatformError::Unsupported {
            platform: self.platform(),
            operation: "oauth code exchange",
        })
    }
}

/// Lookup table of adapters by platform.
#[derive(Clone, Default)]
pub struct PlatformAdapters {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl PlatformAdapters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter`, replacing any adapter for the same platform.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    /// Adapters for every platform pointed at the production APIs, using the
    /// API versions from `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Http`] if an HTTP client cannot be built.
    pub fn production(
        settings: &HttpSettings,
        registry: &PlatformRegistry,
        google_developer_token: Option<&str>,
    ) -> Result<Self, PlatformError> {
        let version = |platform: Platform| {
            registry
                .get(platform)
                .and_then(|c| c.api_version.clone())
        };

        let google = GoogleAdsAdapter::new(
            settings,
            google_developer_token.unwrap_or_default(),
            version(Platform::Google).as_deref(),
        )?;
        let meta = MetaAdsAdapter::new(settings, version(Platform::Meta).as_deref())?;
        let naver = NaverAdsAdapter::new(settings)?;

        Ok(Self::new()
            .with(Arc::new(google))
            .with(Arc::new(meta))
            .with(Arc::new(naver)))
    }
}

impl std::fmt::Debug for PlatformAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformAdapters")
            .field("platforms", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
