//! Fixtures shared by the collector's unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use adharvest_core::{
    CollectionType, DataCollectionStatus, DateRange, Integration, IntegrationStatus,
    IntegrationType, MetricRow, Platform, PlatformRegistry,
};
use adharvest_platforms::{
    AuthorizationRequest, CodeExchange, PlatformAdapter, PlatformAdapters, PlatformCredential,
    PlatformError, TokenGrant,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::context::{CollectorContext, CollectorSettings};
use crate::store::{MemoryStore, Stores};

const REGISTRY: &str = r"
platforms:
  - platform: google
    display_name: Google Ads
    chunk_size_days: 30
    max_retry_attempts: 3
    oauth_enabled: true
    oauth_scopes: [https://www.googleapis.com/auth/adwords]
  - platform: meta
    display_name: Meta Ads
    chunk_size_days: 7
    max_retry_attempts: 3
    oauth_enabled: true
    oauth_scopes: [ads_read]
  - platform: naver
    display_name: Naver Search Ads
    chunk_size_days: 31
    max_retry_attempts: 3
";

pub(crate) fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

pub(crate) fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(date(start), date(end)).expect("valid range")
}

pub(crate) fn registry() -> PlatformRegistry {
    adharvest_core::parse_platforms(REGISTRY).expect("test registry parses")
}

/// Active token-mode integration with no secrets attached.
pub(crate) fn integration(platform: Platform) -> Integration {
    let now = Utc::now();
    Integration {
        id: Uuid::new_v4(),
        advertiser_id: Uuid::new_v4(),
        platform,
        integration_type: IntegrationType::Token,
        status: IntegrationStatus::Active,
        data_collection_status: DataCollectionStatus::Idle,
        account_id: Some("acct-1".to_string()),
        client_id: None,
        access_token_ref: None,
        legacy_access_token_ref: None,
        refresh_token_ref: None,
        client_secret_ref: None,
        token_expires_at: None,
        last_error: None,
        last_synced_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn settings() -> CollectorSettings {
    CollectorSettings {
        batch_size: 10,
        chunk_timeout: Duration::from_secs(5),
        backoff_base: Duration::ZERO,
        oauth_redirect_uri: "https://api.test/oauth/callback".to_string(),
        ..CollectorSettings::default()
    }
}

pub(crate) fn context(
    store: &Arc<MemoryStore>,
    adapters: Vec<Arc<ScriptedAdapter>>,
    settings: CollectorSettings,
) -> Arc<CollectorContext> {
    let adapters = adapters
        .into_iter()
        .fold(PlatformAdapters::new(), |acc, a| acc.with(a));
    Arc::new(CollectorContext::new(
        Stores::from_shared(Arc::clone(store)),
        adapters,
        registry(),
        settings,
    ))
}

/// Token-mode integration with a stored API key, inserted into `store`.
pub(crate) async fn seeded_integration(store: &MemoryStore, platform: Platform) -> Integration {
    use crate::store::SecretStore;

    let key = store.put("api-key", "test").await.expect("put secret");
    let mut integration = integration(platform);
    integration.access_token_ref = Some(key);
    store.insert_integration(integration.clone());
    integration
}

fn unavailable(platform: Platform) -> PlatformError {
    PlatformError::Api {
        platform,
        status: 503,
        message: "service unavailable".to_string(),
    }
}

/// Adapter returning one row per day, with scripted failures.
pub(crate) struct ScriptedAdapter {
    platform: Platform,
    pkce: bool,
    failing_ranges: Mutex<Vec<DateRange>>,
    fail_first: AtomicU32,
    delay: Mutex<Option<Duration>>,
    refresh_grant: Mutex<Option<TokenGrant>>,
    refresh_failure_status: Mutex<u16>,
    exchange_grant: Mutex<Option<TokenGrant>>,
    fetch_calls: AtomicU32,
    fetched: Mutex<Vec<(CollectionType, DateRange)>>,
    refresh_calls: AtomicU32,
    last_refresh_input: Mutex<Option<String>>,
    last_exchange: Mutex<Option<(String, Option<String>)>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedAdapter {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            pkce: false,
            failing_ranges: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(0),
            delay: Mutex::new(None),
            refresh_grant: Mutex::new(None),
            refresh_failure_status: Mutex::new(400),
            exchange_grant: Mutex::new(None),
            fetch_calls: AtomicU32::new(0),
            fetched: Mutex::new(Vec::new()),
            refresh_calls: AtomicU32::new(0),
            last_refresh_input: Mutex::new(None),
            last_exchange: Mutex::new(None),
        }
    }

    pub(crate) fn with_pkce(mut self) -> Self {
        self.pkce = true;
        self
    }

    /// Every fetch of exactly `range` fails with a 503.
    pub(crate) fn fail_range(&self, range: DateRange) {
        lock(&self.failing_ranges).push(range);
    }

    /// The next `n` fetches fail with a 503.
    pub(crate) fn fail_first(&self, n: u32) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    /// Every fetch and code exchange sleeps this long first.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub(crate) fn set_refresh_grant(&self, access_token: &str, expires_in: i64) {
        *lock(&self.refresh_grant) = Some(TokenGrant {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_in: Some(expires_in),
        });
    }

    /// Status of the error returned while no refresh grant is set.
    pub(crate) fn fail_refresh_with(&self, status: u16) {
        *lock(&self.refresh_failure_status) = status;
    }

    pub(crate) fn set_exchange_grant(&self, grant: TokenGrant) {
        *lock(&self.exchange_grant) = Some(grant);
    }

    pub(crate) fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetched(&self) -> Vec<(CollectionType, DateRange)> {
        lock(&self.fetched).clone()
    }

    pub(crate) fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_input(&self) -> Option<String> {
        lock(&self.last_refresh_input).clone()
    }

    /// Code and PKCE verifier of the last exchange.
    pub(crate) fn last_exchange(&self) -> Option<(String, Option<String>)> {
        lock(&self.last_exchange).clone()
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_chunk(
        &self,
        _credential: &PlatformCredential,
        range: DateRange,
        collection_type: CollectionType,
    ) -> Result<Vec<MetricRow>, PlatformError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.fetched).push((collection_type, range));

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted_failure = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || lock(&self.failing_ranges).contains(&range) {
            return Err(unavailable(self.platform));
        }

        Ok(range
            .start
            .iter_days()
            .take_while(|d| *d <= range.end)
            .map(|d| MetricRow {
                metric_date: d,
                entity_id: format!("{collection_type}-1"),
                payload: serde_json::json!({ "impressions": 10 }),
            })
            .collect())
    }

    async fn refresh(
        &self,
        refresh_input: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<TokenGrant, PlatformError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_refresh_input) = Some(refresh_input.to_string());
        let grant = lock(&self.refresh_grant).clone();
        let status = *lock(&self.refresh_failure_status);
        grant.ok_or_else(|| PlatformError::Api {
            platform: self.platform,
            status,
            message: "invalid_grant".to_string(),
        })
    }

    fn uses_pkce(&self) -> bool {
        self.pkce
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<String, PlatformError> {
        Ok(format!(
            "https://auth.test/{}?client_id={}&state={}&challenge={}",
            self.platform,
            request.client_id,
            request.state,
            request.code_challenge.unwrap_or_default()
        ))
    }

    async fn exchange_code(&self, exchange: &CodeExchange<'_>) -> Result<TokenGrant, PlatformError> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *lock(&self.last_exchange) = Some((
            exchange.code.to_string(),
            exchange.code_verifier.map(str::to_string),
        ));
        let grant = lock(&self.exchange_grant).clone();
        grant.ok_or_else(|| PlatformError::Api {
            platform: self.platform,
            status: 400,
            message: "invalid_code".to_string(),
        })
    }
}
