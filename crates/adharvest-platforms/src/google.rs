//! Google Ads API adapter.
//!
//! Reports come from `googleAds:searchStream` with a GAQL query per
//! collection type. OAuth uses the standard Google endpoints with PKCE and
//! offline access so a refresh token is always issued.

use adharvest_core::{CollectionType, DateRange, MetricRow, Platform};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::PlatformAdapter;
use crate::error::PlatformError;
use crate::http::{build_client, decode, join, parse_base_url, read_json, str_at};
use crate::types::{AuthorizationRequest, CodeExchange, HttpSettings, PlatformCredential, TokenGrant};

const DEFAULT_API_BASE: &str = "https://googleads.googleapis.com";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_API_VERSION: &str = "v18";

/// Token endpoint response shared by the refresh and code grants.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl From<GoogleTokenResponse> for TokenGrant {
    fn from(r: GoogleTokenResponse) -> Self {
        TokenGrant {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            expires_in: r.expires_in,
        }
    }
}

/// One element of the `searchStream` response array.
#[derive(Debug, Deserialize)]
struct SearchStreamBatch {
    #[serde(default)]
    results: Vec<Value>,
}

pub struct GoogleAdsAdapter {
    client: Client,
    api_base: Url,
    token_url: Url,
    auth_url: Url,
    api_version: String,
    developer_token: String,
}

impl GoogleAdsAdapter {
    /// Creates an adapter pointed at the production Google endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Http`] if the HTTP client cannot be built.
    pub fn new(
        settings: &HttpSettings,
        developer_token: &str,
        api_version: Option<&str>,
    ) -> Result<Self, PlatformError> {
        Self::with_base_urls(
            settings,
            developer_token,
            api_version,
            DEFAULT_API_BASE,
            DEFAULT_TOKEN_URL,
            DEFAULT_AUTH_URL,
        )
    }

    /// Creates an adapter with custom endpoints (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidBaseUrl`] if any URL does not parse.
    pub fn with_base_urls(
        settings: &HttpSettings,
        developer_token: &str,
        api_version: Option<&str>,
        api_base: &str,
        token_url: &str,
        auth_url: &str,
    ) -> Result<Self, PlatformError> {
        let parse = |url: &str| {
            Url::parse(url).map_err(|e| PlatformError::InvalidBaseUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
        };

        Ok(Self {
            client: build_client(settings)?,
            api_base: parse_base_url(api_base)?,
            token_url: parse(token_url)?,
            auth_url: parse(auth_url)?,
            api_version: api_version.unwrap_or(DEFAULT_API_VERSION).to_string(),
            developer_token: developer_token.to_string(),
        })
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        context: &str,
    ) -> Result<TokenGrant, PlatformError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .form(form)
            .send()
            .await?;
        let body = read_json(Platform::Google, response, context, &[]).await?;
        let token: GoogleTokenResponse = decode(body, context)?;
        Ok(token.into())
    }
}

/// GAQL query and the entity-id extractor for one collection type.
fn build_query(range: DateRange, collection_type: CollectionType) -> String {
    let between = format!(
        "segments.date BETWEEN '{}' AND '{}'",
        range.start.format("%Y-%m-%d"),
        range.end.format("%Y-%m-%d")
    );
    match collection_type {
        CollectionType::Ads => format!(
            "SELECT segments.date, campaign.id, ad_group.id, ad_group_ad.ad.id, \
             metrics.impressions, metrics.clicks, metrics.cost_micros, metrics.conversions \
             FROM ad_group_ad WHERE {between}"
        ),
        CollectionType::Demographics => format!(
            "SELECT segments.date, ad_group.id, ad_group_criterion.criterion_id, \
             ad_group_criterion.age_range.type, metrics.impressions, metrics.clicks, \
             metrics.cost_micros FROM age_range_view WHERE {between}"
        ),
        CollectionType::Creatives => "SELECT ad_group_ad.ad.id, ad_group_ad.ad.name, \
             ad_group_ad.ad.type, ad_group_ad.ad.final_urls, ad_group_ad.status \
             FROM ad_group_ad"
            .to_string(),
    }
}

fn entity_id(result: &Value, collection_type: CollectionType) -> Option<String> {
    match collection_type {
        CollectionType::Ads | CollectionType::Creatives => {
            str_at(result, &["adGroupAd", "ad", "id"])
        }
        CollectionType::Demographics => {
            let ad_group = str_at(result, &["adGroup", "id"])?;
            let criterion = str_at(result, &["adGroupCriterion", "criterionId"])?;
            Some(format!("{ad_group}:{criterion}"))
        }
    }
}

/// Google expects the customer id without dashes.
fn customer_id(credential: &PlatformCredential) -> Result<String, PlatformError> {
    let raw = credential
        .account_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(PlatformError::MissingAccountId {
            platform: Platform::Google,
        })?;
    Ok(raw.chars().filter(char::is_ascii_digit).collect())
}

#[async_trait]
impl PlatformAdapter for GoogleAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    async fn fetch_chunk(
        &self,
        credential: &PlatformCredential,
        range: DateRange,
        collection_type: CollectionType,
    ) -> Result<Vec<MetricRow>, PlatformError> {
        let customer = customer_id(credential)?;
        let url = join(
            &self.api_base,
            &format!(
                "{}/customers/{customer}/googleAds:searchStream",
                self.api_version
            ),
        )?;
        let context = format!("searchStream(customer={customer}, {collection_type}, {range})");

        let response = self
            .client
            .post(url)
            .bearer_auth(&credential.access_token)
            .header("developer-token", &self.developer_token)
            .json(&serde_json::json!({ "query": build_query(range, collection_type) }))
            .send()
            .await?;
        let body = read_json(Platform::Google, response, &context, &[]).await?;
        let batches: Vec<SearchStreamBatch> = decode(body, &context)?;

        let mut rows = Vec::new();
        for result in batches.into_iter().flat_map(|b| b.results) {
            let Some(entity) = entity_id(&result, collection_type) else {
                tracing::debug!(%context, "skipping searchStream row without entity id");
                continue;
            };
            let metric_date = str_at(&result, &["segments", "date"])
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
                .unwrap_or(range.end);
            rows.push(MetricRow {
                metric_date,
                entity_id: entity,
                payload: result,
            });
        }
        Ok(rows)
    }

    async fn refresh(
        &self,
        refresh_input: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenGrant, PlatformError> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_input),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
            "google refresh_token grant",
        )
        .await
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<String, PlatformError> {
        let mut url = self.auth_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", request.client_id)
                .append_pair("redirect_uri", request.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &request.scopes.join(" "))
                .append_pair("state", request.state)
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent");
            if let Some(challenge) = request.code_challenge {
                pairs
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(url.into())
    }

    async fn exchange_code(&self, exchange: &CodeExchange<'_>) -> Result<TokenGrant, PlatformError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", exchange.code),
            ("client_id", exchange.client_id),
            ("client_secret", exchange.client_secret),
            ("redirect_uri", exchange.redirect_uri),
        ];
        if let Some(verifier) = exchange.code_verifier {
            form.push(("code_verifier", verifier));
        }
        self.token_request(&form, "google authorization_code grant")
            .await
    }
}
