//! Naver Search Ads API adapter.
//!
//! Naver uses static API keys instead of OAuth: the credential's
//! `access_token` is the API key, `account_id` the customer id and
//! `api_secret` the secret key every request is signed with.

use adharvest_core::{CollectionType, DateRange, MetricRow, Platform};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{NaiveDate, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::adapter::PlatformAdapter;
use crate::error::PlatformError;
use crate::http::{build_client, decode, join, parse_base_url, read_json, str_at};
use crate::types::{HttpSettings, PlatformCredential};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE: &str = "https://api.searchad.naver.com";
const STAT_FIELDS: &str = r#"["impCnt","clkCnt","salesAmt","ctr","cpc","ccnt"]"#;
/// Campaign ids per `/stats` request.
const IDS_PER_REQUEST: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Campaign {
    ncc_campaign_id: String,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// Signing inputs pulled out of a credential.
struct NaverKeys<'a> {
    api_key: &'a str,
    customer_id: &'a str,
    secret: &'a str,
}

impl<'a> NaverKeys<'a> {
    fn from_credential(credential: &'a PlatformCredential) -> Result<Self, PlatformError> {
        let customer_id = credential
            .account_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(PlatformError::MissingAccountId {
                platform: Platform::Naver,
            })?;
        let secret = credential
            .api_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(PlatformError::MissingApiSecret {
                platform: Platform::Naver,
            })?;
        Ok(Self {
            api_key: &credential.access_token,
            customer_id,
            secret,
        })
    }
}

/// `X-Signature` value: base64 HMAC-SHA256 over `"{timestamp}.{METHOD}.{path}"`.
pub(crate) fn sign(
    secret: &str,
    timestamp: &str,
    method: &Method,
    path: &str,
) -> Result<String, PlatformError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PlatformError::Signing(e.to_string()))?;
    mac.update(format!("{timestamp}.{}.{path}", method.as_str()).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct NaverAdsAdapter {
    client: Client,
    api_base: Url,
}

impl NaverAdsAdapter {
    /// # Errors
    ///
    /// Returns [`PlatformError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, PlatformError> {
        Self::with_base_url(settings, DEFAULT_API_BASE)
    }

    /// Creates an adapter with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(settings: &HttpSettings, base_url: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings)?,
            api_base: parse_base_url(base_url)?,
        })
    }

    async fn signed_get(
        &self,
        keys: &NaverKeys<'_>,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<Value, PlatformError> {
        let url = join(&self.api_base, path)?;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign(keys.secret, &timestamp, &Method::GET, url.path())?;

        let response = self
            .client
            .get(url)
            .query(query)
            .header("X-Timestamp", &timestamp)
            .header("X-API-KEY", keys.api_key)
            .header("X-Customer", keys.customer_id)
            .header("X-Signature", signature)
            .send()
            .await?;
        read_json(Platform::Naver, response, context, &[]).await
    }
}

#[async_trait]
impl PlatformAdapter for NaverAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::Naver
    }

    async fn fetch_chunk(
        &self,
        credential: &PlatformCredential,
        range: DateRange,
        collection_type: CollectionType,
    ) -> Result<Vec<MetricRow>, PlatformError> {
        if collection_type != CollectionType::Ads {
            return Err(PlatformError::UnsupportedCollection {
                platform: Platform::Naver,
                collection_type,
            });
        }
        let keys = NaverKeys::from_credential(credential)?;
        let context = format!("stats(customer={}, {range})", keys.customer_id);

        let body = self
            .signed_get(&keys, "ncc/campaigns", &[], "naver campaigns")
            .await?;
        let campaigns: Vec<Campaign> = decode(body, "naver campaigns")?;
        if campaigns.is_empty() {
            return Ok(Vec::new());
        }

        let time_range = serde_json::json!({
            "since": range.start.format("%Y-%m-%d").to_string(),
            "until": range.end.format("%Y-%m-%d").to_string(),
        })
        .to_string();

        let mut rows = Vec::new();
        for batch in campaigns.chunks(IDS_PER_REQUEST) {
            let ids = batch
                .iter()
                .map(|c| c.ncc_campaign_id.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let body = self
                .signed_get(
                    &keys,
                    "stats",
                    &[
                        ("ids", ids.as_str()),
                        ("fields", STAT_FIELDS),
                        ("timeRange", time_range.as_str()),
                        ("timeIncrement", "1"),
                    ],
                    &context,
                )
                .await?;
            let stats: StatsResponse = decode(body, &context)?;
            rows.extend(stats.data.into_iter().filter_map(|item| {
                let id = str_at(&item, &["id"])?;
                let metric_date = str_at(&item, &["dateStart"])
                    .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
                    .unwrap_or(range.start);
                Some(MetricRow {
                    metric_date,
                    entity_id: id,
                    payload: item,
                })
            }));
        }
        Ok(rows)
    }
}
