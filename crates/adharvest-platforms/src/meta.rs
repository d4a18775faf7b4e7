//! Meta Marketing API (Graph API) adapter.
//!
//! Ads and demographics come from the ad-account `insights` edge with
//! `time_increment=1`, creatives from `adcreatives`. Both are cursor-paged
//! through `paging.next`. Meta issues no refresh tokens: a long-lived token
//! is re-exchanged through `fb_exchange_token` before it expires.

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

const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com";
const DEFAULT_DIALOG_BASE: &str = "https://www.facebook.com";
const DEFAULT_API_VERSION: &str = "v21.0";

/// Graph error codes that signal throttling on an HTTP 400.
const THROTTLE_CODES: &[i64] = &[4, 17, 32, 613, 80004];

const PAGE_LIMIT: u32 = 500;
/// Upper bound on followed `paging.next` links for one chunk.
const MAX_PAGES: usize = 200;

const AD_FIELDS: &str = "ad_id,ad_name,adset_id,campaign_id,impressions,clicks,spend,reach,actions";
const CREATIVE_FIELDS: &str = "id,name,title,body,object_type,thumbnail_url,status";

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl From<GraphTokenResponse> for TokenGrant {
    fn from(r: GraphTokenResponse) -> Self {
        TokenGrant {
            access_token: r.access_token,
            refresh_token: None,
            expires_in: r.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphPage {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    paging: Option<GraphPaging>,
}

#[derive(Debug, Deserialize)]
struct GraphPaging {
    #[serde(default)]
    next: Option<String>,
}

pub struct MetaAdsAdapter {
    client: Client,
    graph_base: Url,
    dialog_base: Url,
    api_version: String,
}

impl MetaAdsAdapter {
    /// # Errors
    ///
    /// Returns [`PlatformError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings, api_version: Option<&str>) -> Result<Self, PlatformError> {
        Self::with_base_urls(settings, api_version, DEFAULT_GRAPH_BASE, DEFAULT_DIALOG_BASE)
    }

    /// Creates an adapter with custom endpoints (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidBaseUrl`] if a base URL does not parse.
    pub fn with_base_urls(
        settings: &HttpSettings,
        api_version: Option<&str>,
        graph_base: &str,
        dialog_base: &str,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            client: build_client(settings)?,
            graph_base: parse_base_url(graph_base)?,
            dialog_base: parse_base_url(dialog_base)?,
            api_version: api_version.unwrap_or(DEFAULT_API_VERSION).to_string(),
        })
    }

    fn edge_url(&self, account_id: &str, edge: &str) -> Result<Url, PlatformError> {
        join(
            &self.graph_base,
            &format!("{}/act_{account_id}/{edge}", self.api_version),
        )
    }

    /// Follows `paging.next` until exhausted and returns every `data` item.
    async fn collect_pages(
        &self,
        first: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Vec<Value>, PlatformError> {
        let mut items = Vec::new();
        let mut request = first;

        for page_number in 1..=MAX_PAGES {
            let response = request.send().await?;
            let body = read_json(Platform::Meta, response, context, THROTTLE_CODES).await?;
            let page: GraphPage = decode(body, context)?;
            items.extend(page.data);

            let Some(next) = page.paging.and_then(|p| p.next) else {
                return Ok(items);
            };
            if page_number == MAX_PAGES {
                tracing::warn!(%context, pages = MAX_PAGES, "page cap reached; truncating");
                break;
            }
            let next = Url::parse(&next).map_err(|e| PlatformError::UnexpectedResponse {
                platform: Platform::Meta,
                detail: format!("invalid paging.next URL: {e}"),
            })?;
            request = self.client.get(next);
        }

        Ok(items)
    }

    async fn token_request(
        &self,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<TokenGrant, PlatformError> {
        let url = join(
            &self.graph_base,
            &format!("{}/oauth/access_token", self.api_version),
        )?;
        let response = self.client.get(url).query(query).send().await?;
        let body = read_json(Platform::Meta, response, context, THROTTLE_CODES).await?;
        let token: GraphTokenResponse = decode(body, context)?;
        Ok(token.into())
    }
}

fn account_id(credential: &PlatformCredential) -> Result<&str, PlatformError> {
    let raw = credential
        .account_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(PlatformError::MissingAccountId {
            platform: Platform::Meta,
        })?;
    Ok(raw.strip_prefix("act_").unwrap_or(raw))
}

fn time_range(range: DateRange) -> String {
    serde_json::json!({
        "since": range.start.format("%Y-%m-%d").to_string(),
        "until": range.end.format("%Y-%m-%d").to_string(),
    })
    .to_string()
}

/// Converts one insights row. Demographic rows are keyed per breakdown cell.
fn insights_row(item: Value, collection_type: CollectionType, range: DateRange) -> Option<MetricRow> {
    let ad_id = str_at(&item, &["ad_id"])?;
    let entity_id = match collection_type {
        CollectionType::Demographics => {
            let age = str_at(&item, &["age"]).unwrap_or_else(|| "unknown".to_string());
            let gender = str_at(&item, &["gender"]).unwrap_or_else(|| "unknown".to_string());
            format!("{ad_id}:{age}:{gender}")
        }
        _ => ad_id,
    };
    let metric_date = str_at(&item, &["date_start"])
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        .unwrap_or(range.start);
    Some(MetricRow {
        metric_date,
        entity_id,
        payload: item,
    })
}

#[async_trait]
impl PlatformAdapter for MetaAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::Meta
    }

    async fn fetch_chunk(
        &self,
        credential: &PlatformCredential,
        range: DateRange,
        collection_type: CollectionType,
    ) -> Result<Vec<MetricRow>, PlatformError> {
        let account = account_id(credential)?;
        let context = format!("insights(act_{account}, {collection_type}, {range})");
        let limit = PAGE_LIMIT.to_string();

        if collection_type == CollectionType::Creatives {
            let request = self
                .client
                .get(self.edge_url(account, "adcreatives")?)
                .query(&[
                    ("fields", CREATIVE_FIELDS),
                    ("limit", limit.as_str()),
                    ("access_token", credential.access_token.as_str()),
                ]);
            let items = self.collect_pages(request, &context).await?;
            return Ok(items
                .into_iter()
                .filter_map(|item| {
                    let id = str_at(&item, &["id"])?;
                    Some(MetricRow {
                        metric_date: range.end,
                        entity_id: id,
                        payload: item,
                    })
                })
                .collect());
        }

        let time_range = time_range(range);
        let mut query = vec![
            ("level", "ad"),
            ("time_increment", "1"),
            ("time_range", time_range.as_str()),
            ("fields", AD_FIELDS),
            ("limit", limit.as_str()),
            ("access_token", credential.access_token.as_str()),
        ];
        if collection_type == CollectionType::Demographics {
            query.push(("breakdowns", "age,gender"));
        }

        let request = self
            .client
            .get(self.edge_url(account, "insights")?)
            .query(&query);
        let items = self.collect_pages(request, &context).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| insights_row(item, collection_type, range))
            .collect())
    }

    async fn refresh(
        &self,
        refresh_input: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenGrant, PlatformError> {
        self.token_request(
            &[
                ("grant_type", "fb_exchange_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("fb_exchange_token", refresh_input),
            ],
            "meta fb_exchange_token",
        )
        .await
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<String, PlatformError> {
        let mut url = join(
            &self.dialog_base,
            &format!("{}/dialog/oauth", self.api_version),
        )?;
        url.query_pairs_mut()
            .append_pair("client_id", request.client_id)
            .append_pair("redirect_uri", request.redirect_uri)
            .append_pair("state", request.state)
            .append_pair("response_type", "code")
            .append_pair("scope", &request.scopes.join(","));
        Ok(url.into())
    }

    /// Exchanges the code for a short-lived token, then upgrades it to a
    /// long-lived one.
    async fn exchange_code(&self, exchange: &CodeExchange<'_>) -> Result<TokenGrant, PlatformError> {
        let short = self
            .token_request(
                &[
                    ("client_id", exchange.client_id),
                    ("client_secret", exchange.client_secret),
                    ("redirect_uri", exchange.redirect_uri),
                    ("code", exchange.code),
                ],
                "meta code exchange",
            )
            .await?;
        self.refresh(&short.access_token, exchange.client_id, exchange.client_secret)
            .await
    }
}
