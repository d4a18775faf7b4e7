//! Contract tests for `GoogleAdsAdapter` against wiremock.

use adharvest_core::{CollectionType, DateRange};
use adharvest_platforms::{
    CodeExchange, GoogleAdsAdapter, HttpSettings, PlatformAdapter, PlatformCredential,
    PlatformError,
};
use chrono::NaiveDate;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> GoogleAdsAdapter {
    GoogleAdsAdapter::with_base_urls(
        &HttpSettings::default(),
        "dev-token",
        Some("v18"),
        &server.uri(),
        &format!("{}/token", server.uri()),
        &format!("{}/auth", server.uri()),
    )
    .expect("adapter construction should not fail")
}

fn credential() -> PlatformCredential {
    PlatformCredential {
        access_token: "ya29.access".to_string(),
        account_id: Some("123-456-7890".to_string()),
        api_secret: None,
    }
}

fn range() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn search_stream_rows_become_metric_rows() {
    let server = MockServer::start().await;
    let body = serde_json::json!([
        {
            "results": [
                { "segments": { "date": "2024-01-01" }, "adGroupAd": { "ad": { "id": "111" } }, "metrics": { "clicks": "4" } },
                { "segments": { "date": "2024-01-02" }, "adGroupAd": { "ad": { "id": "111" } }, "metrics": { "clicks": "9" } }
            ]
        },
        { "results": [ { "segments": { "date": "2024-01-02" }, "adGroupAd": { "ad": { "id": "222" } } } ] }
    ]);

    Mock::given(method("POST"))
        .and(path("/v18/customers/1234567890/googleAds:searchStream"))
        .and(header("authorization", "Bearer ya29.access"))
        .and(header("developer-token", "dev-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let rows = adapter(&server)
        .fetch_chunk(&credential(), range(), CollectionType::Ads)
        .await
        .expect("fetch should succeed");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].entity_id, "111");
    assert_eq!(rows[1].metric_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    assert_eq!(rows[2].entity_id, "222");
    assert_eq!(rows[1].payload["metrics"]["clicks"], "9");
}

#[tokio::test]
async fn rate_limit_status_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "code": 429, "message": "Resource has been exhausted" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .fetch_chunk(&credential(), range(), CollectionType::Ads)
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::RateLimited { .. }), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn missing_customer_id_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut credential = credential();
    credential.account_id = None;
    let err = adapter(&server)
        .fetch_chunk(&credential, range(), CollectionType::Ads)
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::MissingAccountId { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn refresh_uses_refresh_token_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.new",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = adapter(&server)
        .refresh("1//refresh", "client-id", "client-secret")
        .await
        .expect("refresh should succeed");

    assert_eq!(grant.access_token, "ya29.new");
    assert_eq!(grant.expires_in, Some(3599));
    assert!(grant.refresh_token.is_none());
}

#[tokio::test]
async fn rejected_refresh_carries_oauth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .refresh("revoked", "client-id", "client-secret")
        .await
        .unwrap_err();
    match err {
        PlatformError::Api { status, message, .. } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("invalid_grant"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn code_exchange_sends_pkce_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code_verifier=verifier123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.first",
            "refresh_token": "1//first-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = adapter(&server)
        .exchange_code(&CodeExchange {
            code: "auth-code",
            client_id: "cid",
            client_secret: "secret",
            redirect_uri: "http://localhost/cb",
            code_verifier: Some("verifier123"),
        })
        .await
        .expect("exchange should succeed");

    assert_eq!(grant.refresh_token.as_deref(), Some("1//first-refresh"));
}
