//! Plumbing shared by the adapters: client construction, base-URL
//! normalisation and response classification.

use std::time::Duration;

use adharvest_core::Platform;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PlatformError;
use crate::types::HttpSettings;

pub(crate) fn build_client(settings: &HttpSettings) -> Result<Client, PlatformError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(settings.user_agent.clone())
        .build()?;
    Ok(client)
}

/// Parses `base` with exactly one trailing slash so `Url::join` appends to
/// its path instead of replacing the last segment.
pub(crate) fn parse_base_url(base: &str) -> Result<Url, PlatformError> {
    let normalised = format!("{}/", base.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| PlatformError::InvalidBaseUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, PlatformError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| PlatformError::InvalidBaseUrl {
            url: format!("{base}{path}"),
            reason: e.to_string(),
        })
}

/// Reads a response body as JSON, turning non-2xx statuses into
/// [`PlatformError::RateLimited`] or [`PlatformError::Api`].
///
/// `throttle_codes` lists platform error codes that mean "rate limited" even
/// when the HTTP status is a plain 400.
pub(crate) async fn read_json(
    platform: Platform,
    response: Response,
    context: &str,
    throttle_codes: &[i64],
) -> Result<Value, PlatformError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let (message, code) = extract_error(&body);
        if status == StatusCode::TOO_MANY_REQUESTS
            || code.is_some_and(|c| throttle_codes.contains(&c))
        {
            return Err(PlatformError::RateLimited { platform, message });
        }
        return Err(PlatformError::Api {
            platform,
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| PlatformError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}

/// Deserializes an already-parsed JSON body into `T`.
pub(crate) fn decode<T: DeserializeOwned>(body: Value, context: &str) -> Result<T, PlatformError> {
    serde_json::from_value(body).map_err(|e| PlatformError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}

/// Pulls a human-readable message and numeric code out of the common error
/// envelopes: `{"error": {"message", "code"}}`, `{"error": "...",
/// "error_description": "..."}` and `{"title", "detail"}`.
fn extract_error(body: &str) -> (String, Option<i64>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (truncate(body), None);
    };

    if let Some(error) = value.get("error") {
        if let Some(obj) = error.as_object() {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| truncate(body), ToOwned::to_owned);
            let code = obj.get("code").and_then(Value::as_i64);
            return (message, code);
        }
        if let Some(kind) = error.as_str() {
            let message = value
                .get("error_description")
                .and_then(Value::as_str)
                .map_or_else(|| kind.to_string(), |d| format!("{kind}: {d}"));
            return (message, None);
        }
    }

    if let Some(detail) = value.get("detail").and_then(Value::as_str) {
        let code = value.get("code").and_then(Value::as_i64);
        return (detail.to_string(), code);
    }

    (truncate(body), None)
}

fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Walks `path` through nested objects and returns the string (or number)
/// found there.
pub(crate) fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_graph_style_error() {
        let (message, code) =
            extract_error(r#"{"error":{"message":"User request limit reached","code":17}}"#);
        assert_eq!(message, "User request limit reached");
        assert_eq!(code, Some(17));
    }

    #[test]
    fn extracts_oauth_style_error() {
        let (message, code) =
            extract_error(r#"{"error":"invalid_grant","error_description":"Token has been revoked"}"#);
        assert_eq!(message, "invalid_grant: Token has been revoked");
        assert_eq!(code, None);
    }

    #[test]
    fn non_json_error_body_is_truncated() {
        let body = "x".repeat(1000);
        let (message, _) = extract_error(&body);
        assert!(message.len() < 400);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn base_url_gets_single_trailing_slash() {
        let url = parse_base_url("http://localhost:1234//").unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/");
        let joined = join(&url, "/v18/customers/1").unwrap();
        assert_eq!(joined.as_str(), "http://localhost:1234/v18/customers/1");
    }

    #[test]
    fn str_at_reads_strings_and_numbers() {
        let value = json!({ "adGroupAd": { "ad": { "id": 42 } }, "segments": { "date": "2024-01-01" } });
        assert_eq!(str_at(&value, &["adGroupAd", "ad", "id"]).as_deref(), Some("42"));
        assert_eq!(str_at(&value, &["segments", "date"]).as_deref(), Some("2024-01-01"));
        assert_eq!(str_at(&value, &["missing"]), None);
    }
}
