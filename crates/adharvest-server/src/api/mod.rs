mod collect;
mod jobs;
mod oauth;
mod tokens;

use std::sync::Arc;
use std::time::Duration;

use adharvest_collector::{CollectError, CollectorContext, CredentialError, OAuthError, StoreError};
use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<CollectorContext>,
    /// `None` when running against an in-process store.
    pub pool: Option<PgPool>,
    /// Where the OAuth callback sends the browser once it is done.
    pub app_redirect_url: Url,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request"
            | "validation_error"
            | "oauth_disabled"
            | "missing_client_credentials"
            | "missing_parameters" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "credential_error" => StatusCode::UNPROCESSABLE_ENTITY,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "platform_error"
            | "refresh_failed"
            | "token_exchange_failed"
            | "authorization_url_failed" => StatusCode::BAD_GATEWAY,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_store_error(request_id: String, error: &StoreError) -> ApiError {
    match error {
        StoreError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        StoreError::Conflict(message) => ApiError::new(request_id, "conflict", message.clone()),
        StoreError::Db(e) => {
            tracing::error!(error = %e, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn map_credential_error(request_id: String, error: &CredentialError) -> ApiError {
    match error {
        CredentialError::IntegrationNotFound(_) => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        CredentialError::CredentialNotFound { .. }
        | CredentialError::MissingClientCredentials { .. } => {
            ApiError::new(request_id, "credential_error", error.to_string())
        }
        CredentialError::RefreshFailed { .. } => {
            ApiError::new(request_id, "refresh_failed", error.to_string())
        }
        CredentialError::Store(e) => map_store_error(request_id, e),
    }
}

pub(super) fn map_collect_error(request_id: String, error: &CollectError) -> ApiError {
    match error {
        CollectError::Config(message) => ApiError::new(request_id, "validation_error", message.clone()),
        CollectError::Credential(e) => map_credential_error(request_id, e),
        CollectError::Platform(e) => ApiError::new(request_id, "platform_error", e.to_string()),
        CollectError::Timeout(_) => ApiError::new(request_id, "timeout", error.to_string()),
        CollectError::Store(e) => map_store_error(request_id, e),
    }
}

pub(super) fn map_oauth_error(request_id: String, error: &OAuthError) -> ApiError {
    if let OAuthError::Storage(e) = error {
        tracing::error!(error = %e, "oauth storage failure");
        return ApiError::new(request_id, error.code(), "storage failure");
    }
    ApiError::new(request_id, error.code(), error.to_string())
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/collect", post(collect::collect))
        .route(
            "/api/v1/initial-collection",
            post(collect::start_initial_collection),
        )
        .route("/api/v1/worker/run", post(collect::run_worker))
        .route("/api/v1/oauth/initiate", post(oauth::initiate))
        .route("/api/v1/resolve-token", post(tokens::resolve_token))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job))
        .route(
            "/api/v1/integrations/{integration_id}/jobs",
            get(jobs::list_integration_jobs),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    // The provider redirects the browser here, so it cannot carry a bearer token.
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/oauth/callback", get(oauth::callback));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "not_configured",
                },
                meta,
            }),
        );
    };

    match adharvest_db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}
