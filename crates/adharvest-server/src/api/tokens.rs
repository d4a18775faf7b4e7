use adharvest_collector::TokenResponse;
use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::{map_credential_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct ResolveTokenBody {
    integration_id: Uuid,
}

/// Returns a usable access token, refreshing it first when it is close to
/// expiry.
pub(super) async fn resolve_token(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ResolveTokenBody>,
) -> Result<Json<ApiResponse<TokenResponse>>, ApiError> {
    let resolved = state
        .collector
        .credentials()
        .resolve(body.integration_id)
        .await
        .map_err(|e| {
            tracing::warn!(integration_id = %body.integration_id, error = %e, "token resolution failed");
            map_credential_error(req_id.0.clone(), &e)
        })?;

    Ok(Json(ApiResponse {
        data: TokenResponse::from(resolved),
        meta: ResponseMeta::new(req_id.0),
    }))
}
