use adharvest_collector::{
    abandon_oauth, complete_oauth, initiate_oauth, CredentialSource, InitiateRequest,
    InitiateResponse,
};
use adharvest_core::Platform;
use axum::{
    extract::{Query, State},
    response::Redirect,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{map_oauth_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

/// Client credentials are optional; without both, the organization's
/// registered client is used.
#[derive(Deserialize)]
pub(super) struct InitiateBody {
    advertiser_id: Uuid,
    platform: Platform,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl InitiateBody {
    fn into_request(self) -> InitiateRequest {
        let source = match (self.client_id, self.client_secret) {
            (Some(client_id), Some(client_secret)) => CredentialSource::Provided {
                client_id,
                client_secret,
            },
            _ => CredentialSource::Organization,
        };
        InitiateRequest {
            advertiser_id: self.advertiser_id,
            platform: self.platform,
            account_id: self.account_id,
            source,
        }
    }
}

pub(super) async fn initiate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<InitiateBody>,
) -> Result<Json<ApiResponse<InitiateResponse>>, ApiError> {
    let request = body.into_request();
    let response = initiate_oauth(&state.collector, &request)
        .await
        .map_err(|e| {
            tracing::warn!(
                advertiser_id = %request.advertiser_id,
                platform = %request.platform,
                error = %e,
                "oauth initiate failed"
            );
            map_oauth_error(req_id.0.clone(), &e)
        })?;

    Ok(Json(ApiResponse {
        data: response,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Provider redirect target. Always answers with a browser redirect back to
/// the app; the outcome travels in the query string and never includes
/// token material.
pub(super) async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            provider_error = error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "oauth provider returned an error"
        );
        if let Some(token) = query.state.as_deref().filter(|s| !s.is_empty()) {
            if let Err(e) = abandon_oauth(&state.collector, token, error).await {
                tracing::warn!(error = %e, "failed to close abandoned oauth session");
            }
        }
        return redirect_to_app(&state, &[("oauth_error", "access_denied")]);
    }

    match complete_oauth(
        &state.collector,
        query.code.as_deref(),
        query.state.as_deref(),
    )
    .await
    {
        Ok(integration) => {
            let id = integration.id.to_string();
            let platform = integration.platform.to_string();
            redirect_to_app(
                &state,
                &[
                    ("oauth_success", "true"),
                    ("integration_id", &id),
                    ("platform", &platform),
                ],
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, code = e.code(), "oauth callback failed");
            redirect_to_app(&state, &[("oauth_error", e.code())])
        }
    }
}

fn redirect_to_app(state: &AppState, params: &[(&str, &str)]) -> Redirect {
    let mut url = state.app_redirect_url.clone();
    url.query_pairs_mut().extend_pairs(params);
    Redirect::to(url.as_str())
}
