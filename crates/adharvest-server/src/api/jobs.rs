use adharvest_core::CollectionJob;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{map_store_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct JobListQuery {
    limit: Option<i64>,
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollectionJob>>, ApiError> {
    let job = state
        .collector
        .stores()
        .collections
        .get_job(job_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: job,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Most recent jobs first.
pub(super) async fn list_integration_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(integration_id): Path<Uuid>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<ApiResponse<Vec<CollectionJob>>>, ApiError> {
    let jobs = state
        .collector
        .stores()
        .collections
        .list_jobs_for_integration(integration_id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: jobs,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use adharvest_core::Platform;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::api::test_support::{get, json_body, post_json, seed_integration, test_app};

    #[tokio::test]
    async fn job_is_readable_after_direct_collection() {
        let app = test_app();
        let integration = seed_integration(&app.store, Platform::Naver).await;

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/v1/collect",
                &serde_json::json!({
                    "integration_id": integration.id,
                    "start_date": "2024-03-01",
                    "end_date": "2024-03-01",
                    "mode": "daily",
                }),
            ))
            .await
            .expect("response");
        let created = json_body(response).await;
        let job_id = created["data"]["job"]["id"].as_str().expect("job id").to_string();

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/api/v1/jobs/{job_id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["data"]["collection_date"], "2024-03-01");
        assert_eq!(json["data"]["chunks_completed"], 1);

        let response = app
            .router
            .oneshot(get(&format!(
                "/api/v1/integrations/{}/jobs?limit=5",
                integration.id
            )))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let jobs = json["data"].as_array().expect("array");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["id"], job_id.as_str());
    }

    #[tokio::test]
    async fn malformed_job_id_is_rejected() {
        let app = test_app();
        let response = app
            .router
            .oneshot(get("/api/v1/jobs/not-a-uuid"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
