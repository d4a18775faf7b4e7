use std::sync::Arc;

use adharvest_collector::{
    run_direct, run_single_chunk, spawn_initial_collection, DirectReport, DirectRequest,
    QueueWorker, StoreError, WorkerReport,
};
use adharvest_core::{CollectionMode, CollectionType, DateRange};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{map_collect_error, map_store_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

const fn default_mode() -> CollectionMode {
    CollectionMode::Manual
}

#[derive(Debug, Deserialize)]
pub(super) struct CollectBody {
    integration_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(default = "default_mode")]
    mode: CollectionMode,
    #[serde(default)]
    collection_type: Option<CollectionType>,
    /// Runs the range as one extra chunk of this existing job instead of
    /// creating a new one.
    #[serde(default)]
    job_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InitialCollectionBody {
    integration_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub(super) struct InitialCollectionAccepted {
    integration_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: &'static str,
}

fn parse_range(req_id: &str, start: NaiveDate, end: NaiveDate) -> Result<DateRange, ApiError> {
    DateRange::new(start, end)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))
}

pub(super) async fn collect(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CollectBody>,
) -> Result<Json<ApiResponse<DirectReport>>, ApiError> {
    let range = parse_range(&req_id.0, body.start_date, body.end_date)?;

    let result = match body.job_id {
        Some(job_id) => run_single_chunk(&state.collector, job_id, range).await,
        None => {
            let request = DirectRequest {
                integration_id: body.integration_id,
                range,
                mode: body.mode,
                collection_type: body.collection_type.unwrap_or(CollectionType::Ads),
            };
            run_direct(&state.collector, &request).await
        }
    };

    let report = result.map_err(|e| {
        tracing::warn!(integration_id = %body.integration_id, error = %e, "direct collection failed");
        map_collect_error(req_id.0.clone(), &e)
    })?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn start_initial_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<InitialCollectionBody>,
) -> Result<(StatusCode, Json<ApiResponse<InitialCollectionAccepted>>), ApiError> {
    let range = parse_range(&req_id.0, body.start_date, body.end_date)?;

    match state
        .collector
        .stores()
        .collections
        .get_integration(body.integration_id)
        .await
    {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            return Err(ApiError::new(
                req_id.0,
                "not_found",
                format!("integration {} not found", body.integration_id),
            ));
        }
        Err(e) => return Err(map_store_error(req_id.0, &e)),
    }

    spawn_initial_collection(Arc::clone(&state.collector), body.integration_id, range);

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: InitialCollectionAccepted {
                integration_id: body.integration_id,
                start_date: range.start,
                end_date: range.end,
                status: "accepted",
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// Drains one batch of the chunk queue.
pub(super) async fn run_worker(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<WorkerReport>>, ApiError> {
    let worker = QueueWorker::new(Arc::clone(&state.collector));
    let report = worker
        .run_once()
        .await
        .map_err(|e| map_collect_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use adharvest_core::{JobStatus, Platform};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::api::test_support::{json_body, post_json, seed_integration, test_app};

    #[tokio::test]
    async fn collect_runs_direct_job_to_completion() {
        let app = test_app();
        let integration = seed_integration(&app.store, Platform::Meta).await;

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/collect",
                &serde_json::json!({
                    "integration_id": integration.id,
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-10",
                }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["data"]["rows_written"], 10);
        assert_eq!(json["data"]["job"]["status"], "completed");
        assert_eq!(json["data"]["job"]["chunks_total"], 2);
        assert_eq!(json["data"]["job"]["mode"], "manual");
        assert_eq!(json["data"]["job"]["collection_type"], "ads");
    }

    #[tokio::test]
    async fn collect_rejects_inverted_range() {
        let app = test_app();
        let integration = seed_integration(&app.store, Platform::Google).await;

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/collect",
                &serde_json::json!({
                    "integration_id": integration.id,
                    "start_date": "2024-02-01",
                    "end_date": "2024-01-01",
                }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
        assert!(app.store.jobs_for_integration(integration.id).is_empty());
    }

    #[tokio::test]
    async fn collect_without_credential_is_unprocessable() {
        let app = test_app();
        let mut integration = seed_integration(&app.store, Platform::Google).await;
        integration.access_token_ref = None;
        app.store.insert_integration(integration.clone());

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/collect",
                &serde_json::json!({
                    "integration_id": integration.id,
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-02",
                }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(app.store.jobs_for_integration(integration.id).is_empty());
    }

    #[tokio::test]
    async fn initial_collection_is_accepted_and_queues_jobs() {
        let app = test_app();
        let integration = seed_integration(&app.store, Platform::Meta).await;

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/initial-collection",
                &serde_json::json!({
                    "integration_id": integration.id,
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-30",
                }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = json_body(response).await;
        assert_eq!(json["data"]["status"], "accepted");

        let mut jobs = Vec::new();
        for _ in 0..50 {
            jobs = app.store.jobs_for_integration(integration.id);
            if jobs.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[tokio::test]
    async fn initial_collection_for_unknown_integration_is_not_found() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/initial-collection",
                &serde_json::json!({
                    "integration_id": uuid::Uuid::new_v4(),
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-30",
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn worker_run_on_empty_queue_reports_nothing_claimed() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_json("/api/v1/worker/run", &serde_json::json!({})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["data"]["claimed"], 0);
        assert_eq!(json["data"]["succeeded"], 0);
    }
}
