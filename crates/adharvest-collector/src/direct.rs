//! Synchronous collection for small and daily windows.
//!
//! One job is created and driven to completion inline. Chunks run strictly
//! one after another with the platform's rate-limit pause between
//! attempts, so a single integration's traffic stays throttled without any
//! external coordination.

use std::time::Duration;

use adharvest_core::{
    plan_chunks, ChunkErrorDetail, ChunkOutcome, ChunkStatus, CollectionJob, CollectionMode,
    CollectionType, DateRange, Integration, NewCollectionJob, PlatformConfig,
};
use adharvest_platforms::PlatformCredential;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::context::CollectorContext;
use crate::error::CollectError;
use crate::executor::execute_chunk;
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::worker::settle_chunk;

#[derive(Debug, Clone)]
pub struct DirectRequest {
    pub integration_id: Uuid,
    pub range: DateRange,
    pub mode: CollectionMode,
    pub collection_type: CollectionType,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectReport {
    pub job: CollectionJob,
    pub rows_written: u64,
}

fn policy_for(ctx: &CollectorContext, config: &PlatformConfig) -> BackoffPolicy {
    BackoffPolicy {
        max_retries: config.max_retry_attempts,
        base: ctx.settings().backoff_base,
        pause_after_attempt: Duration::from_millis(config.rate_limit_delay_ms),
    }
}

/// Runs one chunk with retries, each attempt under the chunk deadline.
async fn run_chunk(
    ctx: &CollectorContext,
    policy: BackoffPolicy,
    integration: &Integration,
    credential: &PlatformCredential,
    range: DateRange,
    collection_type: CollectionType,
) -> Result<u64, CollectError> {
    let deadline = ctx.settings().chunk_timeout;
    retry_with_backoff(policy, |_attempt| async move {
        tokio::time::timeout(
            deadline,
            execute_chunk(ctx, integration, credential, range, collection_type),
        )
        .await
        .map_err(|_| CollectError::Timeout(deadline))?
    })
    .await
}

/// Records one chunk's outcome on its job, returning the updated job.
async fn record_outcome(
    ctx: &CollectorContext,
    job_id: Uuid,
    chunk_index: Option<i32>,
    range: DateRange,
    result: &Result<u64, CollectError>,
) -> Result<Option<CollectionJob>, CollectError> {
    let collections = &ctx.stores().collections;
    let updated = match result {
        Ok(_) => {
            collections
                .increment_and_finalize(job_id, ChunkOutcome::Completed, None)
                .await?
        }
        Err(err) => {
            let detail = ChunkErrorDetail {
                chunk_index,
                start_date: range.start,
                end_date: range.end,
                message: err.to_string(),
                recorded_at: Utc::now(),
            };
            collections
                .increment_and_finalize(job_id, ChunkOutcome::Failed, Some(&detail))
                .await?
        }
    };
    Ok(updated)
}

/// Plans `request.range`, creates one job and runs every chunk inline.
///
/// A chunk that exhausts its retries is counted as failed and processing
/// moves on to the next one; the job ends `partial` rather than aborting.
///
/// # Errors
///
/// Fails before any job is created if the integration, platform config or
/// credential cannot be loaded, or if the job itself cannot be created. A
/// chunk outcome that cannot be recorded is logged and the run continues.
pub async fn run_direct(
    ctx: &CollectorContext,
    request: &DirectRequest,
) -> Result<DirectReport, CollectError> {
    let integration = ctx.load_integration(request.integration_id).await?;
    let config = ctx.platform_config(integration.platform)?;
    let credential = ctx
        .credentials()
        .resolve(integration.id)
        .await?
        .credential;
    let policy = policy_for(ctx, config);

    let ranges = plan_chunks(request.range, config.chunk_size_for(request.collection_type));
    let collections = &ctx.stores().collections;
    let mut job = collections
        .create_job(&NewCollectionJob {
            integration_id: integration.id,
            advertiser_id: integration.advertiser_id,
            platform: integration.platform,
            collection_type: request.collection_type,
            mode: request.mode,
            range: request.range,
            chunks_total: i32::try_from(ranges.len()).unwrap_or(i32::MAX),
        })
        .await?;
    collections.mark_job_running(job.id).await?;

    tracing::info!(
        integration_id = %integration.id,
        job_id = %job.id,
        platform = %integration.platform,
        collection_type = %request.collection_type,
        chunks = ranges.len(),
        "direct collection started"
    );

    let mut rows_written = 0;
    let mut outcome_write_failed = false;
    for (chunk_index, range) in (0..).zip(ranges) {
        let result = run_chunk(
            ctx,
            policy,
            &integration,
            &credential,
            range,
            request.collection_type,
        )
        .await;

        match &result {
            Ok(rows) => rows_written += rows,
            Err(e) => tracing::warn!(
                job_id = %job.id,
                chunk_index,
                %range,
                reason = e.reason(),
                error = %e,
                "chunk failed after retries"
            ),
        }
        match record_outcome(ctx, job.id, Some(chunk_index), range, &result).await {
            Ok(Some(updated)) => job = updated,
            Ok(None) => {}
            Err(e) => {
                outcome_write_failed = true;
                tracing::error!(
                    job_id = %job.id,
                    chunk_index,
                    %range,
                    error = %e,
                    "failed to record chunk outcome; continuing"
                );
            }
        }
    }
    if outcome_write_failed {
        job = collections.get_job(job.id).await?;
    }

    tracing::info!(
        job_id = %job.id,
        status = %job.status,
        completed = job.chunks_completed,
        failed = job.chunks_failed,
        rows_written,
        "direct collection finished"
    );
    Ok(DirectReport { job, rows_written })
}

/// Runs exactly one chunk of an existing job and records its outcome.
///
/// Used when an external dispatcher fans out a job's chunks itself. When
/// the job was queued with chunk rows, `range` must match one of them: the
/// attempt settles that row the way the queue worker would, and a row that
/// is no longer pending is left alone. Jobs created without chunk rows
/// count every call directly.
///
/// # Errors
///
/// Returns [`CollectError::Config`] for an unknown job or integration, or
/// for a range matching none of the job's chunk rows, and a credential
/// error before the fetch is attempted.
pub async fn run_single_chunk(
    ctx: &CollectorContext,
    job_id: Uuid,
    range: DateRange,
) -> Result<DirectReport, CollectError> {
    let collections = &ctx.stores().collections;
    let job = match collections.get_job(job_id).await {
        Ok(job) => job,
        Err(crate::store::StoreError::NotFound) => {
            return Err(CollectError::Config(format!("collection job {job_id} not found")));
        }
        Err(e) => return Err(e.into()),
    };
    if job.status.is_terminal() {
        return Ok(DirectReport {
            job,
            rows_written: 0,
        });
    }

    let chunks = collections.list_chunks_for_job(job_id).await?;
    let queued = if chunks.is_empty() {
        None
    } else {
        let chunk = chunks
            .into_iter()
            .find(|c| c.range() == range)
            .ok_or_else(|| {
                CollectError::Config(format!("collection job {job_id} has no chunk for {range}"))
            })?;
        if chunk.status != ChunkStatus::Pending {
            tracing::debug!(%job_id, chunk_id = %chunk.id, status = %chunk.status, "chunk already settled");
            return Ok(DirectReport {
                job,
                rows_written: 0,
            });
        }
        Some(chunk)
    };

    let integration = ctx.load_integration(job.integration_id).await?;
    let config = ctx.platform_config(integration.platform)?;
    let credential = ctx
        .credentials()
        .resolve(integration.id)
        .await?
        .credential;

    let Some(chunk) = queued else {
        let result = run_chunk(
            ctx,
            policy_for(ctx, config),
            &integration,
            &credential,
            range,
            job.collection_type,
        )
        .await;
        if let Err(e) = &result {
            tracing::warn!(%job_id, %range, reason = e.reason(), error = %e, "chunk failed after retries");
        }

        let rows_written = *result.as_ref().unwrap_or(&0);
        let job = match record_outcome(ctx, job_id, None, range, &result).await? {
            Some(updated) => updated,
            None => collections.get_job(job_id).await?,
        };
        return Ok(DirectReport { job, rows_written });
    };

    // Queued rows carry their own retry budget; one attempt per call.
    let deadline = ctx.settings().chunk_timeout;
    let result = tokio::time::timeout(
        deadline,
        execute_chunk(ctx, &integration, &credential, range, job.collection_type),
    )
    .await
    .unwrap_or(Err(CollectError::Timeout(deadline)));

    let rows_written = match result {
        Ok(rows) => {
            settle_chunk(ctx, &chunk, Ok(())).await?;
            rows
        }
        Err(e) => {
            tracing::warn!(
                %job_id,
                chunk_id = %chunk.id,
                %range,
                reason = e.reason(),
                error = %e,
                "chunk attempt failed"
            );
            settle_chunk(ctx, &chunk, Err(e)).await?;
            0
        }
    };
    let job = collections.get_job(job_id).await?;
    Ok(DirectReport { job, rows_written })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use adharvest_core::{DataCollectionStatus, JobStatus, NewChunk, Platform};

    use super::*;
    use crate::store::{CollectionStore, MemoryStore};
    use crate::worker::QueueWorker;
    use crate::testing::{context, date, range, seeded_integration, settings, ScriptedAdapter};

    fn request(integration_id: Uuid, range: DateRange) -> DirectRequest {
        DirectRequest {
            integration_id,
            range,
            mode: CollectionMode::Manual,
            collection_type: CollectionType::Ads,
        }
    }

    #[tokio::test]
    async fn exhausted_chunk_leaves_job_partial() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Meta));
        adapter.fail_range(range("2024-01-08", "2024-01-14"));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Meta).await;

        let report = run_direct(&ctx, &request(integration.id, range("2024-01-01", "2024-01-20")))
            .await
            .unwrap();

        let job = &report.job;
        assert_eq!(job.status, JobStatus::Partial);
        assert_eq!((job.chunks_total, job.chunks_completed, job.chunks_failed), (3, 2, 1));
        assert_eq!(report.rows_written, 7 + 6);
        assert_eq!(job.error_details.len(), 1);
        assert_eq!(job.error_details[0].chunk_index, Some(1));
        assert_eq!(job.error_details[0].start_date, date("2024-01-08"));

        // One attempt each for chunks 1 and 3, four for chunk 2.
        assert_eq!(adapter.fetch_calls(), 6);
        let fetched: Vec<_> = adapter.fetched().into_iter().map(|(_, r)| r).collect();
        assert_eq!(fetched.last(), Some(&range("2024-01-15", "2024-01-20")));

        let stored = store.integration(integration.id).unwrap();
        assert_eq!(stored.data_collection_status, DataCollectionStatus::Partial);
        assert!(stored.last_error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Google));
        adapter.fail_first(2);
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Google).await;

        let report = run_direct(&ctx, &request(integration.id, range("2024-02-01", "2024-02-05")))
            .await
            .unwrap();

        assert_eq!(report.job.status, JobStatus::Completed);
        assert_eq!(report.job.chunks_completed, 1);
        assert!(report.job.error_details.is_empty());
        assert_eq!(adapter.fetch_calls(), 3);
        assert_eq!(
            store.integration(integration.id).unwrap().data_collection_status,
            DataCollectionStatus::Completed
        );
    }

    #[tokio::test]
    async fn daily_mode_records_collection_date() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Naver));
        let ctx = context(&store, vec![adapter], settings());
        let integration = seeded_integration(&store, Platform::Naver).await;

        let report = run_direct(
            &ctx,
            &DirectRequest {
                mode: CollectionMode::Daily,
                ..request(integration.id, DateRange::single_day(date("2024-05-02")))
            },
        )
        .await
        .unwrap();

        assert_eq!(report.job.collection_date, Some(date("2024-05-02")));
        assert_eq!(report.rows_written, 1);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_creating_a_job() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store, vec![Arc::new(ScriptedAdapter::new(Platform::Google))], settings());
        let integration = crate::testing::integration(Platform::Google);
        store.insert_integration(integration.clone());

        let err = run_direct(&ctx, &request(integration.id, range("2024-01-01", "2024-01-02")))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Credential(_)));
        assert!(store.jobs_for_integration(integration.id).is_empty());
    }

    #[tokio::test]
    async fn single_chunk_run_counts_toward_existing_job() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Google));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Google).await;
        let job = store
            .create_job(&NewCollectionJob {
                integration_id: integration.id,
                advertiser_id: integration.advertiser_id,
                platform: Platform::Google,
                collection_type: CollectionType::Ads,
                mode: CollectionMode::Manual,
                range: range("2024-01-01", "2024-01-02"),
                chunks_total: 2,
            })
            .await
            .unwrap();

        let first = run_single_chunk(&ctx, job.id, range("2024-01-01", "2024-01-01"))
            .await
            .unwrap();
        assert_eq!(first.job.status, JobStatus::Running);

        adapter.fail_range(range("2024-01-02", "2024-01-02"));
        let second = run_single_chunk(&ctx, job.id, range("2024-01-02", "2024-01-02"))
            .await
            .unwrap();
        assert_eq!(second.job.status, JobStatus::Partial);
        assert_eq!(second.job.error_details[0].chunk_index, None);
    }

    async fn queued_meta_job(store: &MemoryStore, integration: &Integration) -> CollectionJob {
        let weeks = [range("2024-01-01", "2024-01-07"), range("2024-01-08", "2024-01-14")];
        let chunks: Vec<NewChunk> = (0..)
            .zip(weeks)
            .map(|(chunk_index, range)| NewChunk {
                chunk_index,
                range,
                max_retries: 3,
                depends_on_job_id: None,
            })
            .collect();
        store
            .enqueue_job_with_chunks(
                &NewCollectionJob {
                    integration_id: integration.id,
                    advertiser_id: integration.advertiser_id,
                    platform: Platform::Meta,
                    collection_type: CollectionType::Ads,
                    mode: CollectionMode::Initial,
                    range: range("2024-01-01", "2024-01-14"),
                    chunks_total: 2,
                },
                &chunks,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn single_chunk_run_settles_queued_chunk_once() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Meta));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Meta).await;
        let job = queued_meta_job(&store, &integration).await;

        let worker = QueueWorker::new(Arc::clone(&ctx));
        assert_eq!(worker.run_once().await.unwrap().succeeded, 1);
        assert_eq!(adapter.fetch_calls(), 1);

        // Same range the worker already finished: nothing is fetched or counted.
        let repeat = run_single_chunk(&ctx, job.id, range("2024-01-01", "2024-01-07"))
            .await
            .unwrap();
        assert_eq!(repeat.job.status, JobStatus::Running);
        assert_eq!((repeat.job.chunks_completed, repeat.job.chunks_failed), (1, 0));
        assert_eq!(repeat.rows_written, 0);
        assert_eq!(adapter.fetch_calls(), 1);
        let statuses: Vec<_> = store.chunks_for_job(job.id).iter().map(|c| c.status).collect();
        assert_eq!(statuses, vec![ChunkStatus::Completed, ChunkStatus::Pending]);

        let last = run_single_chunk(&ctx, job.id, range("2024-01-08", "2024-01-14"))
            .await
            .unwrap();
        assert_eq!(last.job.status, JobStatus::Completed);
        assert_eq!(
            (last.job.chunks_total, last.job.chunks_completed, last.job.chunks_failed),
            (2, 2, 0)
        );
        assert_eq!(last.rows_written, 7);
        assert!(store
            .chunks_for_job(job.id)
            .iter()
            .all(|c| c.status == ChunkStatus::Completed));
        assert_eq!(worker.run_once().await.unwrap().claimed, 0);
    }

    #[tokio::test]
    async fn failed_single_chunk_run_requeues_queued_chunk() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Meta));
        adapter.fail_range(range("2024-01-08", "2024-01-14"));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Meta).await;
        let job = queued_meta_job(&store, &integration).await;

        let report = run_single_chunk(&ctx, job.id, range("2024-01-08", "2024-01-14"))
            .await
            .unwrap();

        assert_eq!(adapter.fetch_calls(), 1, "one attempt per call");
        assert_eq!((report.job.chunks_completed, report.job.chunks_failed), (0, 0));
        let chunk = &store.chunks_for_job(job.id)[1];
        assert_eq!(chunk.status, ChunkStatus::Pending);
        assert_eq!(chunk.retry_count, 1);
    }

    #[tokio::test]
    async fn single_chunk_run_rejects_range_outside_queued_chunks() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Meta));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Meta).await;
        let job = queued_meta_job(&store, &integration).await;

        let err = run_single_chunk(&ctx, job.id, range("2024-01-01", "2024-01-14"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Config(_)));
        assert_eq!(adapter.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn unrecorded_outcome_does_not_abort_the_run() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Meta));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let integration = seeded_integration(&store, Platform::Meta).await;
        store.fail_next_increments(1);

        let report = run_direct(&ctx, &request(integration.id, range("2024-01-01", "2024-01-20")))
            .await
            .unwrap();

        assert_eq!(adapter.fetch_calls(), 3, "every chunk still runs");
        assert_eq!(report.rows_written, 20);
        assert_eq!((report.job.chunks_completed, report.job.chunks_failed), (2, 0));
        assert_eq!(report.job.status, JobStatus::Running);
        assert_eq!(
            store.get_job(report.job.id).await.unwrap().chunks_completed,
            report.job.chunks_completed
        );
    }
}
