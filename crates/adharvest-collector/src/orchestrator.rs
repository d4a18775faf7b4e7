//! Backfill planning.
//!
//! A backfill enqueues one job per collection stage of the integration's
//! platform. Each stage's chunks carry the previous stage's job id as
//! `depends_on_job_id`, so the queue worker will not claim them until that
//! job is terminal.

use std::sync::Arc;

use adharvest_core::{
    plan_chunks, CollectionJob, CollectionMode, DataCollectionStatus, DateRange, NewChunk,
    NewCollectionJob,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::context::CollectorContext;
use crate::error::CollectError;

/// Plans and enqueues every stage of an initial collection.
///
/// Each stage is inserted atomically with all its chunks. If a stage cannot
/// be enqueued the integration's collection status is set to `error` and
/// later stages are skipped.
///
/// # Errors
///
/// Returns [`CollectError::Config`] for an unknown integration or platform
/// and [`CollectError::Store`] if a stage cannot be written.
pub async fn run_initial_collection(
    ctx: &CollectorContext,
    integration_id: Uuid,
    range: DateRange,
) -> Result<Vec<CollectionJob>, CollectError> {
    match enqueue_stages(ctx, integration_id, range).await {
        Ok(jobs) => Ok(jobs),
        Err(err) => {
            let message = format!("initial collection setup failed: {err}");
            if let Err(mark_err) = ctx
                .stores()
                .collections
                .set_data_collection_status(
                    integration_id,
                    DataCollectionStatus::Error,
                    Some(&message),
                )
                .await
            {
                tracing::error!(
                    %integration_id,
                    error = %mark_err,
                    "failed to record initial collection failure"
                );
            }
            Err(err)
        }
    }
}

async fn enqueue_stages(
    ctx: &CollectorContext,
    integration_id: Uuid,
    range: DateRange,
) -> Result<Vec<CollectionJob>, CollectError> {
    let integration = ctx.load_integration(integration_id).await?;
    let config = ctx.platform_config(integration.platform)?;
    let max_retries = i32::try_from(config.max_retry_attempts).unwrap_or(i32::MAX);

    let stages = integration.platform.initial_stages();
    let mut jobs: Vec<CollectionJob> = Vec::with_capacity(stages.len());
    for &collection_type in stages {
        let depends_on = jobs.last().map(|job| job.id);
        let ranges = plan_chunks(range, config.chunk_size_for(collection_type));
        let chunks: Vec<NewChunk> = ranges
            .iter()
            .zip(0..)
            .map(|(r, chunk_index)| NewChunk {
                chunk_index,
                range: *r,
                max_retries,
                depends_on_job_id: depends_on,
            })
            .collect();

        let new_job = NewCollectionJob {
            integration_id,
            advertiser_id: integration.advertiser_id,
            platform: integration.platform,
            collection_type,
            mode: CollectionMode::Initial,
            range,
            chunks_total: i32::try_from(chunks.len()).unwrap_or(i32::MAX),
        };
        let job = ctx
            .stores()
            .collections
            .enqueue_job_with_chunks(&new_job, &chunks)
            .await?;

        tracing::info!(
            %integration_id,
            job_id = %job.id,
            platform = %integration.platform,
            %collection_type,
            chunks = job.chunks_total,
            depends_on = ?depends_on,
            "collection stage enqueued"
        );
        jobs.push(job);
    }
    Ok(jobs)
}

/// Starts [`run_initial_collection`] in the background and returns at once.
///
/// Results are only observable through job and integration records.
pub fn spawn_initial_collection(
    ctx: Arc<CollectorContext>,
    integration_id: Uuid,
    range: DateRange,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match run_initial_collection(&ctx, integration_id, range).await {
            Ok(jobs) => {
                tracing::info!(%integration_id, jobs = jobs.len(), %range, "initial collection queued");
            }
            Err(e) => {
                tracing::error!(%integration_id, error = %e, "initial collection failed");
            }
        }
    })
}
