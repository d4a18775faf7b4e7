//! Queue worker: claims a fair batch of pending chunks and runs them
//! concurrently.
//!
//! Every chunk runs as an independent future under its own deadline. A
//! failing chunk never cancels its siblings; outcomes are collected after
//! all of them finish. Failed chunks are requeued for a later invocation
//! until their retries run out.

use std::sync::Arc;

use adharvest_core::{ChunkErrorDetail, ChunkOutcome, ChunkStatus, CollectionChunk};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::context::CollectorContext;
use crate::error::CollectError;
use crate::executor::execute_chunk;

/// Counts from one worker invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub claimed: usize,
    pub succeeded: usize,
    /// Failed but returned to `pending` for a later invocation.
    pub requeued: usize,
    /// Terminally failed.
    pub failed: usize,
    /// Attempts that hit the chunk deadline; also counted as requeued or
    /// failed.
    pub timed_out: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Succeeded,
    Requeued,
    Failed,
    /// Chunk left `pending` under someone else, or the store write failed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct QueueWorker {
    ctx: Arc<CollectorContext>,
}

impl QueueWorker {
    #[must_use]
    pub fn new(ctx: Arc<CollectorContext>) -> Self {
        Self { ctx }
    }

    /// Runs one claim-and-process cycle. An empty queue is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::Store`] only if the claim itself fails.
    /// Per-chunk failures are recorded on the chunk and never escape.
    pub async fn run_once(&self) -> Result<WorkerReport, CollectError> {
        let settings = self.ctx.settings();
        let lease = settings.chunk_timeout + settings.lease_grace;
        let lease_until = Utc::now()
            + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::minutes(11));

        let chunks = self
            .ctx
            .stores()
            .collections
            .claim_next_pending_chunks(settings.batch_size, lease_until)
            .await?;
        if chunks.is_empty() {
            tracing::debug!("no pending chunks");
            return Ok(WorkerReport::default());
        }

        let mut report = WorkerReport {
            claimed: chunks.len(),
            ..WorkerReport::default()
        };
        let concurrency = settings.batch_size.max(1);
        let results: Vec<(Disposition, bool)> = stream::iter(chunks)
            .map(|chunk| self.process(chunk))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (disposition, timed_out) in results {
            match disposition {
                Disposition::Succeeded => report.succeeded += 1,
                Disposition::Requeued => report.requeued += 1,
                Disposition::Failed => report.failed += 1,
                Disposition::Skipped => {}
            }
            if timed_out {
                report.timed_out += 1;
            }
        }

        tracing::info!(
            claimed = report.claimed,
            succeeded = report.succeeded,
            requeued = report.requeued,
            failed = report.failed,
            timed_out = report.timed_out,
            "worker run complete"
        );
        Ok(report)
    }

    async fn attempt(&self, chunk: &CollectionChunk) -> Result<u64, CollectError> {
        let integration = self.ctx.load_integration(chunk.integration_id).await?;
        let credential = self
            .ctx
            .credentials()
            .resolve(integration.id)
            .await?
            .credential;
        execute_chunk(
            &self.ctx,
            &integration,
            &credential,
            chunk.range(),
            chunk.collection_type,
        )
        .await
    }

    async fn process(&self, chunk: CollectionChunk) -> (Disposition, bool) {
        let deadline = self.ctx.settings().chunk_timeout;
        let result = tokio::time::timeout(deadline, self.attempt(&chunk))
            .await
            .unwrap_or(Err(CollectError::Timeout(deadline)));
        let timed_out = matches!(result, Err(CollectError::Timeout(_)));

        let disposition = match result {
            Ok(rows) => {
                tracing::debug!(chunk_id = %chunk.id, job_id = %chunk.job_id, rows, "chunk completed");
                self.finish(&chunk, Ok(())).await
            }
            Err(err) => {
                tracing::warn!(
                    chunk_id = %chunk.id,
                    job_id = %chunk.job_id,
                    integration_id = %chunk.integration_id,
                    retry_count = chunk.retry_count,
                    reason = err.reason(),
                    error = %err,
                    "chunk attempt failed"
                );
                self.finish(&chunk, Err(err)).await
            }
        };
        (disposition, timed_out)
    }

    /// Persists the outcome. Store failures are logged, never propagated;
    /// the lease lapses and the chunk is claimed again.
    async fn finish(&self, chunk: &CollectionChunk, result: Result<(), CollectError>) -> Disposition {
        match settle_chunk(&self.ctx, chunk, result).await {
            Ok(disposition) => disposition,
            Err(e) => {
                tracing::error!(chunk_id = %chunk.id, error = %e, "failed to record chunk outcome");
                Disposition::Skipped
            }
        }
    }
}

/// Moves a chunk row out of `pending` for one attempt's outcome and counts
/// it on the job. Nothing is counted when the row was no longer pending or
/// was requeued.
pub(crate) async fn settle_chunk(
    ctx: &CollectorContext,
    chunk: &CollectionChunk,
    result: Result<(), CollectError>,
) -> Result<Disposition, CollectError> {
    let collections = &ctx.stores().collections;

    let err = match result {
        Ok(()) => {
            if !collections.complete_chunk(chunk.id).await? {
                tracing::warn!(chunk_id = %chunk.id, "chunk no longer pending; outcome dropped");
                return Ok(Disposition::Skipped);
            }
            collections
                .increment_and_finalize(chunk.job_id, ChunkOutcome::Completed, None)
                .await?;
            return Ok(Disposition::Succeeded);
        }
        Err(err) => err,
    };

    let message = err.to_string();
    let terminal = if err.is_retryable() {
        match collections.record_chunk_failure(chunk.id, &message).await? {
            Some(failure) if failure.status == ChunkStatus::Failed => true,
            Some(_) => return Ok(Disposition::Requeued),
            None => return Ok(Disposition::Skipped),
        }
    } else {
        collections.fail_chunk(chunk.id, &message).await?
    };
    if !terminal {
        return Ok(Disposition::Skipped);
    }

    let detail = ChunkErrorDetail {
        chunk_index: Some(chunk.chunk_index),
        start_date: chunk.start_date,
        end_date: chunk.end_date,
        message,
        recorded_at: Utc::now(),
    };
    let job = collections
        .increment_and_finalize(chunk.job_id, ChunkOutcome::Failed, Some(&detail))
        .await?;
    if let Some(job) = job.filter(|j| j.status.is_terminal()) {
        tracing::info!(job_id = %job.id, status = %job.status, "job finalized");
    }
    Ok(Disposition::Failed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use adharvest_core::{
        CollectionMode, CollectionType, DataCollectionStatus, JobStatus, NewChunk,
        NewCollectionJob, Platform,
    };

    use super::*;
    use crate::orchestrator::run_initial_collection;
    use crate::store::{CollectionStore, MemoryStore};
    use crate::testing::{context, integration, range, seeded_integration, settings, ScriptedAdapter};

    async fn single_chunk_job(
        store: &MemoryStore,
        integration_id: uuid::Uuid,
        platform: Platform,
    ) -> uuid::Uuid {
        let r = range("2024-01-01", "2024-01-03");
        let job = store
            .enqueue_job_with_chunks(
                &NewCollectionJob {
                    integration_id,
                    advertiser_id: uuid::Uuid::new_v4(),
                    platform,
                    collection_type: CollectionType::Ads,
                    mode: CollectionMode::Initial,
                    range: r,
                    chunks_total: 1,
                },
                &[NewChunk {
                    chunk_index: 0,
                    range: r,
                    max_retries: 3,
                    depends_on_job_id: None,
                }],
            )
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let worker = QueueWorker::new(context(&store, Vec::new(), settings()));
        assert_eq!(worker.run_once().await.unwrap(), WorkerReport::default());
    }

    #[tokio::test]
    async fn always_failing_chunk_is_requeued_three_times_then_failed() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Google));
        adapter.fail_range(range("2024-01-01", "2024-01-03"));
        let worker = QueueWorker::new(context(&store, vec![adapter.clone()], settings()));
        let integration = seeded_integration(&store, Platform::Google).await;
        let job_id = single_chunk_job(&store, integration.id, Platform::Google).await;

        for expected_retry in 1..=3 {
            let report = worker.run_once().await.unwrap();
            assert_eq!((report.claimed, report.requeued), (1, 1));
            let chunk = &store.chunks_for_job(job_id)[0];
            assert_eq!(chunk.status, ChunkStatus::Pending);
            assert_eq!(chunk.retry_count, expected_retry);
        }

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let chunk = &store.chunks_for_job(job_id)[0];
        assert_eq!(chunk.status, ChunkStatus::Failed);
        assert_eq!(chunk.retry_count, 3);
        assert_eq!(adapter.fetch_calls(), 4);

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.chunks_failed, 1);
        assert_eq!(
            store.integration(integration.id).unwrap().data_collection_status,
            DataCollectionStatus::Error
        );

        assert_eq!(worker.run_once().await.unwrap(), WorkerReport::default());
    }

    #[tokio::test]
    async fn dependent_stage_waits_for_its_dependency() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Meta));
        let ctx = context(&store, vec![adapter.clone()], settings());
        let meta = seeded_integration(&store, Platform::Meta).await;
        let jobs = run_initial_collection(&ctx, meta.id, range("2024-01-01", "2024-01-05"))
            .await
            .unwrap();

        // Make the dependent chunks the oldest in the queue.
        let long_ago = Utc::now() - chrono::Duration::days(1);
        for job in &jobs[1..] {
            for chunk in store.chunks_for_job(job.id) {
                store.set_chunk_created_at(chunk.id, long_ago);
            }
        }

        let worker = QueueWorker::new(ctx);
        for _ in 0..3 {
            assert_eq!(worker.run_once().await.unwrap().succeeded, 1);
        }
        let order: Vec<_> = adapter.fetched().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            order,
            vec![
                CollectionType::Ads,
                CollectionType::Demographics,
                CollectionType::Creatives
            ]
        );
        for job in &jobs {
            assert_eq!(store.get_job(job.id).await.unwrap().status, JobStatus::Completed);
        }
        assert_eq!(
            store.integration(meta.id).unwrap().data_collection_status,
            DataCollectionStatus::Completed
        );
    }

    #[tokio::test]
    async fn sibling_failure_does_not_cancel_other_chunks() {
        let store = Arc::new(MemoryStore::new());
        let google = Arc::new(ScriptedAdapter::new(Platform::Google));
        google.fail_range(range("2024-01-01", "2024-01-03"));
        let naver = Arc::new(ScriptedAdapter::new(Platform::Naver));
        let worker = QueueWorker::new(context(&store, vec![google, naver.clone()], settings()));

        let g = seeded_integration(&store, Platform::Google).await;
        let n = seeded_integration(&store, Platform::Naver).await;
        single_chunk_job(&store, g.id, Platform::Google).await;
        let naver_job = single_chunk_job(&store, n.id, Platform::Naver).await;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(naver.fetch_calls(), 1);
        assert_eq!(store.get_job(naver_job).await.unwrap().status, JobStatus::Completed);
        assert_eq!(store.metric_count(), 3);
    }

    #[tokio::test]
    async fn deadline_expiry_is_counted_and_requeued() {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(ScriptedAdapter::new(Platform::Google));
        adapter.set_delay(Duration::from_millis(500));
        let settings = crate::context::CollectorSettings {
            chunk_timeout: Duration::from_millis(20),
            ..settings()
        };
        let worker = QueueWorker::new(context(&store, vec![adapter], settings));
        let integration = seeded_integration(&store, Platform::Google).await;
        let job_id = single_chunk_job(&store, integration.id, Platform::Google).await;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.requeued, 1);
        let chunk = &store.chunks_for_job(job_id)[0];
        assert_eq!(chunk.retry_count, 1);
        assert!(chunk.error_message.as_deref().unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn missing_credential_fails_chunk_without_retry() {
        let store = Arc::new(MemoryStore::new());
        let worker = QueueWorker::new(context(
            &store,
            vec![Arc::new(ScriptedAdapter::new(Platform::Google))],
            settings(),
        ));
        let bare = integration(Platform::Google);
        store.insert_integration(bare.clone());
        let job_id = single_chunk_job(&store, bare.id, Platform::Google).await;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.first_error().unwrap().contains("no stored credential"));
        assert_eq!(store.chunks_for_job(job_id)[0].retry_count, 0);
    }
}
