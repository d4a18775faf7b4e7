//! Background job scheduler.
//!
//! Abandoned OAuth sessions are swept on a fixed schedule. When a worker
//! cron is configured, the server also drains the chunk queue on that
//! schedule instead of waiting for `POST /api/v1/worker/run`.

use std::sync::Arc;

use adharvest_collector::{sweep_expired_sessions, CollectorContext, QueueWorker};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Every five minutes, on the minute.
const SESSION_SWEEP_CRON: &str = "0 */5 * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// `worker_cron` does not parse, or the scheduler fails to start.
pub async fn build_scheduler(
    collector: Arc<CollectorContext>,
    worker_cron: Option<&str>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_session_sweep(&scheduler, Arc::clone(&collector)).await?;
    if let Some(cron) = worker_cron {
        register_worker_job(&scheduler, QueueWorker::new(collector), cron).await?;
    } else {
        tracing::info!("no worker cron configured; queue drains on explicit trigger only");
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_worker_job(
    scheduler: &JobScheduler,
    worker: QueueWorker,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let worker = Arc::new(worker);

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let worker = Arc::clone(&worker);

        Box::pin(async move {
            match worker.run_once().await {
                Ok(report) if report.claimed == 0 => {
                    tracing::debug!("scheduler: chunk queue empty");
                }
                Ok(report) => {
                    tracing::info!(
                        claimed = report.claimed,
                        succeeded = report.succeeded,
                        requeued = report.requeued,
                        failed = report.failed,
                        timed_out = report.timed_out,
                        "scheduler: worker run complete"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduler: worker run failed");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: queue worker registered");
    Ok(())
}

async fn register_session_sweep(
    scheduler: &JobScheduler,
    collector: Arc<CollectorContext>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(SESSION_SWEEP_CRON, move |_uuid, _lock| {
        let collector = Arc::clone(&collector);

        Box::pin(async move {
            if let Err(e) = sweep_expired_sessions(&collector).await {
                tracing::error!(error = %e, "scheduler: oauth session sweep failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = SESSION_SWEEP_CRON, "scheduler: oauth session sweep registered");
    Ok(())
}
