//! Collection command handlers for the CLI.
//!
//! These are called from `main` after the database pool and collector
//! context are established. Output goes to stdout as JSON so runs can be
//! piped into other tools.

use adharvest_collector::{
    run_direct, run_initial_collection, CollectorContext, DirectRequest, TokenResponse,
};
use adharvest_core::{CollectionMode, CollectionType, DateRange, JobStatus};
use chrono::NaiveDate;
use uuid::Uuid;

/// Runs a direct collection and prints the finished job.
///
/// # Errors
///
/// Returns an error if the range is invalid or the collection could not
/// start. A job that ends `partial` or `failed` is reported, not returned as
/// an error.
pub(crate) async fn run_direct_collection(
    ctx: &CollectorContext,
    integration_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    mode: CollectionMode,
    collection_type: CollectionType,
) -> anyhow::Result<()> {
    let range = DateRange::new(start, end)?;
    let report = run_direct(
        ctx,
        &DirectRequest {
            integration_id,
            range,
            mode,
            collection_type,
        },
    )
    .await?;

    match report.job.status {
        JobStatus::Completed => tracing::info!(
            job_id = %report.job.id,
            rows = report.rows_written,
            "collection completed"
        ),
        status => tracing::warn!(
            job_id = %report.job.id,
            %status,
            failed = report.job.chunks_failed,
            first_error = report.job.first_error().unwrap_or_default(),
            "collection finished with failures"
        ),
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Plans and queues the initial backfill, printing one line per job.
///
/// # Errors
///
/// Returns an error if the range is invalid or any job cannot be enqueued.
pub(crate) async fn run_initial(
    ctx: &CollectorContext,
    integration_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<()> {
    let range = DateRange::new(start, end)?;
    let jobs = run_initial_collection(ctx, integration_id, range).await?;

    for job in &jobs {
        println!(
            "{}\t{}\t{} chunks\t{}..{}",
            job.id, job.collection_type, job.chunks_total, job.start_date, job.end_date
        );
    }
    tracing::info!(%integration_id, jobs = jobs.len(), "initial collection queued");
    Ok(())
}

/// # Errors
///
/// Returns an error if no usable token can be produced.
pub(crate) async fn resolve_token(ctx: &CollectorContext, integration_id: Uuid) -> anyhow::Result<()> {
    let resolved = ctx.credentials().resolve(integration_id).await?;
    let response = TokenResponse::from(resolved);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
