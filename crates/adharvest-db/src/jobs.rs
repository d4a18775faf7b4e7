//! Database operations for `collection_jobs`, including the atomic
//! counter-increment-and-finalize used by every chunk completion.

use adharvest_core::{
    ChunkErrorDetail, ChunkOutcome, CollectionJob, CollectionMode, NewChunk, NewCollectionJob,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{parse_column, DbError};

const JOB_COLUMNS: &str = "id, integration_id, advertiser_id, platform, collection_type, mode, \
     start_date, end_date, collection_date, status, chunks_total, chunks_completed, \
     chunks_failed, error_details, started_at, completed_at, created_at";

/// A row from the `collection_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub advertiser_id: Uuid,
    pub platform: String,
    pub collection_type: String,
    pub mode: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub collection_date: Option<NaiveDate>,
    pub status: String,
    pub chunks_total: i32,
    pub chunks_completed: i32,
    pub chunks_failed: i32,
    pub error_details: Json<Vec<ChunkErrorDetail>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for CollectionJob {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(CollectionJob {
            id: row.id,
            integration_id: row.integration_id,
            advertiser_id: row.advertiser_id,
            platform: parse_column("platform", &row.platform)?,
            collection_type: parse_column("collection_type", &row.collection_type)?,
            mode: parse_column("mode", &row.mode)?,
            start_date: row.start_date,
            end_date: row.end_date,
            collection_date: row.collection_date,
            status: parse_column("status", &row.status)?,
            chunks_total: row.chunks_total,
            chunks_completed: row.chunks_completed,
            chunks_failed: row.chunks_failed,
            error_details: row.error_details.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

async fn insert_job<'e, E>(executor: E, new: &NewCollectionJob) -> Result<JobRow, DbError>
where
    E: PgExecutor<'e>,
{
    let collection_date = (new.mode == CollectionMode::Daily).then_some(new.range.start);

    let row = sqlx::query_as::<_, JobRow>(&format!(
        "INSERT INTO collection_jobs \
             (id, integration_id, advertiser_id, platform, collection_type, mode, \
              start_date, end_date, collection_date, status, chunks_total) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.integration_id)
    .bind(new.advertiser_id)
    .bind(new.platform.as_str())
    .bind(new.collection_type.as_str())
    .bind(new.mode.as_str())
    .bind(new.range.start)
    .bind(new.range.end)
    .bind(collection_date)
    .bind(new.chunks_total)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

async fn mark_integration_collecting<'e, E>(executor: E, integration_id: Uuid) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE integrations \
         SET data_collection_status = 'collecting', updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(integration_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Creates a job with no chunk rows, for the direct collection path where
/// chunks are planned and run in memory.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_job(pool: &PgPool, new: &NewCollectionJob) -> Result<CollectionJob, DbError> {
    let mut tx = pool.begin().await?;
    let row = insert_job(&mut *tx, new).await?;
    mark_integration_collecting(&mut *tx, new.integration_id).await?;
    tx.commit().await?;
    row.try_into()
}

/// Creates a job and bulk-inserts its chunks in one transaction, so a stage
/// is either fully enqueued or not at all.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn enqueue_job_with_chunks(
    pool: &PgPool,
    new: &NewCollectionJob,
    chunks: &[NewChunk],
) -> Result<CollectionJob, DbError> {
    let mut tx = pool.begin().await?;
    let row = insert_job(&mut *tx, new).await?;

    if !chunks.is_empty() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO collection_chunks \
                 (id, job_id, integration_id, chunk_index, start_date, end_date, \
                  collection_type, status, retry_count, max_retries, depends_on_job_id) ",
        );
        builder.push_values(chunks, |mut b, chunk| {
            b.push_bind(Uuid::new_v4())
                .push_bind(row.id)
                .push_bind(new.integration_id)
                .push_bind(chunk.chunk_index)
                .push_bind(chunk.range.start)
                .push_bind(chunk.range.end)
                .push_bind(new.collection_type.as_str())
                .push_bind("pending")
                .push_bind(0_i32)
                .push_bind(chunk.max_retries)
                .push_bind(chunk.depends_on_job_id);
        });
        builder.build().execute(&mut *tx).await?;
    }

    mark_integration_collecting(&mut *tx, new.integration_id).await?;
    tx.commit().await?;
    row.try_into()
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the job does not exist.
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<CollectionJob, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM collection_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Most recent jobs for an integration, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs_for_integration(
    pool: &PgPool,
    integration_id: Uuid,
    limit: i64,
) -> Result<Vec<CollectionJob>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM collection_jobs \
         WHERE integration_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(integration_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(CollectionJob::try_from).collect()
}

/// Moves a pending job to `running` and stamps `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the job is not pending.
pub async fn mark_job_running(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_jobs \
         SET status = 'running', started_at = COALESCE(started_at, NOW()) \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTransition {
            entity: "collection job",
            id,
            expected: "pending",
        });
    }
    Ok(())
}

/// Counts one chunk outcome against its job in a single statement.
///
/// The update bumps the matching counter, appends `error` to
/// `error_details`, and, when the job becomes fully terminal, sets its final
/// status and rolls it up to the owning integration. The integration stays
/// `collecting` while other jobs for it are still pending or running.
///
/// Returns `None` without changing anything when the job is already
/// terminal, so a duplicate report can never push the counters past
/// `chunks_total`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn increment_and_finalize(
    pool: &PgPool,
    job_id: Uuid,
    outcome: ChunkOutcome,
    error: Option<&ChunkErrorDetail>,
) -> Result<Option<CollectionJob>, DbError> {
    let failed_inc: i32 = match outcome {
        ChunkOutcome::Completed => 0,
        ChunkOutcome::Failed => 1,
    };

    // Right-hand sides of SET see the pre-update row, so every CASE below is
    // computed from the old counters plus this one outcome.
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "WITH updated AS ( \
             UPDATE collection_jobs j SET \
                 chunks_completed = j.chunks_completed + (1 - $2), \
                 chunks_failed = j.chunks_failed + $2, \
                 error_details = CASE WHEN $3::jsonb IS NULL THEN j.error_details \
                                      ELSE j.error_details || jsonb_build_array($3::jsonb) END, \
                 status = CASE \
                     WHEN j.chunks_completed + j.chunks_failed + 1 < j.chunks_total THEN 'running' \
                     WHEN j.chunks_failed + $2 = 0 THEN 'completed' \
                     WHEN j.chunks_failed + $2 >= j.chunks_total THEN 'failed' \
                     ELSE 'partial' END, \
                 started_at = COALESCE(j.started_at, NOW()), \
                 completed_at = CASE \
                     WHEN j.chunks_completed + j.chunks_failed + 1 >= j.chunks_total THEN NOW() \
                     ELSE NULL END \
             WHERE j.id = $1 AND j.chunks_completed + j.chunks_failed < j.chunks_total \
             RETURNING {JOB_COLUMNS} \
         ), \
         rollup AS ( \
             UPDATE integrations i SET \
                 data_collection_status = CASE \
                     WHEN EXISTS ( \
                         SELECT 1 FROM collection_jobs o \
                         WHERE o.integration_id = i.id AND o.id <> u.id \
                           AND o.status IN ('pending', 'running')) THEN 'collecting' \
                     WHEN u.status = 'completed' THEN 'completed' \
                     WHEN u.status = 'partial' THEN 'partial' \
                     ELSE 'error' END, \
                 last_error = CASE WHEN u.status IN ('partial', 'failed') \
                     THEN COALESCE(u.error_details -> 0 ->> 'message', i.last_error) \
                     ELSE i.last_error END, \
                 last_synced_at = NOW(), \
                 updated_at = NOW() \
             FROM updated u \
             WHERE i.id = u.integration_id \
               AND u.status IN ('completed', 'partial', 'failed') \
         ) \
         SELECT {JOB_COLUMNS} FROM updated"
    ))
    .bind(job_id)
    .bind(failed_inc)
    .bind(error.map(Json))
    .fetch_optional(pool)
    .await?;

    row.map(CollectionJob::try_from).transpose()
}
