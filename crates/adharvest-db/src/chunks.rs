//! Database operations for `collection_chunks`: fair claiming, completion
//! and retry bookkeeping.

use adharvest_core::{ChunkStatus, CollectionChunk};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{parse_column, DbError};

const CHUNK_COLUMNS: &str = "id, job_id, integration_id, chunk_index, start_date, end_date, \
     collection_type, status, retry_count, max_retries, depends_on_job_id, error_message, \
     last_error_at, completed_at, created_at";

/// A row from the `collection_chunks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub integration_id: Uuid,
    pub chunk_index: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub collection_type: String,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub depends_on_job_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ChunkRow> for CollectionChunk {
    type Error = DbError;

    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        Ok(CollectionChunk {
            id: row.id,
            job_id: row.job_id,
            integration_id: row.integration_id,
            chunk_index: row.chunk_index,
            start_date: row.start_date,
            end_date: row.end_date,
            collection_type: parse_column("collection_type", &row.collection_type)?,
            status: parse_column("status", &row.status)?,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            depends_on_job_id: row.depends_on_job_id,
            error_message: row.error_message,
            last_error_at: row.last_error_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

/// Result of recording a failed attempt against a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFailure {
    /// `Pending` when the chunk was requeued, `Failed` once retries ran out.
    pub status: ChunkStatus,
    pub retry_count: i32,
}

/// Claims up to `limit` pending chunks and leases them until `lease_until`.
///
/// At most one chunk is returned per integration, and integrations that
/// already have a chunk under an unexpired lease are skipped entirely.
/// Chunks whose `depends_on_job_id` job is not yet terminal are never
/// returned. Within those rules the oldest chunks win.
///
/// Leased chunks keep `status = 'pending'`; a crashed worker's chunks become
/// claimable again once the lease lapses.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn claim_next_pending_chunks(
    pool: &PgPool,
    limit: i64,
    lease_until: DateTime<Utc>,
) -> Result<Vec<CollectionChunk>, DbError> {
    let rows = sqlx::query_as::<_, ChunkRow>(&format!(
        "WITH candidates AS ( \
             SELECT DISTINCT ON (c.integration_id) c.id, c.created_at, c.chunk_index \
             FROM collection_chunks c \
             JOIN integrations i ON i.id = c.integration_id AND i.deleted_at IS NULL \
             LEFT JOIN collection_jobs d ON d.id = c.depends_on_job_id \
             WHERE c.status = 'pending' \
               AND (c.leased_until IS NULL OR c.leased_until < NOW()) \
               AND (d.id IS NULL OR d.status IN ('completed', 'partial', 'failed')) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM collection_chunks l \
                   WHERE l.integration_id = c.integration_id \
                     AND l.status = 'pending' \
                     AND l.leased_until >= NOW()) \
             ORDER BY c.integration_id, c.created_at, c.chunk_index \
         ), \
         picked AS ( \
             SELECT c.id \
             FROM collection_chunks c \
             JOIN candidates k ON k.id = c.id \
             ORDER BY k.created_at, k.chunk_index \
             LIMIT $1 \
             FOR UPDATE OF c SKIP LOCKED \
         ) \
         UPDATE collection_chunks c \
         SET leased_until = $2 \
         FROM picked \
         WHERE c.id = picked.id \
           AND c.status = 'pending' \
           AND (c.leased_until IS NULL OR c.leased_until < NOW()) \
         RETURNING {}",
        prefixed_columns("c")
    ))
    .bind(limit)
    .bind(lease_until)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(CollectionChunk::try_from).collect()
}

fn prefixed_columns(alias: &str) -> String {
    CHUNK_COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the chunk does not exist.
pub async fn get_chunk(pool: &PgPool, id: Uuid) -> Result<CollectionChunk, DbError> {
    let row = sqlx::query_as::<_, ChunkRow>(&format!(
        "SELECT {CHUNK_COLUMNS} FROM collection_chunks WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Chunks of a job in plan order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_chunks_for_job(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<CollectionChunk>, DbError> {
    let rows = sqlx::query_as::<_, ChunkRow>(&format!(
        "SELECT {CHUNK_COLUMNS} FROM collection_chunks WHERE job_id = $1 ORDER BY chunk_index"
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(CollectionChunk::try_from).collect()
}

/// Marks a pending chunk completed and releases its lease.
///
/// Returns `false` if the chunk was already terminal.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_chunk(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE collection_chunks \
         SET status = 'completed', completed_at = NOW(), leased_until = NULL \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Records a failed attempt: requeues the chunk with `retry_count + 1` while
/// retries remain, otherwise marks it failed. Decided in one statement.
///
/// Returns `None` if the chunk was already terminal.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn record_chunk_failure(
    pool: &PgPool,
    id: Uuid,
    error_message: &str,
) -> Result<Option<ChunkFailure>, DbError> {
    let row = sqlx::query_as::<_, (String, i32)>(
        "UPDATE collection_chunks SET \
             status = CASE WHEN retry_count < max_retries THEN 'pending' ELSE 'failed' END, \
             retry_count = CASE WHEN retry_count < max_retries THEN retry_count + 1 \
                                ELSE retry_count END, \
             error_message = $2, \
             last_error_at = NOW(), \
             leased_until = NULL \
         WHERE id = $1 AND status = 'pending' \
         RETURNING status, retry_count",
    )
    .bind(id)
    .bind(error_message)
    .fetch_optional(pool)
    .await?;

    row.map(|(status, retry_count)| {
        Ok(ChunkFailure {
            status: parse_column("status", &status)?,
            retry_count,
        })
    })
    .transpose()
}

/// Marks a pending chunk failed without consuming retries. Used for errors
/// that no retry can fix, such as a missing integration.
///
/// Returns `false` if the chunk was already terminal.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_chunk(pool: &PgPool, id: Uuid, error_message: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE collection_chunks \
         SET status = 'failed', error_message = $2, last_error_at = NOW(), leased_until = NULL \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_columns_qualifies_every_column() {
        let cols = prefixed_columns("c");
        assert!(cols.starts_with("c.id, c.job_id"));
        assert!(cols.ends_with("c.created_at"));
        assert_eq!(cols.matches("c.").count(), CHUNK_COLUMNS.split(',').count());
    }
}
