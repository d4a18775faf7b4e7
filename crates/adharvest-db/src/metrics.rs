//! Idempotent persistence of collected metric rows.

use std::collections::HashMap;

use adharvest_core::{CollectionType, MetricRow, Platform};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::DbError;

// 6 binds per row; stays well below the Postgres parameter limit.
const UPSERT_BATCH_SIZE: usize = 1000;

/// Upserts rows keyed by (platform, account, collection type, date, entity).
///
/// Re-fetching a date range overwrites the stored payloads instead of
/// duplicating them. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any batch fails; batches already written
/// stay written, which is safe because the upsert is idempotent.
pub async fn upsert_metric_rows(
    pool: &PgPool,
    platform: Platform,
    account_id: &str,
    collection_type: CollectionType,
    rows: &[MetricRow],
) -> Result<u64, DbError> {
    let rows = dedupe_by_key(rows);
    let mut written = 0_u64;

    for batch in rows.chunks(UPSERT_BATCH_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO collected_metrics \
                 (platform, account_id, collection_type, metric_date, entity_id, payload) ",
        );
        builder.push_values(batch, |mut b, row| {
            b.push_bind(platform.as_str())
                .push_bind(account_id)
                .push_bind(collection_type.as_str())
                .push_bind(row.metric_date)
                .push_bind(row.entity_id.as_str())
                .push_bind(Json(&row.payload));
        });
        builder.push(
            " ON CONFLICT (platform, account_id, collection_type, metric_date, entity_id) \
             DO UPDATE SET payload = EXCLUDED.payload, collected_at = NOW()",
        );

        let result = builder.build().execute(pool).await?;
        written += result.rows_affected();
    }

    Ok(written)
}

/// Keeps the last row for each (date, entity). Postgres rejects an upsert
/// that touches the same key twice in one statement.
fn dedupe_by_key(rows: &[MetricRow]) -> Vec<&MetricRow> {
    let mut index: HashMap<(chrono::NaiveDate, &str), usize> = HashMap::new();
    let mut out: Vec<&MetricRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match index.get(&(row.metric_date, row.entity_id.as_str())) {
            Some(&i) => out[i] = row,
            None => {
                index.insert((row.metric_date, row.entity_id.as_str()), out.len());
                out.push(row);
            }
        }
    }
    out
}
