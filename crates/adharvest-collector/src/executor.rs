use adharvest_core::{CollectionType, DateRange, Integration};
use adharvest_platforms::PlatformCredential;

use crate::context::CollectorContext;
use crate::error::CollectError;

/// Fetches one chunk through the integration's platform adapter and upserts
/// the rows. Returns the number of rows written.
///
/// Upserts are keyed per row, so re-running a chunk after a partial failure
/// never duplicates data.
///
/// # Errors
///
/// - [`CollectError::Config`] if no adapter is registered for the platform.
/// - [`CollectError::Platform`] if the fetch fails.
/// - [`CollectError::Store`] if the rows cannot be written.
pub async fn execute_chunk(
    ctx: &CollectorContext,
    integration: &Integration,
    credential: &PlatformCredential,
    range: DateRange,
    collection_type: CollectionType,
) -> Result<u64, CollectError> {
    let adapter = ctx.adapter(integration.platform)?;
    let rows = adapter
        .fetch_chunk(credential, range, collection_type)
        .await?;

    let account_id = integration.account_id.as_deref().unwrap_or_default();
    let written = ctx
        .stores()
        .metrics
        .upsert_rows(integration.platform, account_id, collection_type, &rows)
        .await?;

    tracing::debug!(
        integration_id = %integration.id,
        platform = %integration.platform,
        %collection_type,
        %range,
        rows = written,
        "chunk fetched"
    );
    Ok(written)
}
