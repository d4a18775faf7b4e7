//! Organization-level OAuth client registrations.

use adharvest_core::{OAuthClient, Platform};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, sqlx::FromRow)]
struct OAuthClientRow {
    client_id: String,
    client_secret_ref: Uuid,
}

/// Looks up the OAuth client an organization registered for `platform`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_org_oauth_client(
    pool: &PgPool,
    organization_id: Uuid,
    platform: Platform,
) -> Result<Option<OAuthClient>, DbError> {
    let row = sqlx::query_as::<_, OAuthClientRow>(
        "SELECT client_id, client_secret_ref \
         FROM organization_oauth_clients \
         WHERE organization_id = $1 AND platform = $2",
    )
    .bind(organization_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| OAuthClient {
        client_id: r.client_id,
        client_secret_ref: r.client_secret_ref,
    }))
}

/// Registers or replaces an organization's OAuth client for `platform`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_org_oauth_client(
    pool: &PgPool,
    organization_id: Uuid,
    platform: Platform,
    client: &OAuthClient,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO organization_oauth_clients \
             (organization_id, platform, client_id, client_secret_ref) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (organization_id, platform) DO UPDATE \
         SET client_id = EXCLUDED.client_id, \
             client_secret_ref = EXCLUDED.client_secret_ref, \
             updated_at = NOW()",
    )
    .bind(organization_id)
    .bind(platform.as_str())
    .bind(&client.client_id)
    .bind(client.client_secret_ref)
    .execute(pool)
    .await?;
    Ok(())
}
