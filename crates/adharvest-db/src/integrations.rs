//! Database operations for the `integrations` table.

use adharvest_core::{
    DataCollectionStatus, Integration, IntegrationStatus, NewIntegration, Platform,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{parse_column, DbError};

const INTEGRATION_COLUMNS: &str = "id, advertiser_id, platform, integration_type, status, \
     data_collection_status, account_id, client_id, access_token_ref, \
     legacy_access_token_ref, refresh_token_ref, client_secret_ref, token_expires_at, \
     last_error, last_synced_at, created_at, updated_at";

/// A row from the `integrations` table, enums still in text form.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IntegrationRow {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub platform: String,
    pub integration_type: String,
    pub status: String,
    pub data_collection_status: String,
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    pub access_token_ref: Option<Uuid>,
    pub legacy_access_token_ref: Option<Uuid>,
    pub refresh_token_ref: Option<Uuid>,
    pub client_secret_ref: Option<Uuid>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<IntegrationRow> for Integration {
    type Error = DbError;

    fn try_from(row: IntegrationRow) -> Result<Self, Self::Error> {
        Ok(Integration {
            id: row.id,
            advertiser_id: row.advertiser_id,
            platform: parse_column("platform", &row.platform)?,
            integration_type: parse_column("integration_type", &row.integration_type)?,
            status: parse_column("status", &row.status)?,
            data_collection_status: parse_column(
                "data_collection_status",
                &row.data_collection_status,
            )?,
            account_id: row.account_id,
            client_id: row.client_id,
            access_token_ref: row.access_token_ref,
            legacy_access_token_ref: row.legacy_access_token_ref,
            refresh_token_ref: row.refresh_token_ref,
            client_secret_ref: row.client_secret_ref,
            token_expires_at: row.token_expires_at,
            last_error: row.last_error,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fetches a live (not soft-deleted) integration.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no live integration has this id.
pub async fn get_integration(pool: &PgPool, id: Uuid) -> Result<Integration, DbError> {
    let row = sqlx::query_as::<_, IntegrationRow>(&format!(
        "SELECT {INTEGRATION_COLUMNS} FROM integrations WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Returns the live integration for an (advertiser, platform) pair, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_live_integration_for(
    pool: &PgPool,
    advertiser_id: Uuid,
    platform: Platform,
) -> Result<Option<Integration>, DbError> {
    let row = sqlx::query_as::<_, IntegrationRow>(&format!(
        "SELECT {INTEGRATION_COLUMNS} FROM integrations \
         WHERE advertiser_id = $1 AND platform = $2 AND deleted_at IS NULL"
    ))
    .bind(advertiser_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(Integration::try_from).transpose()
}

/// Creates an integration, soft-deleting any live integration for the same
/// (advertiser, platform) in the same transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails; nothing is changed
/// in that case.
pub async fn replace_integration(
    pool: &PgPool,
    new: &NewIntegration,
) -> Result<Integration, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE integrations \
         SET deleted_at = NOW(), status = 'inactive', updated_at = NOW() \
         WHERE advertiser_id = $1 AND platform = $2 AND deleted_at IS NULL",
    )
    .bind(new.advertiser_id)
    .bind(new.platform.as_str())
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, IntegrationRow>(&format!(
        "INSERT INTO integrations \
             (id, advertiser_id, platform, integration_type, account_id, client_id, \
              access_token_ref, refresh_token_ref, client_secret_ref, token_expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {INTEGRATION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.advertiser_id)
    .bind(new.platform.as_str())
    .bind(new.integration_type.as_str())
    .bind(new.account_id.as_deref())
    .bind(new.client_id.as_deref())
    .bind(new.access_token_ref)
    .bind(new.refresh_token_ref)
    .bind(new.client_secret_ref)
    .bind(new.token_expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    row.try_into()
}

/// Points the integration at a freshly stored access token and clears any
/// previous credential error.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no live integration has this id.
pub async fn update_access_token(
    pool: &PgPool,
    id: Uuid,
    access_token_ref: Uuid,
    token_expires_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE integrations \
         SET access_token_ref = $2, token_expires_at = $3, status = 'active', \
             last_error = NULL, updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(access_token_ref)
    .bind(token_expires_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Sets the credential status, recording `last_error` when given.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no live integration has this id.
pub async fn mark_integration_status(
    pool: &PgPool,
    id: Uuid,
    status: IntegrationStatus,
    last_error: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE integrations \
         SET status = $2, last_error = COALESCE($3, last_error), updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(last_error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Sets the collection rollup status directly. Job finalization normally
/// does this; the orchestrator uses it to flag stage-setup failures.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no live integration has this id.
pub async fn set_data_collection_status(
    pool: &PgPool,
    id: Uuid,
    status: DataCollectionStatus,
    last_error: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE integrations \
         SET data_collection_status = $2, last_error = COALESCE($3, last_error), \
             updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(last_error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
