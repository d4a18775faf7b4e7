//! Minimal advertiser lookups. Advertiser management itself lives elsewhere;
//! the collector only needs to map an advertiser to its organization.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Inserts an advertiser and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_advertiser(
    pool: &PgPool,
    organization_id: Uuid,
    name: &str,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO advertisers (id, organization_id, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(organization_id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Returns the organization an advertiser belongs to.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the advertiser does not exist.
pub async fn get_advertiser_organization(
    pool: &PgPool,
    advertiser_id: Uuid,
) -> Result<Uuid, DbError> {
    sqlx::query_scalar::<_, Uuid>("SELECT organization_id FROM advertisers WHERE id = $1")
        .bind(advertiser_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}
