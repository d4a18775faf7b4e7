//! Vault secret storage. Values are opaque to this crate.

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Stores `secret` and returns the reference it can be read back with.
///
/// Accepts any executor so callers can write a secret inside a larger
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn put_secret<'e, E>(
    executor: E,
    secret: &str,
    description: &str,
) -> Result<Uuid, DbError>
where
    E: PgExecutor<'e>,
{
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO vault_secrets (id, secret, description) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(secret)
        .bind(description)
        .execute(executor)
        .await?;
    Ok(id)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no secret exists under `id`.
pub async fn get_secret(pool: &PgPool, id: Uuid) -> Result<String, DbError> {
    sqlx::query_scalar::<_, String>("SELECT secret FROM vault_secrets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Deletes a secret. Deleting an unknown reference is not an error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_secret(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM vault_secrets WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
