//! Database operations for `oauth_sessions`.

use adharvest_core::{AuthorizationSession, NewAuthorizationSession, SessionStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{parse_column, DbError};

const SESSION_COLUMNS: &str = "id, state_token, advertiser_id, platform, code_verifier, \
     client_id, client_secret_ref, redirect_uri, account_id, status, expires_at, created_at";

/// A row from the `oauth_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub state_token: String,
    pub advertiser_id: Uuid,
    pub platform: String,
    pub code_verifier: Option<String>,
    pub client_id: String,
    pub client_secret_ref: Uuid,
    pub redirect_uri: String,
    pub account_id: Option<String>,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for AuthorizationSession {
    type Error = DbError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(AuthorizationSession {
            id: row.id,
            state_token: row.state_token,
            advertiser_id: row.advertiser_id,
            platform: parse_column("platform", &row.platform)?,
            code_verifier: row.code_verifier,
            client_id: row.client_id,
            client_secret_ref: row.client_secret_ref,
            redirect_uri: row.redirect_uri,
            account_id: row.account_id,
            status: parse_column("status", &row.status)?,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

/// Persists a new pending session.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a state token
/// collision).
pub async fn create_session(
    pool: &PgPool,
    new: &NewAuthorizationSession,
) -> Result<AuthorizationSession, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO oauth_sessions \
             (id, state_token, advertiser_id, platform, code_verifier, client_id, \
              client_secret_ref, redirect_uri, account_id, status, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&new.state_token)
    .bind(new.advertiser_id)
    .bind(new.platform.as_str())
    .bind(new.code_verifier.as_deref())
    .bind(&new.client_id)
    .bind(new.client_secret_ref)
    .bind(&new.redirect_uri)
    .bind(new.account_id.as_deref())
    .bind(new.expires_at)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_session_by_state(
    pool: &PgPool,
    state_token: &str,
) -> Result<Option<AuthorizationSession>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM oauth_sessions WHERE state_token = $1"
    ))
    .bind(state_token)
    .fetch_optional(pool)
    .await?;

    row.map(AuthorizationSession::try_from).transpose()
}

/// Marks a pending session completed.
///
/// Returns `false` if the session had already left `pending`, which means a
/// concurrent callback consumed it first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_session(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE oauth_sessions SET status = 'completed', completed_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Moves a pending session to `status` (expired or failed).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_session_status(
    pool: &PgPool,
    id: Uuid,
    status: SessionStatus,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE oauth_sessions SET status = $2 WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Moves a session claimed through [`complete_session`] to `failed`, for
/// when the code exchange behind the claim did not go through.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_claimed_session(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE oauth_sessions SET status = 'failed', completed_at = NULL \
         WHERE id = $1 AND status = 'completed'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Expires every pending session whose deadline is at or before `now` and
/// returns them, so their temporary secrets can be removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn expire_stale_sessions(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<AuthorizationSession>, DbError> {
    let rows = sqlx::query_as::<_, SessionRow>(&format!(
        "UPDATE oauth_sessions SET status = 'expired' \
         WHERE status = 'pending' AND expires_at <= $1 \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AuthorizationSession::try_from).collect()
}
