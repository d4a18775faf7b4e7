//! Capabilities the collection core consumes.
//!
//! Production wires every trait to [`PgStore`]; tests use [`MemoryStore`].

mod memory;
mod postgres;

use std::sync::Arc;

use adharvest_core::{
    AuthorizationSession, ChunkErrorDetail, ChunkOutcome, CollectionChunk, CollectionJob,
    CollectionType, DataCollectionStatus, Integration, IntegrationStatus, MetricRow,
    NewAuthorizationSession, NewChunk, NewCollectionJob, NewIntegration, OAuthClient, Platform,
    SessionStatus,
};
use adharvest_db::{ChunkFailure, DbError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// The record was not in the state the operation requires.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StoreError::NotFound,
            DbError::InvalidTransition { .. } => StoreError::Conflict(err.to_string()),
            other => StoreError::Db(other),
        }
    }
}

/// Opaque secret storage addressed by reference.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns [`StoreError::NotFound`] for an unknown reference.
    async fn get(&self, id: Uuid) -> Result<String, StoreError>;
    async fn put(&self, secret: &str, description: &str) -> Result<Uuid, StoreError>;
    /// Returns `false` if nothing was stored under `id`.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Integrations, jobs and chunks.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Live (not soft-deleted) integration by id.
    async fn get_integration(&self, id: Uuid) -> Result<Integration, StoreError>;

    /// Points the integration at a new access-token secret and marks it active.
    async fn update_access_token(
        &self,
        id: Uuid,
        access_token_ref: Uuid,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn mark_integration_status(
        &self,
        id: Uuid,
        status: IntegrationStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn set_data_collection_status(
        &self,
        id: Uuid,
        status: DataCollectionStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Creates a job without chunk rows.
    async fn create_job(&self, new: &NewCollectionJob) -> Result<CollectionJob, StoreError>;

    /// Creates a job and all its chunks atomically.
    async fn enqueue_job_with_chunks(
        &self,
        new: &NewCollectionJob,
        chunks: &[NewChunk],
    ) -> Result<CollectionJob, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<CollectionJob, StoreError>;

    async fn list_jobs_for_integration(
        &self,
        integration_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CollectionJob>, StoreError>;

    /// Returns [`StoreError::Conflict`] unless the job was pending.
    async fn mark_job_running(&self, id: Uuid) -> Result<(), StoreError>;

    /// Atomically counts one chunk outcome and finalizes the job once every
    /// chunk is terminal. `None` when the job was already terminal.
    async fn increment_and_finalize(
        &self,
        job_id: Uuid,
        outcome: ChunkOutcome,
        error: Option<&ChunkErrorDetail>,
    ) -> Result<Option<CollectionJob>, StoreError>;

    /// Claims and leases up to `limit` chunks, at most one per integration,
    /// skipping chunks whose dependency job is not terminal.
    async fn claim_next_pending_chunks(
        &self,
        limit: usize,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CollectionChunk>, StoreError>;

    async fn get_chunk(&self, id: Uuid) -> Result<CollectionChunk, StoreError>;

    /// Chunk rows of `job_id` ordered by index; empty for a job created
    /// without any.
    async fn list_chunks_for_job(&self, job_id: Uuid) -> Result<Vec<CollectionChunk>, StoreError>;

    /// `false` if the chunk was no longer pending.
    async fn complete_chunk(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Requeues with `retry_count + 1` while retries remain, otherwise fails.
    async fn record_chunk_failure(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<Option<ChunkFailure>, StoreError>;

    /// Fails the chunk without consuming retries.
    async fn fail_chunk(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError>;
}

/// OAuth sessions, organization clients and integration creation.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn advertiser_organization(&self, advertiser_id: Uuid) -> Result<Uuid, StoreError>;

    async fn org_oauth_client(
        &self,
        organization_id: Uuid,
        platform: Platform,
    ) -> Result<Option<OAuthClient>, StoreError>;

    async fn create_session(
        &self,
        new: &NewAuthorizationSession,
    ) -> Result<AuthorizationSession, StoreError>;

    async fn session_by_state(
        &self,
        state_token: &str,
    ) -> Result<Option<AuthorizationSession>, StoreError>;

    /// Atomically moves a pending session to `completed`. `false` if the
    /// session had already left `pending`, so exactly one caller wins.
    async fn complete_session(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Moves a pending session to `status`. `false` if it was not pending.
    async fn mark_session_status(&self, id: Uuid, status: SessionStatus)
        -> Result<bool, StoreError>;

    /// Moves a session won through [`complete_session`](Self::complete_session)
    /// to `failed`.
    async fn fail_claimed_session(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Expires every pending session past its deadline and returns them.
    async fn expire_stale_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthorizationSession>, StoreError>;

    /// Creates an integration, soft-deleting any live one for the same
    /// advertiser and platform.
    async fn replace_integration(&self, new: &NewIntegration) -> Result<Integration, StoreError>;
}

/// Destination for fetched rows. Writes must be idempotent per row key.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn upsert_rows(
        &self,
        platform: Platform,
        account_id: &str,
        collection_type: CollectionType,
        rows: &[MetricRow],
    ) -> Result<u64, StoreError>;
}

/// The four capabilities, shared process-wide.
#[derive(Clone)]
pub struct Stores {
    pub secrets: Arc<dyn SecretStore>,
    pub collections: Arc<dyn CollectionStore>,
    pub authorizations: Arc<dyn AuthorizationStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Stores {
    /// Every capability backed by one Postgres pool.
    #[must_use]
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_shared(Arc::new(PgStore::new(pool)))
    }

    /// Every capability backed by a single object implementing all four.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: SecretStore + CollectionStore + AuthorizationStore + MetricsSink + 'static,
    {
        Self {
            secrets: store.clone(),
            collections: store.clone(),
            authorizations: store.clone(),
            metrics: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
