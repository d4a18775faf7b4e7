use adharvest_core::{
    AuthorizationSession, ChunkErrorDetail, ChunkOutcome, CollectionChunk, CollectionJob,
    CollectionType, DataCollectionStatus, Integration, IntegrationStatus, MetricRow,
    NewAuthorizationSession, NewChunk, NewCollectionJob, NewIntegration, OAuthClient, Platform,
    SessionStatus,
};
use adharvest_db::ChunkFailure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AuthorizationStore, CollectionStore, MetricsSink, SecretStore, StoreError};

/// Postgres implementation of every store capability.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SecretStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<String, StoreError> {
        Ok(adharvest_db::get_secret(&self.pool, id).await?)
    }

    async fn put(&self, secret: &str, description: &str) -> Result<Uuid, StoreError> {
        Ok(adharvest_db::put_secret(&self.pool, secret, description).await?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(adharvest_db::delete_secret(&self.pool, id).await?)
    }
}

#[async_trait]
impl CollectionStore for PgStore {
    async fn get_integration(&self, id: Uuid) -> Result<Integration, StoreError> {
        Ok(adharvest_db::get_integration(&self.pool, id).await?)
    }

    async fn update_access_token(
        &self,
        id: Uuid,
        access_token_ref: Uuid,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        Ok(adharvest_db::update_access_token(&self.pool, id, access_token_ref, token_expires_at).await?)
    }

    async fn mark_integration_status(
        &self,
        id: Uuid,
        status: IntegrationStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(adharvest_db::mark_integration_status(&self.pool, id, status, last_error).await?)
    }

    async fn set_data_collection_status(
        &self,
        id: Uuid,
        status: DataCollectionStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(adharvest_db::set_data_collection_status(&self.pool, id, status, last_error).await?)
    }

    async fn create_job(&self, new: &NewCollectionJob) -> Result<CollectionJob, StoreError> {
        Ok(adharvest_db::create_job(&self.pool, new).await?)
    }

    async fn enqueue_job_with_chunks(
        &self,
        new: &NewCollectionJob,
        chunks: &[NewChunk],
    ) -> Result<CollectionJob, StoreError> {
        Ok(adharvest_db::enqueue_job_with_chunks(&self.pool, new, chunks).await?)
    }

    async fn get_job(&self, id: Uuid) -> Result<CollectionJob, StoreError> {
        Ok(adharvest_db::get_job(&self.pool, id).await?)
    }

    async fn list_jobs_for_integration(
        &self,
        integration_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CollectionJob>, StoreError> {
        Ok(adharvest_db::list_jobs_for_integration(&self.pool, integration_id, limit).await?)
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<(), StoreError> {
        Ok(adharvest_db::mark_job_running(&self.pool, id).await?)
    }

    async fn increment_and_finalize(
        &self,
        job_id: Uuid,
        outcome: ChunkOutcome,
        error: Option<&ChunkErrorDetail>,
    ) -> Result<Option<CollectionJob>, StoreError> {
        Ok(adharvest_db::increment_and_finalize(&self.pool, job_id, outcome, error).await?)
    }

    async fn claim_next_pending_chunks(
        &self,
        limit: usize,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CollectionChunk>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(adharvest_db::claim_next_pending_chunks(&self.pool, limit, lease_until).await?)
    }

    async fn get_chunk(&self, id: Uuid) -> Result<CollectionChunk, StoreError> {
        Ok(adharvest_db::get_chunk(&self.pool, id).await?)
    }

    async fn list_chunks_for_job(&self, job_id: Uuid) -> Result<Vec<CollectionChunk>, StoreError> {
        Ok(adharvest_db::list_chunks_for_job(&self.pool, job_id).await?)
    }

    async fn complete_chunk(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(adharvest_db::complete_chunk(&self.pool, id).await?)
    }

    async fn record_chunk_failure(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<Option<ChunkFailure>, StoreError> {
        Ok(adharvest_db::record_chunk_failure(&self.pool, id, error_message).await?)
    }

    async fn fail_chunk(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError> {
        Ok(adharvest_db::fail_chunk(&self.pool, id, error_message).await?)
    }
}

#[async_trait]
impl AuthorizationStore for PgStore {
    async fn advertiser_organization(&self, advertiser_id: Uuid) -> Result<Uuid, StoreError> {
        Ok(adharvest_db::get_advertiser_organization(&self.pool, advertiser_id).await?)
    }

    async fn org_oauth_client(
        &self,
        organization_id: Uuid,
        platform: Platform,
    ) -> Result<Option<OAuthClient>, StoreError> {
        Ok(adharvest_db::get_org_oauth_client(&self.pool, organization_id, platform).await?)
    }

    async fn create_session(
        &self,
        new: &NewAuthorizationSession,
    ) -> Result<AuthorizationSession, StoreError> {
        Ok(adharvest_db::create_session(&self.pool, new).await?)
    }

    async fn session_by_state(
        &self,
        state_token: &str,
    ) -> Result<Option<AuthorizationSession>, StoreError> {
        Ok(adharvest_db::get_session_by_state(&self.pool, state_token).await?)
    }

    async fn complete_session(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(adharvest_db::complete_session(&self.pool, id).await?)
    }

    async fn mark_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
    ) -> Result<bool, StoreError> {
        Ok(adharvest_db::mark_session_status(&self.pool, id, status).await?)
    }

    async fn fail_claimed_session(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(adharvest_db::fail_claimed_session(&self.pool, id).await?)
    }

    async fn expire_stale_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthorizationSession>, StoreError> {
        Ok(adharvest_db::expire_stale_sessions(&self.pool, now).await?)
    }

    async fn replace_integration(&self, new: &NewIntegration) -> Result<Integration, StoreError> {
        Ok(adharvest_db::replace_integration(&self.pool, new).await?)
    }
}

#[async_trait]
impl MetricsSink for PgStore {
    async fn upsert_rows(
        &self,
        platform: Platform,
        account_id: &str,
        collection_type: CollectionType,
        rows: &[MetricRow],
    ) -> Result<u64, StoreError> {
        Ok(adharvest_db::upsert_metric_rows(&self.pool, platform, account_id, collection_type, rows)
            .await?)
    }
}
