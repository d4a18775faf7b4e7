//! In-process implementation of every store capability, for tests and
//! for embedding the collector without a database.
//!
//! Mirrors the Postgres semantics that matter to the collector: live vs.
//! soft-deleted integrations, claim fairness and leases, the dependency
//! barrier, and the single-step increment-and-finalize.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use adharvest_core::{
    AuthorizationSession, ChunkErrorDetail, ChunkOutcome, ChunkStatus, CollectionChunk,
    CollectionJob, CollectionMode, CollectionType, DataCollectionStatus, Integration,
    IntegrationStatus, JobStatus, MetricRow, NewAuthorizationSession, NewChunk,
    NewCollectionJob, NewIntegration, OAuthClient, Platform, SessionStatus,
};
use adharvest_db::{ChunkFailure, DbError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::{AuthorizationStore, CollectionStore, MetricsSink, SecretStore, StoreError};

type MetricKey = (Platform, String, CollectionType, NaiveDate, String);

#[derive(Debug)]
struct LeasedChunk {
    chunk: CollectionChunk,
    leased_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    secrets: HashMap<Uuid, String>,
    integrations: HashMap<Uuid, Integration>,
    deleted_integrations: HashSet<Uuid>,
    advertisers: HashMap<Uuid, Uuid>,
    oauth_clients: HashMap<(Uuid, Platform), OAuthClient>,
    sessions: HashMap<Uuid, AuthorizationSession>,
    jobs: HashMap<Uuid, (Uuid, CollectionJob)>,
    chunks: Vec<LeasedChunk>,
    metrics: HashMap<MetricKey, serde_json::Value>,
    increment_failures: u32,
}

impl State {
    fn live_integration(&mut self, id: Uuid) -> Result<&mut Integration, StoreError> {
        if self.deleted_integrations.contains(&id) {
            return Err(StoreError::NotFound);
        }
        self.integrations.get_mut(&id).ok_or(StoreError::NotFound)
    }

    fn job_is_terminal(&self, id: Uuid) -> bool {
        self.jobs
            .get(&id)
            .is_none_or(|(_, job)| job.status.is_terminal())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an advertiser under an organization.
    pub fn add_advertiser(&self, advertiser_id: Uuid, organization_id: Uuid) {
        self.state().advertisers.insert(advertiser_id, organization_id);
    }

    pub fn add_oauth_client(&self, organization_id: Uuid, platform: Platform, client: OAuthClient) {
        self.state()
            .oauth_clients
            .insert((organization_id, platform), client);
    }

    /// Inserts a fully-formed integration as-is.
    pub fn insert_integration(&self, integration: Integration) {
        self.state()
            .integrations
            .insert(integration.id, integration);
    }

    /// Integration by id, including soft-deleted ones.
    #[must_use]
    pub fn integration(&self, id: Uuid) -> Option<Integration> {
        self.state().integrations.get(&id).cloned()
    }

    /// Every integration of `advertiser_id`, including soft-deleted ones.
    #[must_use]
    pub fn integrations_for_advertiser(&self, advertiser_id: Uuid) -> Vec<Integration> {
        self.state()
            .integrations
            .values()
            .filter(|i| i.advertiser_id == advertiser_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_deleted(&self, integration_id: Uuid) -> bool {
        self.state().deleted_integrations.contains(&integration_id)
    }

    #[must_use]
    pub fn secret(&self, id: Uuid) -> Option<String> {
        self.state().secrets.get(&id).cloned()
    }

    #[must_use]
    pub fn session(&self, id: Uuid) -> Option<AuthorizationSession> {
        self.state().sessions.get(&id).cloned()
    }

    /// Chunks of `job_id` ordered by index.
    #[must_use]
    pub fn chunks_for_job(&self, job_id: Uuid) -> Vec<CollectionChunk> {
        let mut chunks: Vec<_> = self
            .state()
            .chunks
            .iter()
            .filter(|c| c.chunk.job_id == job_id)
            .map(|c| c.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    /// Every job for `integration_id`, oldest first.
    #[must_use]
    pub fn jobs_for_integration(&self, integration_id: Uuid) -> Vec<CollectionJob> {
        let mut jobs: Vec<_> = self
            .state()
            .jobs
            .values()
            .filter(|(owner, _)| *owner == integration_id)
            .map(|(_, job)| job.clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.state().metrics.len()
    }

    /// Moves a chunk's `created_at`, to control claim order.
    pub fn set_chunk_created_at(&self, chunk_id: Uuid, created_at: DateTime<Utc>) {
        if let Some(entry) = self
            .state()
            .chunks
            .iter_mut()
            .find(|c| c.chunk.id == chunk_id)
        {
            entry.chunk.created_at = created_at;
        }
    }

    /// The next `n` job outcome writes fail as if the pool timed out.
    pub fn fail_next_increments(&self, n: u32) {
        self.state().increment_failures = n;
    }

    /// Drops every lease, as if they had all lapsed.
    pub fn expire_leases(&self) {
        for entry in &mut self.state().chunks {
            entry.leased_until = None;
        }
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<String, StoreError> {
        self.state()
            .secrets
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put(&self, secret: &str, _description: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.state().secrets.insert(id, secret.to_string());
        Ok(id)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state().secrets.remove(&id).is_some())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn get_integration(&self, id: Uuid) -> Result<Integration, StoreError> {
        self.state().live_integration(id).map(|i| i.clone())
    }

    async fn update_access_token(
        &self,
        id: Uuid,
        access_token_ref: Uuid,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let integration = state.live_integration(id)?;
        integration.access_token_ref = Some(access_token_ref);
        integration.token_expires_at = token_expires_at;
        integration.status = IntegrationStatus::Active;
        integration.last_error = None;
        integration.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_integration_status(
        &self,
        id: Uuid,
        status: IntegrationStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let integration = state.live_integration(id)?;
        integration.status = status;
        if let Some(message) = last_error {
            integration.last_error = Some(message.to_string());
        }
        Ok(())
    }

    async fn set_data_collection_status(
        &self,
        id: Uuid,
        status: DataCollectionStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let integration = state.live_integration(id)?;
        integration.data_collection_status = status;
        if let Some(message) = last_error {
            integration.last_error = Some(message.to_string());
        }
        Ok(())
    }

    async fn create_job(&self, new: &NewCollectionJob) -> Result<CollectionJob, StoreError> {
        self.enqueue_job_with_chunks(new, &[]).await
    }

    async fn enqueue_job_with_chunks(
        &self,
        new: &NewCollectionJob,
        chunks: &[NewChunk],
    ) -> Result<CollectionJob, StoreError> {
        let mut state = self.state();
        state.live_integration(new.integration_id)?.data_collection_status =
            DataCollectionStatus::Collecting;

        let now = Utc::now();
        let job = CollectionJob {
            id: Uuid::new_v4(),
            integration_id: new.integration_id,
            advertiser_id: new.advertiser_id,
            platform: new.platform,
            collection_type: new.collection_type,
            mode: new.mode,
            start_date: new.range.start,
            end_date: new.range.end,
            collection_date: (new.mode == CollectionMode::Daily).then_some(new.range.start),
            status: JobStatus::Pending,
            chunks_total: new.chunks_total,
            chunks_completed: 0,
            chunks_failed: 0,
            error_details: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
        };

        for chunk in chunks {
            state.chunks.push(LeasedChunk {
                chunk: CollectionChunk {
                    id: Uuid::new_v4(),
                    job_id: job.id,
                    integration_id: new.integration_id,
                    chunk_index: chunk.chunk_index,
                    start_date: chunk.range.start,
                    end_date: chunk.range.end,
                    collection_type: new.collection_type,
                    status: ChunkStatus::Pending,
                    retry_count: 0,
                    max_retries: chunk.max_retries,
                    depends_on_job_id: chunk.depends_on_job_id,
                    error_message: None,
                    last_error_at: None,
                    completed_at: None,
                    created_at: now,
                },
                leased_until: None,
            });
        }
        state
            .jobs
            .insert(job.id, (new.integration_id, job.clone()));
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<CollectionJob, StoreError> {
        self.state()
            .jobs
            .get(&id)
            .map(|(_, job)| job.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_jobs_for_integration(
        &self,
        integration_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CollectionJob>, StoreError> {
        let mut jobs = self.jobs_for_integration(integration_id);
        jobs.reverse();
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state();
        let (_, job) = state.jobs.get_mut(&id).ok_or(StoreError::NotFound)?;
        if job.status != JobStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "collection job {id} is not in expected status 'pending'"
            )));
        }
        job.status = JobStatus::Running;
        job.started_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn increment_and_finalize(
        &self,
        job_id: Uuid,
        outcome: ChunkOutcome,
        error: Option<&ChunkErrorDetail>,
    ) -> Result<Option<CollectionJob>, StoreError> {
        let mut state = self.state();
        if state.increment_failures > 0 {
            state.increment_failures -= 1;
            return Err(StoreError::Db(DbError::Sqlx(sqlx::Error::PoolTimedOut)));
        }
        let now = Utc::now();

        let (integration_id, job) = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        let integration_id = *integration_id;
        let mut progress = job.progress();
        if !progress.record(outcome) {
            return Ok(None);
        }
        job.chunks_completed = progress.completed;
        job.chunks_failed = progress.failed;
        if let Some(detail) = error {
            job.error_details.push(detail.clone());
        }
        job.started_at.get_or_insert(now);
        job.status = progress.status();
        if progress.is_terminal() {
            job.completed_at = Some(now);
        }
        let job = job.clone();

        if job.status.is_terminal() {
            let others_active = state.jobs.values().any(|(owner, other)| {
                *owner == integration_id && other.id != job_id && !other.status.is_terminal()
            });
            if let Some(integration) = state.integrations.get_mut(&integration_id) {
                integration.data_collection_status = if others_active {
                    DataCollectionStatus::Collecting
                } else {
                    DataCollectionStatus::from(job.status)
                };
                if matches!(job.status, JobStatus::Partial | JobStatus::Failed) {
                    if let Some(first) = job.first_error() {
                        integration.last_error = Some(first.to_string());
                    }
                }
                integration.last_synced_at = Some(now);
            }
        }
        Ok(Some(job))
    }

    async fn claim_next_pending_chunks(
        &self,
        limit: usize,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<CollectionChunk>, StoreError> {
        let mut state = self.state();
        let now = Utc::now();
        let lease_live = |c: &LeasedChunk| c.leased_until.is_some_and(|until| until > now);

        let busy: HashSet<Uuid> = state
            .chunks
            .iter()
            .filter(|c| c.chunk.status == ChunkStatus::Pending && lease_live(c))
            .map(|c| c.chunk.integration_id)
            .collect();

        let mut candidates: Vec<usize> = state
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.chunk.status == ChunkStatus::Pending
                    && !lease_live(c)
                    && !busy.contains(&c.chunk.integration_id)
                    && state.integrations.contains_key(&c.chunk.integration_id)
                    && !state.deleted_integrations.contains(&c.chunk.integration_id)
                    && c.chunk
                        .depends_on_job_id
                        .is_none_or(|dep| state.job_is_terminal(dep))
            })
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by_key(|&i| (state.chunks[i].chunk.created_at, state.chunks[i].chunk.chunk_index));

        let mut seen = HashSet::new();
        let picked: Vec<usize> = candidates
            .into_iter()
            .filter(|&i| seen.insert(state.chunks[i].chunk.integration_id))
            .take(limit)
            .collect();

        Ok(picked
            .into_iter()
            .map(|i| {
                state.chunks[i].leased_until = Some(lease_until);
                state.chunks[i].chunk.clone()
            })
            .collect())
    }

    async fn get_chunk(&self, id: Uuid) -> Result<CollectionChunk, StoreError> {
        self.state()
            .chunks
            .iter()
            .find(|c| c.chunk.id == id)
            .map(|c| c.chunk.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_chunks_for_job(&self, job_id: Uuid) -> Result<Vec<CollectionChunk>, StoreError> {
        Ok(self.chunks_for_job(job_id))
    }

    async fn complete_chunk(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(entry) = state
            .chunks
            .iter_mut()
            .find(|c| c.chunk.id == id && c.chunk.status == ChunkStatus::Pending)
        else {
            return Ok(false);
        };
        entry.chunk.status = ChunkStatus::Completed;
        entry.chunk.completed_at = Some(Utc::now());
        entry.leased_until = None;
        Ok(true)
    }

    async fn record_chunk_failure(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<Option<ChunkFailure>, StoreError> {
        let mut state = self.state();
        let Some(entry) = state
            .chunks
            .iter_mut()
            .find(|c| c.chunk.id == id && c.chunk.status == ChunkStatus::Pending)
        else {
            return Ok(None);
        };
        let chunk = &mut entry.chunk;
        if chunk.can_retry() {
            chunk.retry_count += 1;
        } else {
            chunk.status = ChunkStatus::Failed;
        }
        chunk.error_message = Some(error_message.to_string());
        chunk.last_error_at = Some(Utc::now());
        entry.leased_until = None;
        Ok(Some(ChunkFailure {
            status: entry.chunk.status,
            retry_count: entry.chunk.retry_count,
        }))
    }

    async fn fail_chunk(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(entry) = state
            .chunks
            .iter_mut()
            .find(|c| c.chunk.id == id && c.chunk.status == ChunkStatus::Pending)
        else {
            return Ok(false);
        };
        entry.chunk.status = ChunkStatus::Failed;
        entry.chunk.error_message = Some(error_message.to_string());
        entry.chunk.last_error_at = Some(Utc::now());
        entry.leased_until = None;
        Ok(true)
    }
}

#[async_trait]
impl AuthorizationStore for MemoryStore {
    async fn advertiser_organization(&self, advertiser_id: Uuid) -> Result<Uuid, StoreError> {
        self.state()
            .advertisers
            .get(&advertiser_id)
            .copied()
            .ok_or(StoreError::NotFound)
    }

    async fn org_oauth_client(
        &self,
        organization_id: Uuid,
        platform: Platform,
    ) -> Result<Option<OAuthClient>, StoreError> {
        Ok(self
            .state()
            .oauth_clients
            .get(&(organization_id, platform))
            .cloned())
    }

    async fn create_session(
        &self,
        new: &NewAuthorizationSession,
    ) -> Result<AuthorizationSession, StoreError> {
        let mut state = self.state();
        if state
            .sessions
            .values()
            .any(|s| s.state_token == new.state_token)
        {
            return Err(StoreError::Conflict("duplicate state token".to_string()));
        }
        let session = AuthorizationSession {
            id: Uuid::new_v4(),
            state_token: new.state_token.clone(),
            advertiser_id: new.advertiser_id,
            platform: new.platform,
            code_verifier: new.code_verifier.clone(),
            client_id: new.client_id.clone(),
            client_secret_ref: new.client_secret_ref,
            redirect_uri: new.redirect_uri.clone(),
            account_id: new.account_id.clone(),
            status: SessionStatus::Pending,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn session_by_state(
        &self,
        state_token: &str,
    ) -> Result<Option<AuthorizationSession>, StoreError> {
        Ok(self
            .state()
            .sessions
            .values()
            .find(|s| s.state_token == state_token)
            .cloned())
    }

    async fn complete_session(&self, id: Uuid) -> Result<bool, StoreError> {
        self.mark_session_status(id, SessionStatus::Completed).await
    }

    async fn mark_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        match state.sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::Pending => {
                session.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_claimed_session(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state();
        match state.sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::Completed => {
                session.status = SessionStatus::Failed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_stale_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuthorizationSession>, StoreError> {
        let mut state = self.state();
        Ok(state
            .sessions
            .values_mut()
            .filter(|s| s.status == SessionStatus::Pending && s.is_expired_at(now))
            .map(|s| {
                s.status = SessionStatus::Expired;
                s.clone()
            })
            .collect())
    }

    async fn replace_integration(&self, new: &NewIntegration) -> Result<Integration, StoreError> {
        let mut state = self.state();
        let State {
            integrations,
            deleted_integrations,
            ..
        } = &mut *state;

        let superseded: Vec<Uuid> = integrations
            .values()
            .filter(|i| {
                i.advertiser_id == new.advertiser_id
                    && i.platform == new.platform
                    && !deleted_integrations.contains(&i.id)
            })
            .map(|i| i.id)
            .collect();
        for id in superseded {
            if let Some(existing) = integrations.get_mut(&id) {
                existing.status = IntegrationStatus::Inactive;
            }
            deleted_integrations.insert(id);
        }

        let now = Utc::now();
        let integration = Integration {
            id: Uuid::new_v4(),
            advertiser_id: new.advertiser_id,
            platform: new.platform,
            integration_type: new.integration_type,
            status: IntegrationStatus::Active,
            data_collection_status: DataCollectionStatus::Idle,
            account_id: new.account_id.clone(),
            client_id: new.client_id.clone(),
            access_token_ref: new.access_token_ref,
            legacy_access_token_ref: None,
            refresh_token_ref: new.refresh_token_ref,
            client_secret_ref: new.client_secret_ref,
            token_expires_at: new.token_expires_at,
            last_error: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        integrations.insert(integration.id, integration.clone());
        Ok(integration)
    }
}

#[async_trait]
impl MetricsSink for MemoryStore {
    async fn upsert_rows(
        &self,
        platform: Platform,
        account_id: &str,
        collection_type: CollectionType,
        rows: &[MetricRow],
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        for row in rows {
            state.metrics.insert(
                (
                    platform,
                    account_id.to_string(),
                    collection_type,
                    row.metric_date,
                    row.entity_id.clone(),
                ),
                row.payload.clone(),
            );
        }
        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{integration, range};

    fn new_job(integration: &Integration, total: i32) -> NewCollectionJob {
        NewCollectionJob {
            integration_id: integration.id,
            advertiser_id: integration.advertiser_id,
            platform: integration.platform,
            collection_type: CollectionType::Ads,
            mode: CollectionMode::Initial,
            range: range("2024-01-01", "2024-01-03"),
            chunks_total: total,
        }
    }

    fn new_chunk(index: i32, depends_on: Option<Uuid>) -> NewChunk {
        NewChunk {
            chunk_index: index,
            range: range("2024-01-01", "2024-01-01"),
            max_retries: 3,
            depends_on_job_id: depends_on,
        }
    }

    #[tokio::test]
    async fn claim_returns_one_chunk_per_integration_and_leases_it() {
        let store = MemoryStore::new();
        let a = integration(Platform::Google);
        let b = integration(Platform::Meta);
        store.insert_integration(a.clone());
        store.insert_integration(b.clone());
        store
            .enqueue_job_with_chunks(&new_job(&a, 2), &[new_chunk(0, None), new_chunk(1, None)])
            .await
            .unwrap();
        store
            .enqueue_job_with_chunks(&new_job(&b, 1), &[new_chunk(0, None)])
            .await
            .unwrap();

        let lease = Utc::now() + chrono::Duration::minutes(11);
        let claimed = store.claim_next_pending_chunks(10, lease).await.unwrap();
        assert_eq!(claimed.len(), 2);
        let owners: HashSet<_> = claimed.iter().map(|c| c.integration_id).collect();
        assert_eq!(owners.len(), 2);

        // Both integrations now hold a live lease.
        assert!(store.claim_next_pending_chunks(10, lease).await.unwrap().is_empty());

        store.expire_leases();
        assert_eq!(store.claim_next_pending_chunks(10, lease).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_outcome_past_total_is_ignored() {
        let store = MemoryStore::new();
        let a = integration(Platform::Naver);
        store.insert_integration(a.clone());
        let job = store.create_job(&new_job(&a, 1)).await.unwrap();

        let done = store
            .increment_and_finalize(job.id, ChunkOutcome::Completed, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(store
            .increment_and_finalize(job.id, ChunkOutcome::Failed, None)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.integration(a.id).unwrap().data_collection_status,
            DataCollectionStatus::Completed
        );
    }

    #[tokio::test]
    async fn replace_soft_deletes_previous_integration() {
        let store = MemoryStore::new();
        let old = integration(Platform::Meta);
        let mut other_platform = integration(Platform::Google);
        other_platform.advertiser_id = old.advertiser_id;
        store.insert_integration(old.clone());
        store.insert_integration(other_platform.clone());

        let new = store
            .replace_integration(&NewIntegration {
                advertiser_id: old.advertiser_id,
                platform: Platform::Meta,
                integration_type: old.integration_type,
                account_id: old.account_id.clone(),
                client_id: None,
                access_token_ref: None,
                refresh_token_ref: None,
                client_secret_ref: None,
                token_expires_at: None,
            })
            .await
            .unwrap();

        assert_ne!(new.id, old.id);
        assert!(store.is_deleted(old.id));
        assert_eq!(
            store.integration(old.id).unwrap().status,
            IntegrationStatus::Inactive
        );
        assert!(!store.is_deleted(other_platform.id));
        assert!(matches!(
            store.get_integration(old.id).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(store.get_integration(new.id).await.unwrap().id, new.id);
    }
}
