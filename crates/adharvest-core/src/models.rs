//! Records shared between persistence and the collection core.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunking::DateRange;
use crate::domain::{
    ChunkStatus, CollectionMode, CollectionType, DataCollectionStatus, IntegrationStatus,
    IntegrationType, JobStatus, Platform, SessionStatus,
};
use crate::job_state::JobProgress;

/// One credential binding between an advertiser account and a platform.
///
/// Secrets are never held inline; each `*_ref` points into the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub integration_type: IntegrationType,
    pub status: IntegrationStatus,
    pub data_collection_status: DataCollectionStatus,
    /// Platform account identifier (Google customer id, Meta ad account id,
    /// Naver customer id).
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    /// Current vault reference for the access token (or API key).
    pub access_token_ref: Option<Uuid>,
    /// Reference written by older deployments, read only as a fallback.
    pub legacy_access_token_ref: Option<Uuid>,
    pub refresh_token_ref: Option<Uuid>,
    /// OAuth client secret, or the Naver API secret key in token mode.
    pub client_secret_ref: Option<Uuid>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create an integration.
#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub integration_type: IntegrationType,
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    pub access_token_ref: Option<Uuid>,
    pub refresh_token_ref: Option<Uuid>,
    pub client_secret_ref: Option<Uuid>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// One (integration, collection type, date range) unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionJob {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub collection_type: CollectionType,
    pub mode: CollectionMode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Set for daily-mode jobs only.
    pub collection_date: Option<NaiveDate>,
    pub status: JobStatus,
    pub chunks_total: i32,
    pub chunks_completed: i32,
    pub chunks_failed: i32,
    /// Chunk failures in arrival order; the first entry is the first error.
    pub error_details: Vec<ChunkErrorDetail>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CollectionJob {
    #[must_use]
    pub fn progress(&self) -> JobProgress {
        JobProgress {
            total: self.chunks_total,
            completed: self.chunks_completed,
            failed: self.chunks_failed,
        }
    }

    #[must_use]
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// The first recorded chunk error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.error_details.first().map(|d| d.message.as_str())
    }
}

/// One entry in a job's `error_details` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkErrorDetail {
    pub chunk_index: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCollectionJob {
    pub integration_id: Uuid,
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub collection_type: CollectionType,
    pub mode: CollectionMode,
    pub range: DateRange,
    pub chunks_total: i32,
}

/// One atomic fetch unit of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionChunk {
    pub id: Uuid,
    pub job_id: Uuid,
    pub integration_id: Uuid,
    pub chunk_index: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub collection_type: CollectionType,
    pub status: ChunkStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Job that must be terminal before this chunk may be claimed.
    pub depends_on_job_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CollectionChunk {
    #[must_use]
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Another failure would still leave retries in hand.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// A chunk to be inserted for a freshly created job.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub range: DateRange,
    pub max_retries: i32,
    pub depends_on_job_id: Option<Uuid>,
}

/// Pending OAuth authorization awaiting the provider callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationSession {
    pub id: Uuid,
    pub state_token: String,
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub code_verifier: Option<String>,
    pub client_id: String,
    /// Temporary vault reference, deleted once the callback completes.
    pub client_secret_ref: Uuid,
    pub redirect_uri: String,
    pub account_id: Option<String>,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationSession {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewAuthorizationSession {
    pub state_token: String,
    pub advertiser_id: Uuid,
    pub platform: Platform,
    pub code_verifier: Option<String>,
    pub client_id: String,
    pub client_secret_ref: Uuid,
    pub redirect_uri: String,
    pub account_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// One normalized row returned by a platform fetch.
///
/// `(platform, account_id, collection_type, metric_date, entity_id)` is the
/// upsert key, so fetching the same range twice never duplicates rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub metric_date: NaiveDate,
    /// Ad id, `{ad_id}:{age}:{gender}` breakdown key, creative id, and so on.
    pub entity_id: String,
    pub payload: serde_json::Value,
}

/// Organization-level OAuth client registered for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret_ref: Uuid,
}
