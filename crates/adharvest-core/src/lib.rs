pub mod app_config;
pub mod chunking;
pub mod config;
pub mod domain;
pub mod job_state;
pub mod models;
pub mod platforms;

use chrono::NaiveDate;
use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use chunking::{plan_chunks, ChunkSize, DateRange};
pub use config::{load_app_config, load_app_config_from_env};
pub use domain::{
    ChunkStatus, CollectionMode, CollectionType, DataCollectionStatus, IntegrationStatus,
    IntegrationType, JobStatus, Platform, SessionStatus,
};
pub use job_state::{ChunkOutcome, JobProgress};
pub use models::{
    AuthorizationSession, ChunkErrorDetail, CollectionChunk, CollectionJob, Integration,
    MetricRow, NewAuthorizationSession, NewChunk, NewCollectionJob, NewIntegration, OAuthClient,
};
pub use platforms::{load_platforms, parse_platforms, PlatformConfig, PlatformRegistry};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid platform configuration: {0}")]
    Validation(String),

    #[error("failed to read platforms file {path}: {source}")]
    PlatformsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse platforms file: {0}")]
    PlatformsFileParse(#[source] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
