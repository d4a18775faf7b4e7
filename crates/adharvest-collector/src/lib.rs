//! Collection core: credentials, OAuth, backfill planning, the direct
//! collector and the queue worker.
//!
//! Persistence and secrets are reached through the capability traits in
//! [`store`]; platforms through [`adharvest_platforms::PlatformAdapter`].

pub mod context;
pub mod credentials;
pub mod direct;
pub mod error;
pub mod executor;
pub mod oauth;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{CollectorContext, CollectorSettings};
pub use credentials::{CredentialResolver, ResolvedCredential, TokenResponse};
pub use direct::{run_direct, run_single_chunk, DirectReport, DirectRequest};
pub use error::{CollectError, CredentialError, OAuthError};
pub use executor::execute_chunk;
pub use oauth::{
    abandon_oauth, complete_oauth, initiate_oauth, sweep_expired_sessions, CredentialSource,
    InitiateRequest, InitiateResponse,
};
pub use orchestrator::{run_initial_collection, spawn_initial_collection};
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use store::{
    AuthorizationStore, CollectionStore, MemoryStore, MetricsSink, PgStore, SecretStore,
    StoreError, Stores,
};
pub use worker::{QueueWorker, WorkerReport};
