use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub platforms_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    pub worker_batch_size: usize,
    pub worker_chunk_timeout_secs: u64,
    /// Six-field cron expression; when set the server drives the queue
    /// worker itself instead of waiting for an external trigger.
    pub worker_cron: Option<String>,
    pub oauth_redirect_uri: String,
    pub app_redirect_url: String,
    pub google_developer_token: Option<String>,
}

impl AppConfig {
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.env == Environment::Development
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("platforms_path", &self.platforms_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("worker_batch_size", &self.worker_batch_size)
            .field("worker_chunk_timeout_secs", &self.worker_chunk_timeout_secs)
            .field("worker_cron", &self.worker_cron)
            .field("oauth_redirect_uri", &self.oauth_redirect_uri)
            .field("app_redirect_url", &self.app_redirect_url)
            .field(
                "google_developer_token",
                &self.google_developer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
