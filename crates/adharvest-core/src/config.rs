use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("ADHARVEST_ENV", "development"))?;

    let bind_addr = parse_addr("ADHARVEST_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("ADHARVEST_LOG_LEVEL", "info");
    let platforms_path = PathBuf::from(or_default(
        "ADHARVEST_PLATFORMS_PATH",
        "./config/platforms.yaml",
    ));

    let db_max_connections = parse_u32("ADHARVEST_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("ADHARVEST_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "ADHARVEST_DB_MIN_CONNECTIONS",
            format!("must not exceed ADHARVEST_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("ADHARVEST_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let http_timeout_secs = parse_u64("ADHARVEST_HTTP_TIMEOUT_SECS", "30")?;
    let http_user_agent = or_default(
        "ADHARVEST_HTTP_USER_AGENT",
        "adharvest/0.1 (ad-performance-collector)",
    );

    let worker_batch_size = parse_usize("ADHARVEST_WORKER_BATCH_SIZE", "10")?;
    if worker_batch_size == 0 {
        return Err(invalid(
            "ADHARVEST_WORKER_BATCH_SIZE",
            "must be at least 1".to_string(),
        ));
    }
    let worker_chunk_timeout_secs = parse_u64("ADHARVEST_WORKER_CHUNK_TIMEOUT_SECS", "600")?;
    let worker_cron = optional("ADHARVEST_WORKER_CRON");

    let oauth_redirect_uri = or_default(
        "ADHARVEST_OAUTH_REDIRECT_URI",
        "http://localhost:3000/api/v1/oauth/callback",
    );
    let app_redirect_url = or_default(
        "ADHARVEST_APP_REDIRECT_URL",
        "http://localhost:5173/integrations",
    );
    let google_developer_token = optional("GOOGLE_ADS_DEVELOPER_TOKEN");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        platforms_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        http_timeout_secs,
        http_user_agent,
        worker_batch_size,
        worker_chunk_timeout_secs,
        worker_cron,
        oauth_redirect_uri,
        app_redirect_url,
        google_developer_token,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ADHARVEST_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
