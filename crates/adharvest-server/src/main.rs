mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use adharvest_collector::{CollectorContext, CollectorSettings, Stores};
use adharvest_platforms::{HttpSettings, PlatformAdapters};
use anyhow::Context;
use reqwest::Url;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = adharvest_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adharvest_db::PoolConfig::from_app_config(&config);
    let pool = adharvest_db::connect_pool(&config.database_url, pool_config).await?;
    adharvest_db::run_migrations(&pool).await?;

    let platforms = adharvest_core::load_platforms(&config.platforms_path)?;
    let http = HttpSettings {
        timeout_secs: config.http_timeout_secs,
        user_agent: config.http_user_agent.clone(),
    };
    let adapters =
        PlatformAdapters::production(&http, &platforms, config.google_developer_token.as_deref())?;
    let app_redirect_url = Url::parse(&config.app_redirect_url)
        .with_context(|| format!("invalid APP_REDIRECT_URL: {}", config.app_redirect_url))?;

    let collector = Arc::new(CollectorContext::new(
        Stores::postgres(pool.clone()),
        adapters,
        platforms,
        CollectorSettings::from_app_config(&config),
    ));

    let _scheduler =
        scheduler::build_scheduler(Arc::clone(&collector), config.worker_cron.as_deref()).await?;

    let auth = AuthState::from_env(config.is_development())?;
    let state = AppState {
        collector,
        pool: Some(pool),
        app_redirect_url,
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "adharvest server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
