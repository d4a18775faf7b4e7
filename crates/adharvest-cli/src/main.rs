mod collect;
mod worker;

use std::sync::Arc;

use adharvest_collector::{CollectorContext, CollectorSettings, Stores};
use adharvest_core::{CollectionMode, CollectionType};
use adharvest_platforms::{HttpSettings, PlatformAdapters};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "adharvest-cli")]
#[command(about = "Ad performance harvesting command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run or queue collections for one integration
    Collect {
        #[command(subcommand)]
        command: CollectCommands,
    },
    /// Drain the chunk queue
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Print a usable access token for an integration, refreshing it if due
    ResolveToken {
        #[arg(long)]
        integration: Uuid,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Subcommand)]
enum CollectCommands {
    /// Collect a date range synchronously, chunk by chunk
    Direct {
        #[arg(long)]
        integration: Uuid,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "manual")]
        mode: CollectionMode,
        #[arg(long = "type", default_value = "ads")]
        collection_type: CollectionType,
    },
    /// Queue the platform's initial backfill jobs for the queue worker
    Initial {
        #[arg(long)]
        integration: Uuid,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[derive(Debug, Subcommand)]
enum WorkerCommands {
    /// Claim and process one batch of chunks
    RunOnce {
        /// Keep claiming batches until the queue yields nothing.
        #[arg(long)]
        drain: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("adharvest-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = adharvest_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adharvest_db::PoolConfig::from_app_config(&config);
    let pool = adharvest_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                adharvest_db::ping(&pool).await?;
                println!("database reachable");
            }
            DbCommands::Migrate => {
                let applied = adharvest_db::run_migrations(&pool).await?;
                println!("migrations applied: {applied}");
            }
        },
        Commands::Collect { command } => {
            let ctx = build_context(&config, pool)?;
            match command {
                CollectCommands::Direct {
                    integration,
                    start,
                    end,
                    mode,
                    collection_type,
                } => {
                    collect::run_direct_collection(
                        &ctx,
                        integration,
                        start,
                        end,
                        mode,
                        collection_type,
                    )
                    .await?;
                }
                CollectCommands::Initial {
                    integration,
                    start,
                    end,
                } => {
                    collect::run_initial(&ctx, integration, start, end).await?;
                }
            }
        }
        Commands::Worker { command } => {
            let ctx = build_context(&config, pool)?;
            match command {
                WorkerCommands::RunOnce { drain } => worker::run_worker(ctx, drain).await?,
            }
        }
        Commands::ResolveToken { integration } => {
            let ctx = build_context(&config, pool)?;
            collect::resolve_token(&ctx, integration).await?;
        }
    }

    Ok(())
}

/// Collector wired to Postgres and the production platform APIs.
fn build_context(
    config: &adharvest_core::AppConfig,
    pool: sqlx::PgPool,
) -> anyhow::Result<Arc<CollectorContext>> {
    let platforms = adharvest_core::load_platforms(&config.platforms_path)?;
    let http = HttpSettings {
        timeout_secs: config.http_timeout_secs,
        user_agent: config.http_user_agent.clone(),
    };
    let adapters =
        PlatformAdapters::production(&http, &platforms, config.google_developer_token.as_deref())?;

    Ok(Arc::new(CollectorContext::new(
        Stores::postgres(pool),
        adapters,
        platforms,
        CollectorSettings::from_app_config(config),
    )))
}

#[cfg(test)]
mod tests;
