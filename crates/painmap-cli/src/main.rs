mod cluster;

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use painmap_clustering::{ClusteringService, PgStore};
use painmap_core::{AppConfig, RunType};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "painmap-cli")]
#[command(about = "Pain-theme clustering command line interface")]
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
    /// Start and inspect clustering runs
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
    /// Theme severity maintenance
    Severity {
        #[command(subcommand)]
        command: SeverityCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[derive(Debug, Subcommand)]
enum ClusterCommands {
    /// Start a run and execute it in the foreground
    Run {
        #[arg(long = "type", value_enum, default_value_t = RunKind::Incremental)]
        run_type: RunKind,
    },
    /// Show the most recent run
    Status,
    /// Mark every pending or running run as failed
    Cancel,
}

#[derive(Debug, Subcommand)]
enum SeverityCommands {
    /// Recompute severity for one theme, or all active themes
    Recalc {
        #[arg(long)]
        theme: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunKind {
    Full,
    Incremental,
}

impl From<RunKind> for RunType {
    fn from(kind: RunKind) -> Self {
        match kind {
            RunKind::Full => RunType::Full,
            RunKind::Incremental => RunType::Incremental,
        }
    }
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = painmap_db::PoolConfig::from_app_config(config);
    let pool = painmap_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}

fn clustering_service(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<ClusteringService> {
    let store = Arc::new(PgStore::new(pool));
    Ok(ClusteringService::from_config(store, config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = painmap_core::load_app_config_from_env()?;
    init_tracing(&config)?;

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("painmap-cli ready; see --help");
        return Ok(());
    };

    let pool = connect(&config).await?;
    match command {
        Commands::Db { command } => match command {
            DbCommands::Migrate => {
                let applied = painmap_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
            DbCommands::Ping => {
                painmap_db::ping(&pool).await?;
                println!("database reachable");
            }
        },
        Commands::Cluster { command } => {
            let service = clustering_service(pool, &config)?;
            match command {
                ClusterCommands::Run { run_type } => {
                    cluster::run_clustering(&service, run_type.into()).await?;
                }
                ClusterCommands::Status => cluster::show_status(&service).await?,
                ClusterCommands::Cancel => cluster::cancel_runs(&service).await?,
            }
        }
        Commands::Severity { command } => {
            let service = clustering_service(pool, &config)?;
            match command {
                SeverityCommands::Recalc { theme } => {
                    cluster::recalculate_severity(&service, theme).await?;
                }
            }
        }
    }

    Ok(())
}
