use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use feedfilter::config::Config;
use feedfilter::proxy::{build_client, FeedProxy};
use feedfilter::server::{self, AdminAuth, AppState};
use feedfilter::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "feedfilter",
    about = "Filtering proxy for RSS and Atom feeds",
    version
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "feedfilter.toml")]
    config: PathBuf,

    /// Listen address, overrides `listen_addr`
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// SQLite database file, overrides `database_path`
    #[arg(long, value_name = "FILE")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }
    tracing::debug!(config = ?config, "Effective configuration");

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The database at {} is locked by another process.",
                config.database_path
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = build_client().context("Failed to build HTTP client")?;
    let proxy = FeedProxy::new(client, config.fetch_options());

    if config.admin_api_enabled && config.admin_token.is_none() {
        tracing::warn!("Admin API is enabled but no admin token is set; /api will answer 403");
    }
    let auth = AdminAuth::new(config.admin_api_enabled, config.admin_token.clone());

    let state = Arc::new(AppState::new(db.clone(), proxy, auth));
    let app = server::router(state);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    db.close().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
