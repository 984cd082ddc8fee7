use anyhow::Result;
use axum::Router;
use clap::Parser;
use search_pool::PoolConfig;
use server::{build_app, AppConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Snapshot to import at startup (.json or .bin)
    #[arg(long, env = "SEARCH_SNAPSHOT")]
    snapshot: Option<PathBuf>,
    /// Host to bind
    #[arg(long, env = "SEARCH_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "SEARCH_PORT", default_value_t = 8080)]
    port: u16,
    /// Search workers; index tasks always run on the first one
    #[arg(long, env = "SEARCH_WORKERS", default_value_t = 1)]
    search_workers: usize,
    /// Artifact analysis workers (defaults to min(cpus, 4))
    #[arg(long, env = "ARTIFACT_WORKERS")]
    artifact_workers: Option<usize>,
    /// Abort long batch tasks after this many seconds
    #[arg(long, env = "TASK_TIMEOUT_SECS")]
    task_timeout_secs: Option<u64>,
    /// Token required in X-ADMIN-TOKEN for mutating endpoints
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
    /// Comma-separated CORS origins
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    cors_allow_origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let defaults = PoolConfig::default();
    let config = AppConfig {
        snapshot: args.snapshot,
        pool: PoolConfig {
            search_workers: args.search_workers.max(1),
            artifact_workers: args.artifact_workers.unwrap_or(defaults.artifact_workers),
            task_timeout: args.task_timeout_secs.map(Duration::from_secs),
        },
        admin_token: args.admin_token,
        cors_allow_origin: args.cors_allow_origin,
    };
    let app: Router = build_app(config).await?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
