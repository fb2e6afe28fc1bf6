use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use archiva_core::{AppContext, ArchivaConfig, Database};
use archiva_scheduler::{SchedulerEngine, TaskDeps};

mod http;
mod tasks;

/// Archiva media-library daemon.
#[derive(Parser)]
#[command(name = "archivad", version)]
struct Cli {
    /// Path to archiva.toml (default: ~/.archiva/archiva.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archivad=info,archiva_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ArchivaConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ArchivaConfig::default()
    });

    let bind = config.http.bind.clone();
    let port = config.http.port;

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = Database::open(&db_path)?;

    let app = Arc::new(AppContext::new(config.clone()));
    let deps = TaskDeps {
        db,
        app,
        default_interval: Duration::from_secs(config.scheduler.default_interval_secs),
    };

    let registry = tasks::builtin_registry()?;
    let mut engine = SchedulerEngine::new(&config.scheduler);
    let discovered = engine.discover(&registry, &deps);
    info!(tasks = discovered, "task discovery complete");

    let scheduler = engine.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_join = tokio::spawn(engine.run(shutdown_rx));

    let router = http::build_router(scheduler);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("archiva daemon listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP surface is down; stop dispatching and drain in-flight work.
    let _ = shutdown_tx.send(true);
    engine_join.await?;
    info!("archiva daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
