use anyhow::{Context, Result};
use clap::Parser;
use seige_orchestration::{
    JobSubmitter, PipelineComponents, PipelineOrchestrator, RunnerConfig, TokioCommandRunner,
    TokioScheduler,
};
use seige_server::{router, AppState, APP_NAME};
use seige_storage::{ExecutionStore, InMemoryExecutionStore, SqliteExecutionStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "seige-server")]
#[command(about = "HTTP service that runs SEIGE analysis pipelines")]
struct Args {
    /// Runner configuration (YAML); defaults plus SEIGE_* overrides when omitted
    #[arg(long, env = "SEIGE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "SEIGE_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// SQLite database file; in-memory store when omitted
    #[arg(long, env = "SEIGE_DATABASE")]
    database: Option<PathBuf>,

    #[arg(long, env = "SEIGE_LOG_JSON")]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

fn open_store(database: Option<&PathBuf>) -> Result<Arc<dyn ExecutionStore>> {
    match database {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let store = SqliteExecutionStore::open(path)
                .with_context(|| format!("opening database {}", path.display()))?;
            info!("Execution store: sqlite at {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            warn!("No --database given; execution records are kept in memory only");
            Ok(Arc::new(InMemoryExecutionStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let config = match &args.config {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunnerConfig::from_env().context("loading config from environment")?,
    };
    let config = Arc::new(config);
    info!(
        "Engine at {} (fallback container {}), test generation {}",
        config.engine.host,
        config.engine.container_name,
        if config.test_generation.enabled { "enabled" } else { "disabled" }
    );

    let store = open_store(args.database.as_ref())?;
    let components =
        PipelineComponents::from_config(&config, store, Arc::new(TokioCommandRunner))
            .context("wiring pipeline components")?;
    let orchestrator = Arc::new(PipelineOrchestrator::new(components));
    let submitter = Arc::new(
        JobSubmitter::new(
            orchestrator,
            Arc::new(TokioScheduler),
            config.workspace.root.clone(),
        )
        .with_extract_limit(config.workspace.max_extracted_bytes),
    );

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("{} listening on http://{}", APP_NAME, args.bind);

    axum::serve(listener, router(AppState::new(submitter)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
