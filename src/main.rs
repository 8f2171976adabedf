mod api;
mod config;
mod error;
mod executor;
mod models;
mod paths;
mod repository;
mod services;

use crate::config::Config;
use crate::executor::ExecutionPipeline;
use crate::repository::{ExecutionRepository, ScriptRepository, establish_connection};
use crate::services::{ExecutionService, ScriptService};
use api::create_router;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "script_desk=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting script_desk with config: {:?}", config);

    if let Some(path) = sqlite_file_path(&config.database_url) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Establish database connection
    let db_pool = establish_connection(&config.database_url).await?;
    tracing::info!("Database connected: {}", config.database_url);

    // Initialize repositories
    let script_repo = ScriptRepository::new(db_pool.clone());
    let execution_repo = ExecutionRepository::new(db_pool);

    // Initialize services
    let pipeline = ExecutionPipeline::new(
        execution_repo.clone(),
        config.interpreter.clone(),
        config.script_timeout(),
    );
    tracing::info!(
        "Scripts run with {} ({:?} dialect), timeout {:?}",
        config.interpreter.display_name(),
        config.interpreter.dialect,
        config.script_timeout()
    );
    let script_service = ScriptService::new(script_repo.clone());
    let execution_service = ExecutionService::new(execution_repo, script_repo, pipeline);

    // Create router
    let app = create_router(script_service, execution_service);
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let addr = addr.parse::<SocketAddr>()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}

/// File path of an on-disk sqlite url, without the `sqlite:` scheme or query.
fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(path)
}
