//! session-gateway server entry point.
//!
//! Loads the YAML configuration, installs logging, connects the primary and
//! replica pools, and serves the REST endpoints until ctrl-c.

use std::path::PathBuf;

use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use session_gateway::api;
use session_gateway::app_state::AppState;
use session_gateway::config::AppConfig;
use session_gateway::db::{PoolManager, SqlLogger};
use session_gateway::logging;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let (config, config_path) = AppConfig::discover(&args.config)?;

    // Initialize tracing
    let _log_guards = logging::init(&config.log)?;
    tracing::info!(config = %config_path.display(), "starting session-gateway");

    // Connect primary and replicas
    let sql_logger = SqlLogger::tracing(config.sql_logger_config());
    let pools = PoolManager::new();
    let db = pools.init(&config.database, sql_logger).await?.clone();

    // Build router
    let mut app = api::build_router().layer(CorsLayer::permissive());
    if !config.web.is_prod() {
        app = app.layer(TraceLayer::new_for_http());
    }
    let app: Router = app.with_state(AppState::new(db.clone()));

    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };

    // Start server
    let addr = config.web.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
