//! `agrimartd` — the AgriMart marketplace server binary.
//!
//! Usage:
//!   agrimartd [--data-dir <dir>] [--listen <addr>]
//!
//! The data directory holds the SQLite database and the uploads tree;
//! both are created on first start.

mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use agrimart_core::{Module, ServiceConfig};
use market::service::MarketService;
use market::MarketModule;

/// AgriMart marketplace server.
#[derive(Parser, Debug)]
#[command(name = "agrimartd", about = "AgriMart marketplace server")]
struct Cli {
    /// Base data directory (database file + uploads).
    #[arg(long = "data-dir", default_value = "./data")]
    data_dir: PathBuf,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = ServiceConfig {
        data_dir: Some(cli.data_dir.clone()),
        listen: cli.listen,
        ..Default::default()
    };
    std::fs::create_dir_all(&cli.data_dir)?;

    // Initialize storage backends.
    let sql: Arc<dyn sql::SQLStore> = Arc::new(
        sql::SqliteStore::open(&config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let uploads_dir = config.resolve_blob_dir();
    let blob: Arc<dyn blob::BlobStore> = Arc::new(
        blob::FileStore::open(&uploads_dir)
            .map_err(|e| anyhow::anyhow!("failed to open blob store: {}", e))?,
    );

    let market_module = MarketModule::new(
        MarketService::new(Arc::clone(&sql), Arc::clone(&blob))
            .map_err(|e| anyhow::anyhow!("failed to initialize market module: {}", e))?,
    );
    info!("market module initialized");

    let module_routes = vec![(
        market_module.name().to_string(),
        market_module.routes(),
    )];

    let app = routes::build_router(module_routes, &uploads_dir);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("agrimartd listening on {}", config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
