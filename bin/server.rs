// 22POULTRY - Web Server
// REST API with Axum over the shared SQLite database

use anyhow::{Context, Result};
use clap::Parser;
use poultry22::api::{router, AppState};
use poultry22::logging::init_tracing;
use poultry22::policy::{apply_policies, PolicySet};
use poultry22::{open_database, BucketStore, Settings};

#[derive(Debug, Parser)]
#[command(name = "poultry22-server", version, about = "22POULTRY API server")]
struct Cli {
    #[command(flatten)]
    settings: Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings;
    init_tracing(settings.log_json);

    let conn = open_database(&settings.db_path)?;
    if PolicySet::load(&conn)?.is_empty() {
        let applied = apply_policies(&conn)?;
        tracing::info!(tables = applied, "no stored policies found, applied defaults");
    }
    tracing::info!(path = %settings.db_path.display(), "database opened");

    std::fs::create_dir_all(&settings.storage_root).with_context(|| {
        format!("Failed to create storage root {}", settings.storage_root.display())
    })?;
    let store = BucketStore::new(settings.storage_root.clone());

    let app = router(AppState::new(conn, store, settings.transitions));

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind))?;

    tracing::info!(
        addr = %settings.bind,
        transitions = ?settings.transitions,
        "server running"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
