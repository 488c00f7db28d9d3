//! Visioneer application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize logging
//! 3. Open the SQLite database, optionally seeding the demo catalog
//! 4. Assemble the agent and its collaborators
//! 5. Serve the axum API until the process exits

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use visioneer_api::auth::load_or_generate_token;
use visioneer_api::{start_server, AppState};
use visioneer_core::config::VisioneerConfig;
use visioneer_storage::{seed_demo_catalog, Database};

use crate::cli::CliArgs;

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before the subscriber exists; report the outcome after.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match VisioneerConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (VisioneerConfig::default(), Some(e)),
    };

    init_tracing(&args.resolve_log_filter(&config.general.log_level));
    tracing::info!("Starting Visioneer v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Configuration not loaded; using defaults"
        ),
    }

    config.general.port = args.resolve_port(config.general.port);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Storage.
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = config.database_path();
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    if args.seed_demo {
        let report = seed_demo_catalog(&db)?;
        tracing::info!(
            categories = report.categories,
            products = report.products,
            seller_id = report.seller_id,
            "Demo catalog seeded"
        );
    }

    // Agent and API.
    let token_path = config.token_path();
    let port = config.general.port;
    let mut state = AppState::from_database(config, db)?;
    state.api_token = load_or_generate_token(&token_path);

    if let Err(e) = start_server(state).await {
        tracing::error!(error = %e, "API server stopped");
        tracing::error!("Is another instance running? Try: VISIONEER_PORT={} visioneer", port.saturating_add(1));
        return Err(e.into());
    }

    Ok(())
}
