//! Draft planner API server
//!
//! Serves the JSON snapshots written by `draft-planner-etl` and the front-end
//! page. Snapshots are re-read on every request, so a rebuild shows up without
//! a restart.

use anyhow::{Context, Result};
use tracing::{info, warn};

use draft_planner::api::{self, AppState};
use draft_planner::config::{self, Config};

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    draft_planner::init_tracing();

    info!("Draft planner API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if !config.data_dir.is_dir() {
        warn!(
            "Data directory {} does not exist; snapshot routes will return 404",
            config.data_dir.display()
        );
    }
    if config.synthesize_missing_history {
        info!("Synthetic history enabled while no history snapshot exists");
    }

    let app = api::router(AppState::new(&config), &config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving snapshots from {} on {}", config.data_dir.display(), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
