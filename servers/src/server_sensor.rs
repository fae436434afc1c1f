//! # Sensor Data Server
//!
//! Serves the readings written by `sensor_ingest` to web clients:
//! `/data`, `/data/all`, `/health` and the `/replace` event stream.
//!
//! Reads go through a `deadpool-postgres` pool, one connection per query.
//! The latest reading is cached for a few seconds and shared by every
//! stream client, so many open streams cost one query per cache window.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod sensor_logic;
mod web_logic;

use lib_sensor::connections::{PgReadingQuery, ReadingQuery, create_pool, mask_url_password};
use sensor_logic::{config, logger, shutdown};
use web_logic::{routes, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let _guard = logger::setup_logging(&config, "server_sensor")?;

    let db_url = config.db_url();
    let pool = create_pool(&db_url, config.db_pool_size())?;
    info!(url = %mask_url_password(&db_url), max_size = config.db_pool_size(), "Database pool created");

    let query: Arc<dyn ReadingQuery> = Arc::new(PgReadingQuery::new(pool));
    let state = AppState::new(query, config.cache_ttl(), config.stream_interval());
    let stream_shutdown = state.shutdown_token();
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown::shutdown_signal().await;
            // Open event streams would otherwise hold the server open.
            stream_shutdown.cancel();
        })
        .await?;

    info!("Shutdown complete.");
    Ok(())
}
