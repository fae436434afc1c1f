//! # Sensor Ingestion
//!
//! Reads the water-quality sensor over a serial port and stores every usable
//! line in PostgreSQL.
//!
//! Startup failures (no port, port busy, database unreachable) exit non-zero.
//! Once running, the loop stops on Ctrl-C/SIGTERM, or aborts with a non-zero
//! exit after too many consecutive unparsable lines.

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod sensor_logic;

use lib_sensor::connections::{PgConnector, ReadingStore};
use lib_sensor::ingestors::{IngestExit, IngestionLoop, SerialPortLink, default_port, list_ports};
use sensor_logic::{config, logger, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let _guard = logger::setup_logging(&config, "sensor_ingest")?;

    if config.list_ports {
        let ports = list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found.");
        }
        for port in ports {
            println!("{}\t{}", port.name, port.description);
        }
        return Ok(());
    }

    let connector = PgConnector::new(&config.db_url())?;

    if config.check_db {
        let mut store = ReadingStore::new(connector);
        store.connect().await?;
        store.ensure_schema().await?;
        store.close();
        println!("Database connection OK, table sensor_readings ready.");
        return Ok(());
    }

    let port = match config.serial_port.clone() {
        Some(port) => port,
        None => {
            let port = default_port()?;
            info!(%port, "No serial port configured, using the first one found");
            port
        }
    };

    let link = SerialPortLink::open(config.serial_settings(port))?;
    let ingest = IngestionLoop::connect(link, connector, config.ingest_settings()).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown::shutdown_signal().await;
            cancel.cancel();
        }
    });

    match ingest.run(cancel).await? {
        IngestExit::Stopped => {
            info!("Shutdown complete.");
            Ok(())
        }
        IngestExit::Aborted { consecutive_failures } => {
            error!(consecutive_failures, "Too many unparsable lines in a row");
            bail!(
                "ingestion aborted after {} consecutive unparsable lines; check the device program and wiring",
                consecutive_failures
            )
        }
    }
}
