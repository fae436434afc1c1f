use anyhow::Result;

use crate::sensor_logic::config::Config;
use lib_sensor::connections::mask_url_password;
use lib_sensor::loggers::{init_tracing, WorkerGuard};

/// Installs logging for `binary` and records the effective configuration.
///
/// Keep the returned guard alive until `main` returns.
pub fn setup_logging(config: &Config, binary: &str) -> Result<WorkerGuard> {
    let guard = init_tracing(&config.log_settings(binary))?;

    tracing::info!(
        binary,
        version = env!("CARGO_PKG_VERSION"),
        db_url = %mask_url_password(&config.db_url()),
        "Configuration loaded"
    );
    Ok(guard)
}
