use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_sensor::ingestors::{IngestSettings, SerialSettings};
use lib_sensor::loggers::LogSettings;

pub const DEFAULT_CONFIG_FILE: &str = "sensor_station.conf";
pub const DEFAULT_DB_URL: &str = "postgres://postgres@localhost:5432/sensor_data";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Water-quality sensor station: serial ingestion and live data API", version)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[clap(long, env = "SENSOR_PORT", help = "HTTP port to listen on.")]
    pub port: Option<u16>,

    #[clap(long, env = "SENSOR_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DATABASE_URL", help = "PostgreSQL connection URL (add sslmode=require for hosted databases).")]
    pub db_url: Option<String>,

    #[clap(long, env = "SENSOR_DB_POOL_SIZE", help = "Maximum pooled connections for the read side.")]
    pub db_pool_size: Option<usize>,

    #[clap(long, env = "SENSOR_SERIAL_PORT", help = "Serial port of the sensor. Defaults to the first port found.")]
    pub serial_port: Option<String>,

    #[clap(long, env = "SENSOR_BAUD_RATE", help = "Serial baud rate.")]
    pub baud_rate: Option<u32>,

    #[clap(long, env = "SENSOR_SERIAL_TIMEOUT_MS", help = "Serial read timeout in milliseconds.")]
    pub serial_timeout_ms: Option<u64>,

    #[clap(long, env = "SENSOR_WARMUP_MS", help = "Wait after opening the port before flushing input, in milliseconds.")]
    pub warmup_ms: Option<u64>,

    #[clap(long, env = "SENSOR_IDLE_WAIT_MS", help = "Wait when no line is available, in milliseconds.")]
    pub idle_wait_ms: Option<u64>,

    #[clap(long, env = "SENSOR_READ_DELAY_MS", help = "Wait after each processed line, in milliseconds.")]
    pub read_delay_ms: Option<u64>,

    #[clap(long, env = "SENSOR_MAX_FAILURES", help = "Consecutive unparsable lines before ingestion aborts.")]
    pub max_consecutive_failures: Option<u32>,

    #[clap(long, env = "SENSOR_CACHE_TTL_SECS", help = "Lifetime of the cached latest reading, in seconds.")]
    pub cache_ttl_secs: Option<u64>,

    #[clap(long, env = "SENSOR_STREAM_INTERVAL_SECS", help = "Polling interval of each stream client, in seconds.")]
    pub stream_interval_secs: Option<u64>,

    #[clap(long, env = "SENSOR_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SENSOR_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, help = "List available serial ports and exit.")]
    #[serde(skip)]
    pub list_ports: bool,

    #[clap(long, help = "Connect to the database, create the table if needed and exit.")]
    #[serde(skip)]
    pub check_db: bool,
}

impl Config {
    /// Built-in values, the lowest layer.
    pub fn defaults() -> Config {
        Config {
            port: Some(8000),
            db_url: Some(DEFAULT_DB_URL.to_string()),
            db_pool_size: Some(8),
            baud_rate: Some(9600),
            serial_timeout_ms: Some(1000),
            warmup_ms: Some(3000),
            idle_wait_ms: Some(100),
            read_delay_ms: Some(5000),
            max_consecutive_failures: Some(10),
            cache_ttl_secs: Some(5),
            stream_interval_secs: Some(5),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            db_url: other.db_url.or(self.db_url),
            db_pool_size: other.db_pool_size.or(self.db_pool_size),
            serial_port: other.serial_port.or(self.serial_port),
            baud_rate: other.baud_rate.or(self.baud_rate),
            serial_timeout_ms: other.serial_timeout_ms.or(self.serial_timeout_ms),
            warmup_ms: other.warmup_ms.or(self.warmup_ms),
            idle_wait_ms: other.idle_wait_ms.or(self.idle_wait_ms),
            read_delay_ms: other.read_delay_ms.or(self.read_delay_ms),
            max_consecutive_failures: other.max_consecutive_failures.or(self.max_consecutive_failures),
            cache_ttl_secs: other.cache_ttl_secs.or(self.cache_ttl_secs),
            stream_interval_secs: other.stream_interval_secs.or(self.stream_interval_secs),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            list_ports: other.list_ports || self.list_ports,
            check_db: other.check_db || self.check_db,
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8000)
    }

    pub fn db_url(&self) -> String {
        self.db_url.clone().unwrap_or_else(|| DEFAULT_DB_URL.to_string())
    }

    pub fn db_pool_size(&self) -> usize {
        self.db_pool_size.unwrap_or(8).max(1)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(5))
    }

    pub fn stream_interval(&self) -> Duration {
        // A zero interval would spin the stream loop.
        Duration::from_secs(self.stream_interval_secs.unwrap_or(5).max(1))
    }

    pub fn serial_settings(&self, port: String) -> SerialSettings {
        SerialSettings {
            port,
            baud_rate: self.baud_rate.unwrap_or(9600),
            timeout: Duration::from_millis(self.serial_timeout_ms.unwrap_or(1000)),
        }
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        let defaults = IngestSettings::default();
        IngestSettings {
            warmup: self.warmup_ms.map(Duration::from_millis).unwrap_or(defaults.warmup),
            idle_wait: self.idle_wait_ms.map(Duration::from_millis).unwrap_or(defaults.idle_wait),
            read_delay: self.read_delay_ms.map(Duration::from_millis).unwrap_or(defaults.read_delay),
            max_consecutive_failures: self
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures)
                .max(1),
        }
    }

    pub fn log_settings(&self, binary: &str) -> LogSettings {
        LogSettings {
            log_dir: self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.clone().unwrap_or_else(|| "info".to_string()),
            file_prefix: binary.to_string(),
        }
    }
}

/// Reads a JSON config file. Problems are reported on stderr, since logging is
/// not set up yet, and the file is skipped.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Config>(&text) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, then the config file, then `cli` (which already carries
/// environment variables).
pub fn resolve_config(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

pub fn load_config() -> Config {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    resolve_config(Config::parse())
}
