use clap::Parser;
use std::{path::PathBuf, time::Duration};

/// Runtime settings. Flags win over environment variables, which win over the
/// defaults; a `.env` file in the working directory is read first.
#[derive(Debug, Clone, Parser)]
#[command(name = "sensor-backend", about = "Sensor telemetry ingestion and query server")]
pub struct Config {
    /// Path of the SQLite file
    #[arg(long, env = "DATABASE_URL", default_value = "sensor_data.db")]
    pub database_url: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8888)]
    pub port: u16,

    /// The only origin allowed to make (credentialed) cross-origin requests
    #[arg(long, env = "ALLOWED_ORIGIN", default_value = "http://localhost:3000")]
    pub allowed_origin: String,

    #[arg(
        long,
        env = "DB_POOL_SIZE",
        default_value_t = 8,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub pool_size: u32,

    /// How long a connection waits on SQLite's write lock before giving up
    #[arg(long, env = "DB_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Also append log lines to this file, e.g. `esp32_server.log`
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
