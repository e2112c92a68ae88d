//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL; also the base for per-account credential stores.
    pub database_url: String,
    /// Base URL of the chat bridge daemon.
    pub bridge_url: String,
    /// Directory backing `/uploads`.
    pub uploads_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `PORT` | HTTP listen port | `9724` |
    /// | `DB_DSN` | SQLite database URL | `sqlite:promote.db?mode=rwc` |
    /// | `BRIDGE_URL` | Chat bridge daemon URL | `http://127.0.0.1:8077` |
    /// | `UPLOADS_DIR` | Local media directory | `uploads` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("PORT").unwrap_or_else(|_| "9724".to_string());
        let addr = format!("0.0.0.0:{port}")
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port))?;

        let database_url =
            env::var("DB_DSN").unwrap_or_else(|_| "sqlite:promote.db?mode=rwc".to_string());
        let bridge_url =
            env::var("BRIDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:8077".to_string());
        let uploads_dir = env::var("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        Ok(Self {
            addr,
            database_url,
            bridge_url,
            uploads_dir,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT value: {0}")]
    InvalidPort(String),
}
