//! API server configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. Engine settings (provider credentials, timeouts) are loaded by
//! `timbra_engine::EngineConfig` and nested here.

use std::env;

use timbra_engine::{ConfigError, EngineConfig};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub port: u16,

    /// Path to the SQLite ledger file.
    pub database_path: String,

    /// Engine settings (provider, partner, email, timeouts).
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let port = env::var("HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("HTTP_PORT".to_string()))?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./timbra.db".to_string());

        Ok(ServerConfig {
            port,
            database_path,
            engine: EngineConfig::load()?,
        })
    }
}
