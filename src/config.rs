//! Application configuration.
//!
//! Loaded from `config.yaml` (optional), the file named by the
//! `EDGESTORE_CONFIG` environment variable (optional), and `EDGESTORE_*`
//! environment variables, in that order of priority.

use std::time::Duration;

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Postgres connection URL. When absent the in-memory event store is
    /// used.
    pub database: Option<String>,
    /// Redis connection URL.
    pub cache: String,
    /// Machine id handed to the GUID collaborator service.
    pub machine_id: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: None,
            cache: "redis://localhost:6379".to_string(),
            machine_id: 0,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the server serves HTTP over.
    pub http_port: u16,
    /// Per-request timeout, seconds.
    pub read_timeout: u64,
    /// Response write timeout, seconds.
    pub write_timeout: u64,
    /// Keep-alive idle timeout, seconds.
    pub idle_timeout: u64,
    /// Grace period for in-flight requests on shutdown, seconds.
    pub shutdown_timeout: u64,
    /// Upper bound on request header size, bytes.
    pub max_header_bytes: usize,
    /// Log level: error, warn, info, debug, trace.
    pub logger_level: String,
    /// Log format: text, json.
    pub logger_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            read_timeout: 20,
            write_timeout: 20,
            idle_timeout: 120,
            shutdown_timeout: 300,
            max_header_bytes: 1 << 20,
            logger_level: "info".to_string(),
            logger_format: "json".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Sources, later overrides earlier:
    /// 1. `config.yaml` in the current directory (if present)
    /// 2. the file named by `EDGESTORE_CONFIG` (if set)
    /// 3. environment variables with the `EDGESTORE` prefix
    ///    (e.g. `EDGESTORE_SERVER__HTTP_PORT=9090`)
    pub fn load() -> Result<Self, config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new("config.yaml", FileFormat::Yaml).required(false));

        if let Ok(config_path) = std::env::var("EDGESTORE_CONFIG") {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("EDGESTORE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.read_timeout(), Duration::from_secs(20));
        assert_eq!(config.server.write_timeout(), Duration::from_secs(20));
        assert_eq!(config.server.idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(300));
        assert_eq!(config.server.max_header_bytes, 1 << 20);
        assert_eq!(config.server.logger_level, "info");
        assert_eq!(config.server.logger_format, "json");
        assert!(config.database.is_none());
        assert_eq!(config.cache, "redis://localhost:6379");
    }
}
