//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod ledger;
mod messaging;
mod server;
mod storage;

pub use ledger::LedgerConfig;
pub use messaging::{
    AmqpConfig, ConsumerConfig, MessagingConfig, AMQP_URL_ENV_VAR, DEFAULT_AMQP_URL,
};
pub use server::ServerConfig;
pub use storage::StorageConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WAYBILL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WAYBILL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WAYBILL_LOG";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Broker and consumer configuration.
    pub messaging: MessagingConfig,
    /// Ledger business rules.
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. `AMQP_URL` for the broker connection string
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        if let Ok(url) = std::env::var(AMQP_URL_ENV_VAR) {
            config.messaging.amqp.url = url;
        }

        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                path: ":memory:".to_string(),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::consumer::AckMode;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_config_default() {
        std::env::remove_var(AMQP_URL_ENV_VAR);
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.messaging.amqp.url, DEFAULT_AMQP_URL);
        assert_eq!(config.messaging.amqp.queue, "delivery_completed");
        assert_eq!(config.messaging.consumer.reconnect_delay_secs, 10);
        assert_eq!(config.messaging.consumer.max_reconnect_attempts, None);
        assert_eq!(config.messaging.consumer.ack_mode, AckMode::AfterCommit);
        assert_eq!(config.messaging.consumer.max_delivery_attempts, 5);
        assert_eq!(
            config.messaging.consumer.retry_delay(2),
            std::time::Duration::from_secs(1)
        );
        assert_eq!(config.ledger.delivery_bonus, 50.0);
        assert_eq!(config.ledger.max_accrual, 10000.0);
    }

    #[test]
    fn test_config_for_test() {
        let config = Config::for_test();
        assert_eq!(config.storage.path, ":memory:");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    #[serial]
    fn test_load_from_yaml_file() {
        std::env::remove_var(AMQP_URL_ENV_VAR);
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 9100\nmessaging:\n  consumer:\n    ack_mode: always\n    max_reconnect_attempts: 3\n    retry_delay_ms: 250\nledger:\n  daily_write_off_limit: 500\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.messaging.consumer.ack_mode, AckMode::Always);
        assert_eq!(config.messaging.consumer.max_reconnect_attempts, Some(3));
        assert_eq!(config.messaging.consumer.retry_delay_ms, 250);
        assert_eq!(config.ledger.daily_write_off_limit, Some(500.0));
        assert_eq!(config.ledger.min_write_off, Some(10.0));
    }

    #[test]
    #[serial]
    fn test_amqp_url_env_overrides() {
        std::env::set_var(AMQP_URL_ENV_VAR, "amqp://user:pw@broker:5672/");
        let config = Config::load(None).unwrap();
        std::env::remove_var(AMQP_URL_ENV_VAR);
        assert_eq!(config.messaging.amqp.url, "amqp://user:pw@broker:5672/");
    }
}
