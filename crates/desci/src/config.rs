//! Configuration management for desci.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ledger::LedgerLimits;
use crate::units::Address;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "desci";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "ledger.db";

/// Upper bound on generated development accounts.
pub const MAX_DEV_ACCOUNTS: usize = 32;

/// Upper bound on `ledger.max_duration_days` (one hundred years).
pub const MAX_DURATION_DAYS: u32 = 36_500;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `DESCI_`, `__` between sections)
/// 2. TOML config file at `~/.config/desci/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Contract limits.
    pub ledger: LedgerConfig,
    /// Chain provider configuration.
    pub chain: ChainConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/desci/ledger.db`
    pub database_path: Option<PathBuf>,
}

/// Limits enforced on contract calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Longest funding period an experiment may request.
    pub max_duration_days: u32,
    /// Longest experiment or dataset title, in characters.
    pub max_title_length: usize,
    /// Longest experiment or dataset description, in characters.
    pub max_description_length: usize,
}

/// Chain provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Serve the local ledger. When false every chain call fails and the API
    /// answers from its mock catalog.
    pub enabled: bool,
    /// Network name reported by the provider.
    pub network_name: String,
    /// Chain id reported by the provider.
    pub chain_id: u64,
    /// Address the contract is reported at.
    pub contract_address: String,
    /// Number of development accounts exposed by the provider.
    pub dev_accounts: usize,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Deployment environment.
    pub environment: Environment,
}

/// Deployment environment of the API server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Failed contract calls are answered with simulated receipts.
    #[default]
    Development,
    /// Failed contract calls are reported as errors.
    Production,
}

impl Environment {
    /// Whether this is the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let limits = LedgerLimits::default();
        Self {
            max_duration_days: limits.max_duration_days,
            max_title_length: limits.max_title_length,
            max_description_length: limits.max_description_length,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            network_name: "localhost".to_string(),
            chain_id: 31_337,
            contract_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
            dev_accounts: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            environment: Environment::Development,
        }
    }
}

impl LedgerConfig {
    /// The limits to hand to the ledger.
    #[must_use]
    pub fn limits(&self) -> LedgerLimits {
        LedgerLimits {
            max_duration_days: self.max_duration_days,
            max_title_length: self.max_title_length,
            max_description_length: self.max_description_length,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `DESCI_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("DESCI_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DURATION_DAYS).contains(&self.ledger.max_duration_days) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "ledger.max_duration_days must be between 1 and {MAX_DURATION_DAYS} (got {})",
                    self.ledger.max_duration_days
                ),
            });
        }
        if self.ledger.max_title_length == 0 {
            return Err(invalid("ledger.max_title_length must be greater than 0"));
        }
        if self.ledger.max_description_length == 0 {
            return Err(invalid(
                "ledger.max_description_length must be greater than 0",
            ));
        }

        if self.chain.network_name.trim().is_empty() {
            return Err(invalid("chain.network_name must not be empty"));
        }
        if self.chain.contract_address.parse::<Address>().is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "chain.contract_address is not a valid address: {}",
                    self.chain.contract_address
                ),
            });
        }
        if self.chain.dev_accounts == 0 || self.chain.dev_accounts > MAX_DEV_ACCOUNTS {
            return Err(Error::ConfigValidation {
                message: format!(
                    "chain.dev_accounts must be between 1 and {MAX_DEV_ACCOUNTS} (got {})",
                    self.chain.dev_accounts
                ),
            });
        }

        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host must not be empty"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// The configured contract address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not parse.
    pub fn contract_address(&self) -> Result<Address> {
        self.chain.contract_address.parse()
    }

    /// The `host:port` the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn invalid(message: &str) -> Error {
    Error::ConfigValidation {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.chain.enabled);
        assert_eq!(config.chain.chain_id, 31_337);
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn test_default_ledger_config_matches_limits() {
        let ledger = LedgerConfig::default();
        assert_eq!(ledger.limits(), LedgerLimits::default());
        assert_eq!(ledger.max_duration_days, 365);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_limits() {
        let mut config = Config::default();
        config.ledger.max_duration_days = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_duration_days"));

        let mut config = Config::default();
        config.ledger.max_title_length = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_title_length"));
    }

    #[test]
    fn test_validate_duration_upper_bound() {
        let mut config = Config::default();
        config.ledger.max_duration_days = u32::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_duration_days"));

        config.ledger.max_duration_days = MAX_DURATION_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_contract_address() {
        let mut config = Config::default();
        config.chain.contract_address = "0x1234".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("contract_address"));
    }

    #[test]
    fn test_validate_dev_accounts_range() {
        let mut config = Config::default();
        config.chain.dev_accounts = 0;
        assert!(config.validate().is_err());

        config.chain.dev_accounts = MAX_DEV_ACCOUNTS + 1;
        assert!(config.validate().is_err());

        config.chain.dev_accounts = MAX_DEV_ACCOUNTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("ledger.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_contract_address() {
        let config = Config::default();
        let address = config.contract_address().unwrap();
        assert_eq!(address.to_string(), config.chain.contract_address);
    }

    #[test]
    fn test_bind_address() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "127.0.0.1:3001");
    }

    #[test]
    fn test_environment_display_and_serde() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert!(Environment::Development.is_development());
        assert!(!Environment::Production.is_development());

        let parsed: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(parsed, Environment::Production);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("desci"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_data_dir() {
        let path = Config::default_data_dir();
        assert!(path.to_string_lossy().contains("desci"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[ledger]
max_duration_days = 90

[chain]
enabled = false

[server]
port = 8080
environment = "production"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.ledger.max_duration_days, 90);
        assert_eq!(config.ledger.max_title_length, 200);
        assert!(!config.chain.enabled);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Production);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 0").unwrap();

        let result = Config::load_from(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_config_serialize() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("max_title_length"));
        assert!(json.contains("\"environment\":\"development\""));
    }
}
