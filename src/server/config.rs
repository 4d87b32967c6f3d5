use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::notifications::models::ChainInfo;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub notification_encryption_key: String,
    pub log_dir: String,
    pub ready_sweep_interval_seconds: u64,
    pub expiry_sweep_interval_seconds: u64,
    pub notification_timeout_seconds: u64,
    pub chains: Vec<ChainInfo>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    notification_encryption_key: Option<String>,
    log_dir: Option<String>,
    ready_sweep_interval_seconds: Option<u64>,
    expiry_sweep_interval_seconds: Option<u64>,
    notification_timeout_seconds: Option<u64>,
    // Only settable from the file.
    chains: Option<Vec<ChainInfo>>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_READY_SWEEP_SECONDS: u64 = 60;
const DEFAULT_EXPIRY_SWEEP_SECONDS: u64 = 300;
const DEFAULT_NOTIFICATION_TIMEOUT_SECONDS: u64 = 10;

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => Self::load_file(Path::new(path))?,
            None => PartialServerConfig::default(),
        };
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()?;

        Self::merge(env_config, file_config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file_config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        Self::merge(PartialServerConfig::default(), file_config)
    }

    fn load_file(path: &Path) -> Result<PartialServerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let display = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    // Environment overrides file.
    fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, ConfigError> {
        let config = ServerConfig {
            database_url: env
                .database_url
                .or(file.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            notification_encryption_key: env
                .notification_encryption_key
                .or(file.notification_encryption_key)
                .ok_or(ConfigError::Missing("NOTIFICATION_ENCRYPTION_KEY"))?,
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            ready_sweep_interval_seconds: env
                .ready_sweep_interval_seconds
                .or(file.ready_sweep_interval_seconds)
                .unwrap_or(DEFAULT_READY_SWEEP_SECONDS),
            expiry_sweep_interval_seconds: env
                .expiry_sweep_interval_seconds
                .or(file.expiry_sweep_interval_seconds)
                .unwrap_or(DEFAULT_EXPIRY_SWEEP_SECONDS),
            notification_timeout_seconds: env
                .notification_timeout_seconds
                .or(file.notification_timeout_seconds)
                .unwrap_or(DEFAULT_NOTIFICATION_TIMEOUT_SECONDS),
            chains: file.chains.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ready_sweep_interval_seconds == 0 || self.expiry_sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "sweep intervals must be at least one second".to_string(),
            ));
        }
        if self.notification_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "notification_timeout_seconds must be positive".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(ConfigError::Invalid(format!(
                    "chain {} is configured twice",
                    chain.chain_id
                )));
            }
        }
        Ok(())
    }
}
