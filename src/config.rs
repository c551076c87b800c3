use std::collections::HashMap;
use thiserror::Error;

use crate::domain::FeeConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub default_fee: u64,
    pub default_protocol_fee: u64,
    pub pool_queue_depth: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let default_fee = parse_u64(&env_map, "DEFAULT_FEE", 348)?;
        let default_protocol_fee = parse_u64(&env_map, "DEFAULT_PROTOCOL_FEE", 174)?;

        let pool_queue_depth = env_map
            .get("POOL_QUEUE_DEPTH")
            .map(|s| s.as_str())
            .unwrap_or("64")
            .parse::<usize>()
            .ok()
            .filter(|depth| *depth > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "POOL_QUEUE_DEPTH".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            default_fee,
            default_protocol_fee,
            pool_queue_depth,
        })
    }

    /// Fees applied to pools created without explicit ones.
    pub fn default_fees(&self) -> FeeConfig {
        FeeConfig::new(self.default_fee, self.default_protocol_fee)
    }
}

fn parse_u64(env_map: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        Some(value) => value.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
        }),
        None => Ok(default),
    }
}
