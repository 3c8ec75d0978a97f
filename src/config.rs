//! # Configuration
//!
//! Shard DSNs come from a YAML file:
//!
//! ```yaml
//! db:
//!   user-shards:
//!     0: "postgres://localhost:5432/users0"
//!     1: "postgres://localhost:5433/users1"
//!     2: "postgres://localhost:5434/users2"
//!     3: "postgres://localhost:5435/users3"
//!   email-shards:
//!     0: "postgres://localhost:5436/emails0"
//!     1: "postgres://localhost:5437/emails1"
//! ```
//!
//! The user-shard set must be exactly {0,1,2,3}; the ID encoding reserves
//! two bits for it. Email shards only need to be contiguous from 0, since
//! routing is `crc32(email) % count`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::id::USER_SHARD_COUNT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("db.user-shards must configure exactly indices 0..{expected}, got {got:?}")]
    InvalidUserShards { expected: u32, got: Vec<u32> },

    #[error("db.email-shards must configure contiguous indices from 0, got {got:?}")]
    InvalidEmailShards { got: Vec<u32> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db: DbConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Shard index to DSN. BTreeMap keeps iteration in index order.
    #[serde(rename = "user-shards")]
    pub user_shards: BTreeMap<u32, String>,

    #[serde(rename = "email-shards")]
    pub email_shards: BTreeMap<u32, String>,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate config from a YAML string.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let user: Vec<u32> = self.db.user_shards.keys().copied().collect();
        let expected: Vec<u32> = (0..USER_SHARD_COUNT).collect();
        if user != expected {
            return Err(ConfigError::InvalidUserShards {
                expected: USER_SHARD_COUNT,
                got: user,
            });
        }

        let email: Vec<u32> = self.db.email_shards.keys().copied().collect();
        let contiguous: Vec<u32> = (0..email.len() as u32).collect();
        if email.is_empty() || email != contiguous {
            return Err(ConfigError::InvalidEmailShards { got: email });
        }

        Ok(())
    }
}
