//! Environment-driven service configuration.

use std::{env, net::SocketAddr, path::PathBuf};

use thiserror::Error;
use tracing::info;

use crate::runtime::handle::{AckMode, RuntimeConfig};

const DEFAULT_PORT: &str = "3001";
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_DATABASE_PATH: &str = "phonebook.db";
const IN_MEMORY_DATABASE: &str = ":memory:";

/// Configuration values that could not be parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `PORT` is not a valid port number.
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
    /// `BIND` and `PORT` do not form a socket address.
    #[error("invalid BIND: {0}")]
    InvalidBind(String),
    /// `ACK_MODE` is not recognized.
    #[error("invalid ACK_MODE: {0}")]
    InvalidAckMode(String),
    /// `SNAPSHOT_EVERY_OPS` is not a non-negative integer.
    #[error("invalid SNAPSHOT_EVERY_OPS: {0}")]
    InvalidSnapshotInterval(String),
}

/// Where the contact journal lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Database {
    /// SQLite file on disk.
    File(PathBuf),
    /// Throwaway in-memory SQLite database.
    InMemory,
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address.
    pub addr: SocketAddr,
    /// Journal location.
    pub database: Database,
    /// Directory of front-end assets to serve, if any.
    pub static_dir: Option<PathBuf>,
    /// Runtime tuning.
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| {
            lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
        };

        let port_raw = var("PORT", DEFAULT_PORT);
        let port: u16 = port_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port_raw.clone()))?;

        let bind = var("BIND", DEFAULT_BIND);
        let addr: SocketAddr = format!("{}:{}", bind.trim(), port)
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind.clone()))?;

        let database = match var("DATABASE_PATH", DEFAULT_DATABASE_PATH).trim() {
            IN_MEMORY_DATABASE => Database::InMemory,
            path => Database::File(PathBuf::from(path)),
        };

        let static_dir = lookup("STATIC_DIR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let ack_mode = var("ACK_MODE", "durable")
            .parse::<AckMode>()
            .map_err(ConfigError::InvalidAckMode)?;

        let defaults = RuntimeConfig::default();
        let snapshot_every_ops: usize = match lookup("SNAPSHOT_EVERY_OPS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidSnapshotInterval(raw.clone()))?,
            None => defaults.snapshot_every_ops,
        };

        Ok(Self {
            addr,
            database,
            static_dir,
            runtime: RuntimeConfig {
                ack_mode,
                snapshot_every_ops,
                ..defaults
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).expect("config");
        assert_eq!(config.addr, "0.0.0.0:3001".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database, Database::File(PathBuf::from("phonebook.db")));
        assert_eq!(config.static_dir, None);
        assert_eq!(config.runtime.ack_mode, AckMode::Durable);
        assert_eq!(config.runtime.snapshot_every_ops, 2000);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("BIND", "127.0.0.1"),
            ("DATABASE_PATH", ":memory:"),
            ("STATIC_DIR", "build"),
            ("ACK_MODE", "memory"),
            ("SNAPSHOT_EVERY_OPS", "0"),
        ])
        .expect("config");
        assert_eq!(config.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database, Database::InMemory);
        assert_eq!(config.static_dir, Some(PathBuf::from("build")));
        assert_eq!(config.runtime.ack_mode, AckMode::InMemory);
        assert_eq!(config.runtime.snapshot_every_ops, 0);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(load(&[("PORT", "http")]), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(load(&[("BIND", "not an ip")]), Err(ConfigError::InvalidBind(_))));
        assert!(matches!(load(&[("ACK_MODE", "eventually")]), Err(ConfigError::InvalidAckMode(_))));
        assert!(matches!(
            load(&[("SNAPSHOT_EVERY_OPS", "-1")]),
            Err(ConfigError::InvalidSnapshotInterval(_))
        ));
    }
}
