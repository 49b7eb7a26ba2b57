//! Configuration manager for greenlight.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:4000";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Reported by the health check (`development`, `staging`, `production`).
    pub environment: String,
    /// Listening address.
    pub address: String,
    /// Guard movie routes with authentication, activation and permissions.
    pub require_authentication: bool,
    /// Origins allowed by CORS. Empty means any origin.
    pub trusted_origins: Vec<String>,
    /// Expose Prometheus metrics on `/debug/metrics`.
    pub metrics: bool,
    #[serde(skip_deserializing)]
    pub version: String,
    #[serde(skip)]
    pub(crate) path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Token lifetimes.
    pub token: Token,
    /// Request and pagination limits.
    pub limits: Limits,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_CRATE_NAME").to_owned(),
            environment: "development".to_owned(),
            address: DEFAULT_ADDRESS.to_owned(),
            require_authentication: false,
            trusted_origins: Vec::new(),
            metrics: false,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            postgres: None,
            argon2: None,
            token: Token::default(),
            limits: Limits::default(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Token lifetimes, in seconds.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    pub activation_ttl: i64,
    pub authentication_ttl: i64,
    /// Delay between two purges of expired tokens.
    pub cleanup_interval: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            activation_ttl: 3 * 24 * 60 * 60,
            authentication_ttl: 24 * 60 * 60,
            cleanup_interval: 60 * 60,
        }
    }
}

/// Request and listing limits.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_page: u64,
    pub max_page_size: u64,
    /// Maximum accepted body, in bytes.
    pub body_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_page: 10_000_000,
            max_page_size: 100,
            body_limit: 1_048_576,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(mut config) => {
                    // set app version.
                    config.version = VERSION.to_owned();
                    config.path = file_path.clone();
                    Arc::new(config)
                },
                Err(err) => Arc::new(self.error(err)),
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file cannot be read");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
name: catalogue
require_authentication: true
token:
  activation_ttl: 60
limits:
  max_page_size: 50
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.name, "catalogue");
        assert!(config.require_authentication);
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.token.activation_ttl, 60);
        assert_eq!(config.token.authentication_ttl, 24 * 60 * 60);
        assert_eq!(config.limits.max_page_size, 50);
        assert_eq!(config.limits.max_page, 10_000_000);
        assert!(config.postgres.is_none());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Configuration::default()
            .path(PathBuf::from("/definitely/not/here.yaml"))
            .read();

        assert_eq!(config.version, VERSION);
        assert_eq!(config.environment, "development");
    }
}
