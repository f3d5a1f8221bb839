//! Configuration management for the scopeacl runtime.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use scopeacl_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("scopeacl.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment as EnvSource, File, FileFormat};
use scopeacl_domain::{CacheConfig, ServiceConfig};
use serde::{Deserialize, Serialize};

/// Prefix of environment variable overrides.
const ENV_PREFIX: &str = "SCOPEACL";

/// Upper bound on every configured TTL (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Snapshot cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Cache metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Deployment environment.
///
/// Test-only escape hatches refuse to run in `production`.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
            Environment::Test => "test",
        })
    }
}

/// Snapshot cache settings.
///
/// Environment variables: `SCOPEACL_CACHE__PERSISTENT_TTL_SECS`,
/// `SCOPEACL_CACHE__SHARED_MEMORY_ENABLED`, ...
///
/// # Example YAML Configuration
///
/// ```yaml
/// cache:
///   persistent_ttl_secs: 3600
///   shared_memory_enabled: true
///   shared_memory_ttl_secs: 60
///   shared_memory_max_capacity: 10000
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// TTL of snapshots in the persistent tier.
    #[serde(default = "default_persistent_ttl")]
    pub persistent_ttl_secs: u64,

    /// Enable the process-local shared-memory tier.
    #[serde(default = "default_true")]
    pub shared_memory_enabled: bool,

    /// TTL of snapshots in the shared-memory tier.
    #[serde(default = "default_shared_memory_ttl")]
    pub shared_memory_ttl_secs: u64,

    /// Maximum number of snapshots in the shared-memory tier.
    #[serde(default = "default_shared_memory_capacity")]
    pub shared_memory_max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            persistent_ttl_secs: default_persistent_ttl(),
            shared_memory_enabled: true,
            shared_memory_ttl_secs: default_shared_memory_ttl(),
            shared_memory_max_capacity: default_shared_memory_capacity(),
        }
    }
}

fn default_persistent_ttl() -> u64 {
    3600
}

fn default_shared_memory_ttl() -> u64 {
    60
}

fn default_shared_memory_capacity() -> u64 {
    10_000
}

/// Cache metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Persist cache counters under `acl:metrics`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL of the persisted metrics record
    #[serde(default = "default_metrics_ttl")]
    pub ttl_secs: u64,

    /// Hit rate below which warming is recommended
    #[serde(default = "default_hit_rate_threshold")]
    pub hit_rate_threshold: f64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_metrics_ttl(),
            hit_rate_threshold: default_hit_rate_threshold(),
        }
    }
}

fn default_metrics_ttl() -> u64 {
    86_400
}

fn default_hit_rate_threshold() -> f64 {
    0.85
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type. Only "memory" is built in; other backends are
    /// supplied by the embedding application through
    /// [`AclRuntime::with_stores`](crate::runtime::AclRuntime::with_stores).
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Log span enter/exit events
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `SCOPEACL_` and use `__` as
    /// separator. For example:
    /// - `SCOPEACL_CACHE__PERSISTENT_TTL_SECS=600` overrides `cache.persistent_ttl_secs`
    /// - `SCOPEACL_LOGGING__LEVEL=debug` overrides `logging.level`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        if self.cache.persistent_ttl_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.persistent_ttl_secs must be greater than 0".to_string(),
            });
        }

        for (name, secs) in [
            ("cache.persistent_ttl_secs", self.cache.persistent_ttl_secs),
            ("cache.shared_memory_ttl_secs", self.cache.shared_memory_ttl_secs),
            ("metrics.ttl_secs", self.metrics.ttl_secs),
        ] {
            if secs > MAX_TTL_SECS {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{name} must not exceed {MAX_TTL_SECS}, got: {secs}"),
                });
            }
        }

        if self.cache.shared_memory_enabled {
            if self.cache.shared_memory_ttl_secs == 0 {
                return Err(ConfigLoadError::Invalid {
                    message: "cache.shared_memory_ttl_secs must be greater than 0".to_string(),
                });
            }
            if self.cache.shared_memory_ttl_secs > self.cache.persistent_ttl_secs {
                return Err(ConfigLoadError::Invalid {
                    message: "cache.shared_memory_ttl_secs must not exceed cache.persistent_ttl_secs"
                        .to_string(),
                });
            }
            if self.cache.shared_memory_max_capacity == 0 {
                return Err(ConfigLoadError::Invalid {
                    message: "cache.shared_memory_max_capacity must be greater than 0"
                        .to_string(),
                });
            }
        }

        if self.metrics.ttl_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "metrics.ttl_secs must be greater than 0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.metrics.hit_rate_threshold) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "metrics.hit_rate_threshold must be between 0 and 1, got: {}",
                    self.metrics.hit_rate_threshold
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Domain service configuration derived from the `cache` section.
    pub fn service_config(&self) -> ServiceConfig {
        let cache = CacheConfig::default()
            .with_persistent_ttl(Duration::from_secs(self.cache.persistent_ttl_secs))
            .with_shared_enabled(self.cache.shared_memory_enabled)
            .with_shared_ttl(Duration::from_secs(self.cache.shared_memory_ttl_secs))
            .with_shared_max_capacity(self.cache.shared_memory_max_capacity);
        ServiceConfig::default().with_cache(cache)
    }
}

/// `SCOPEACL_CACHE__SHARED_MEMORY_ENABLED` -> `cache.shared_memory_enabled`
fn env_source() -> EnvSource {
    EnvSource::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
