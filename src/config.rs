//! # Configuration Management
//!
//! Centralized configuration for the RPC framework.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variable overrides (`MICRO_RPC_*`)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::PoolOptions;
use crate::error::{Result, RpcError};

/// Main configuration structure covering server, client, and logging settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RpcConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RpcError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables, starting from defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("MICRO_RPC_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("MICRO_RPC_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(max) = std::env::var("MICRO_RPC_POOL_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.client.pool.max_connections = val;
            }
        }

        if let Ok(idle) = std::env::var("MICRO_RPC_POOL_IDLE_TIMEOUT_MS") {
            if let Ok(val) = idle.parse::<u64>() {
                config.client.pool.idle_timeout_ms = val;
            }
        }

        if let Ok(checkout) = std::env::var("MICRO_RPC_POOL_CHECKOUT_TIMEOUT_MS") {
            if let Ok(val) = checkout.parse::<u64>() {
                config.client.pool.checkout_timeout_ms = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RpcError::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to write config file: {e}")))
    }
}

/// Server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, host:port
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address to dial, host:port
    pub address: String,

    /// Wire code of the serializer used for outgoing requests
    pub serializer_code: u8,

    /// Wire code of the compressor used for outgoing requests
    pub compressor_code: u8,

    /// Connection pool settings
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8081".to_string(),
            serializer_code: 0,
            compressor_code: 0,
            pool: PoolConfig::default(),
        }
    }
}

/// Connection pool settings, the serde-facing variant of
/// [`crate::client::PoolOptions`]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on live connections
    pub max_connections: usize,

    /// Idle connections older than this are closed instead of reused
    pub idle_timeout_ms: u64,

    /// How long checkout may block when the pool is exhausted
    pub checkout_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let options = PoolOptions::default();
        Self {
            max_connections: options.max_connections,
            idle_timeout_ms: options.idle_timeout.as_millis() as u64,
            checkout_timeout_ms: options.checkout_timeout.as_millis() as u64,
        }
    }
}

impl PoolConfig {
    pub fn to_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            checkout_timeout: Duration::from_millis(self.checkout_timeout_ms),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
