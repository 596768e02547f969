//! Configuration module for the proxy
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`AUTH`, `PORT`, `PROXY_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use commandr::config::ProxyConfig;
//!
//! let config = ProxyConfig::default();
//! assert_eq!(config.server.port, 7860);
//!
//! let toml = r#"
//! [queue]
//! concurrency = 3
//! "#;
//! let config: ProxyConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.queue.concurrency, 3);
//! ```

pub mod backend;
pub mod error;
pub mod logging;
pub mod queue;
pub mod server;

pub use backend::{parse_credential_list, BackendConfig};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use queue::QueueConfig;
pub use server::ServerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the proxy server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Upstream chat API and credentials
    pub backend: BackendConfig,
    /// Admission queue and worker pool
    pub queue: QueueConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// `AUTH` and `PORT` keep their historical names; everything else uses the
    /// `PROXY_` prefix. Unparseable values are ignored and the previous value
    /// is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(auth) = std::env::var("AUTH") {
            let credentials = parse_credential_list(&auth);
            if !credentials.is_empty() {
                self.backend.credentials = credentials;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("PROXY_HOST") {
            self.server.host = host;
        }
        if let Ok(url) = std::env::var("PROXY_BACKEND_URL") {
            self.backend.url = url;
        }

        if let Ok(concurrency) = std::env::var("PROXY_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.queue.concurrency = c;
            }
        }
        if let Ok(timeout) = std::env::var("PROXY_TASK_TIMEOUT_SECONDS") {
            if let Ok(t) = timeout.parse() {
                self.queue.task_timeout_seconds = t;
            }
        }

        if let Ok(level) = std::env::var("PROXY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PROXY_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.server.namespace.trim_matches('/').is_empty() {
            return Err(ConfigError::Validation {
                field: "server.namespace".to_string(),
                message: "namespace cannot be empty".to_string(),
            });
        }

        if self.backend.url.is_empty() {
            return Err(ConfigError::Validation {
                field: "backend.url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        }
        if self.backend.credentials.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::NoCredentials);
        }

        if self.queue.concurrency == 0 {
            return Err(ConfigError::Validation {
                field: "queue.concurrency".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }
        if self.queue.max_size == 0 {
            return Err(ConfigError::Validation {
                field: "queue.max_size".to_string(),
                message: "queue must hold at least one task".to_string(),
            });
        }
        if self.queue.task_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "queue.task_timeout_seconds".to_string(),
                message: "timeout must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Serializes unit tests that mutate process environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
