//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating [`ProxyConfig`](super::ProxyConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Nothing to authenticate upstream with; the proxy cannot serve anything.
    #[error("No backend credentials configured (set AUTH to a comma-separated list of API keys)")]
    NoCredentials,
}
