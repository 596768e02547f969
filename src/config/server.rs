//! Server configuration

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path prefix for the OpenAI-compatible routes (`/<namespace>/v1/...`).
    pub namespace: String,
    /// Use the leftmost `X-Forwarded-For` address as the client identity.
    ///
    /// Only enable this behind a reverse proxy that overwrites the header,
    /// otherwise clients can pick their own identity.
    pub trust_proxy_headers: bool,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            namespace: "commandr".to_string(),
            trust_proxy_headers: false,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7860);
        assert_eq!(config.namespace, "commandr");
        assert!(!config.trust_proxy_headers);
    }
}
