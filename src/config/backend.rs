//! Upstream chat backend configuration

use serde::{Deserialize, Serialize};

/// Upstream chat backend configuration.
///
/// Credentials are normally supplied through the `AUTH` environment variable
/// as a comma-separated list rather than written into the config file.
///
/// # Example
///
/// ```toml
/// [backend]
/// url = "https://api.cohere.ai/v1/chat"
/// model = "command-r-plus"
/// default_temperature = 0.3
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Full URL of the chat endpoint.
    pub url: String,
    /// Model id sent upstream and advertised by the models endpoint.
    pub model: String,
    /// `owned_by` field of the advertised model descriptor.
    pub owned_by: String,
    /// Bearer tokens used in rotation.
    pub credentials: Vec<String>,
    /// Sampling temperature when the request does not carry one.
    pub default_temperature: f32,
    /// TCP connect timeout for upstream calls.
    pub connect_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "https://api.cohere.ai/v1/chat".to_string(),
            model: "command-r-plus".to_string(),
            owned_by: "cohere".to_string(),
            credentials: Vec::new(),
            default_temperature: 0.3,
            connect_timeout_seconds: 10,
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("owned_by", &self.owned_by)
            .field("credentials", &format_args!("[{} redacted]", self.credentials.len()))
            .field("default_temperature", &self.default_temperature)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}

/// Split a comma-separated credential list, dropping blank entries.
pub fn parse_credential_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
