//! Error types for backend calls.

use thiserror::Error;

/// Errors that end a backend call before any event stream exists.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection could not be established or the request could not be sent.
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-2xx status.
    #[error("Backend error: {status} | {body}")]
    Upstream { status: String, body: String },

    /// A 2xx body that does not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The call was abandoned by the caller.
    #[error("Request cancelled")]
    Cancelled,
}

impl BackendError {
    /// Map a transport error from reqwest.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BackendError::Network(format!("timed out: {}", error))
        } else {
            BackendError::Network(error.to_string())
        }
    }

    /// Build from a status code, using the canonical reason as status text.
    pub fn upstream(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        let status = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        BackendError::Upstream {
            status,
            body: body.into(),
        }
    }
}
