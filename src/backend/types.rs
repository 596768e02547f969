//! Types shared by the backend client, the stream decoder and the queue.

use crate::convert::ChatTurn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting for one generation.
///
/// `total_tokens` is always derived locally; upstream totals are never trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Normalized event produced while talking to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text fragment.
    Token(String),
    /// Terminal success with the full text and token usage.
    Final { text: String, usage: Usage },
    /// Terminal failure.
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token(_))
    }
}

/// What the queue asks the backend to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub turns: Vec<ChatTurn>,
    pub stream: bool,
    pub temperature: f32,
}

/// Request body of the upstream `/v1/chat` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackendChatRequest<'a> {
    pub message: &'a str,
    pub chat_history: &'a [ChatTurn],
    pub temperature: f32,
    pub connectors: [Value; 0],
    pub prompt_truncation: &'static str,
    pub stream: bool,
    pub model: &'a str,
}

impl<'a> BackendChatRequest<'a> {
    /// The last turn is the new message; everything before it is history.
    pub fn new(request: &'a GenerationRequest, model: &'a str) -> Self {
        let (message, chat_history) = match request.turns.split_last() {
            Some((latest, history)) => (latest.text.as_str(), history),
            None => ("", &request.turns[..]),
        };

        Self {
            message,
            chat_history,
            temperature: request.temperature,
            connectors: [],
            prompt_truncation: "OFF",
            stream: request.stream,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenCounts {
    pub input_tokens: f64,
    pub output_tokens: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMeta {
    pub tokens: TokenCounts,
}

/// Completed generation as reported by the backend.
#[derive(Debug, Deserialize)]
pub(crate) struct FinishedResponse {
    #[serde(default)]
    pub text: String,
    pub meta: ResponseMeta,
}

impl FinishedResponse {
    pub fn usage(&self) -> Usage {
        Usage::new(
            count(self.meta.tokens.input_tokens),
            count(self.meta.tokens.output_tokens),
        )
    }
}

// Counts arrive as JSON numbers that are sometimes rendered as floats.
fn count(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Validate the usage structure of a finished backend message.
///
/// Streaming end events wrap the result in `response`; plain responses carry
/// `text` and `meta` at the top level. Both shapes are accepted.
pub fn validate_finished(value: &Value) -> Result<(String, Usage), String> {
    let candidate = value.get("response").unwrap_or(value);
    let finished = FinishedResponse::deserialize(candidate)
        .map_err(|e| format!("backend message could not be validated: {}", e))?;
    let usage = finished.usage();
    Ok((finished.text, usage))
}
