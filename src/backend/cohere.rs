//! Cohere chat API client.

use super::decoder::StreamDecoder;
use super::types::{validate_finished, BackendChatRequest, GenerationRequest, StreamEvent};
use super::{BackendError, ChatBackend, EventStream};
use crate::config::{BackendConfig, QueueConfig};
use crate::credentials::Credential;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Client for the Cohere `/v1/chat` endpoint.
///
/// Holds one pooled HTTP client; the credential is chosen per call.
pub struct CohereClient {
    client: Client,
    url: String,
    model: String,
    max_pending_bytes: usize,
}

impl CohereClient {
    pub fn new(client: Client, url: String, model: String, max_pending_bytes: usize) -> Self {
        Self {
            client,
            url,
            model,
            max_pending_bytes,
        }
    }

    /// Build a client with its own connection pool from configuration.
    pub fn from_config(backend: &BackendConfig, queue: &QueueConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(backend.connect_timeout_seconds))
            .pool_max_idle_per_host(queue.concurrency.max(1))
            .build()
            .map_err(BackendError::from_reqwest)?;

        Ok(Self::new(
            client,
            backend.url.clone(),
            backend.model.clone(),
            queue.max_pending_bytes,
        ))
    }

    async fn send(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, BackendError> {
        let body = BackendChatRequest::new(request, &self.model);

        let send = self
            .client
            .post(&self.url)
            .bearer_auth(credential.expose())
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            result = send => result.map_err(BackendError::from_reqwest)?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Backend returned error status");
            return Err(BackendError::upstream(status, body));
        }

        Ok(response)
    }

    async fn complete(&self, response: reqwest::Response) -> Result<EventStream, BackendError> {
        let body: serde_json::Value = response.json().await.map_err(|e| {
            BackendError::InvalidResponse(format!("Failed to parse backend response: {}", e))
        })?;

        let (text, usage) = validate_finished(&body).map_err(BackendError::InvalidResponse)?;
        Ok(stream::once(async move { StreamEvent::Final { text, usage } }).boxed())
    }

    fn relay_stream(&self, response: reqwest::Response, cancel: CancellationToken) -> EventStream {
        let mut decoder = StreamDecoder::new(self.max_pending_bytes);

        let events = async_stream::stream! {
            let mut body = response.bytes_stream();
            let mut content = String::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        yield StreamEvent::Error("generation cancelled".to_string());
                        return;
                    }
                    next = body.next() => next,
                };

                let bytes = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        warn!(error = %e, "Backend stream read failed");
                        yield StreamEvent::Error(format!("stream read error: {}", e));
                        return;
                    }
                    None => {
                        warn!(pending_bytes = decoder.pending_len(), "Backend stream ended before a final event");
                        yield StreamEvent::Error("backend stream ended before the response was complete".to_string());
                        return;
                    }
                };

                for event in decoder.feed(&bytes) {
                    match event {
                        StreamEvent::Token(text) => {
                            content.push_str(&text);
                            yield StreamEvent::Token(text);
                        }
                        StreamEvent::Final { text, usage } => {
                            if !text.is_empty() {
                                content.push_str(&text);
                                yield StreamEvent::Token(text);
                            }
                            debug!(completion_tokens = usage.completion_tokens, "Backend stream finished");
                            yield StreamEvent::Final { text: std::mem::take(&mut content), usage };
                            return;
                        }
                        error @ StreamEvent::Error(_) => {
                            yield error;
                            return;
                        }
                    }
                }
            }
        };

        events.boxed()
    }
}

#[async_trait]
impl ChatBackend for CohereClient {
    async fn generate(
        &self,
        credential: &Credential,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, BackendError> {
        let response = self.send(credential, &request, &cancel).await?;

        if request.stream {
            Ok(self.relay_stream(response, cancel))
        } else {
            tokio::select! {
                _ = cancel.cancelled() => Err(BackendError::Cancelled),
                result = self.complete(response) => result,
            }
        }
    }
}
