//! Upstream chat backend abstraction.
//!
//! The queue talks to the backend through the [`ChatBackend`] trait so that
//! workers do not depend on the HTTP details, and tests can substitute a
//! scripted backend.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

pub mod cohere;
pub mod decoder;
pub mod error;
pub mod types;

pub use cohere::CohereClient;
pub use decoder::StreamDecoder;
pub use error::BackendError;
pub use types::{GenerationRequest, StreamEvent, Usage};

use crate::credentials::Credential;

/// Stream of normalized events for one generation.
///
/// Implementations end the stream right after the first terminal event
/// (`Final` or `Error`) and always produce one before ending.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// A chat-completion service the queue can dispatch tasks to.
///
/// # Cancellation Safety
///
/// Dropping the returned stream (or the `generate` future) abandons the
/// upstream request. The token lets the implementation stop reading early
/// and report why.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Start a generation.
    ///
    /// # Returns
    ///
    /// - `Ok(EventStream)` once the backend accepted the request
    /// - `Err(BackendError::Upstream)` for a non-2xx answer
    /// - `Err(BackendError::Network)` if the connection failed
    /// - `Err(BackendError::InvalidResponse)` for an unusable non-streaming body
    async fn generate(
        &self,
        credential: &Credential,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, BackendError>;
}
