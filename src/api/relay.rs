//! Renders task results in the OpenAI wire format.

use super::types::{
    AssistantMessage, ChatCompletionChunk, ChatCompletionResponse, Choice, ChunkChoice, ChunkDelta,
};
use crate::queue::{Completion, TaskEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use uuid::Uuid;

/// Identity shared by every frame of one response.
#[derive(Debug, Clone)]
pub struct ResponseFrames {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ResponseFrames {
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
        }
    }

    /// Single-shot `chat.completion` object.
    pub fn completion(&self, completion: &Completion) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: self.id.clone(),
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: completion.content.clone(),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: completion.usage.unwrap_or_default(),
        }
    }

    /// Incremental frame carrying one token.
    pub fn delta(&self, content: String) -> ChatCompletionChunk {
        self.chunk(content, None)
    }

    /// Closing frame: empty on success, the error text on failure.
    pub fn terminal(&self, completion: &Completion) -> ChatCompletionChunk {
        let content = if completion.failed {
            completion.content.clone()
        } else {
            String::new()
        };
        self.chunk(content, Some("stop".to_string()))
    }

    fn chunk(&self, content: String, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(content),
                },
                finish_reason,
            }],
        }
    }
}

fn frame(chunk: &ChatCompletionChunk) -> Event {
    Event::default().data(serde_json::to_string(chunk).unwrap_or_default())
}

/// SSE body for a task: one delta frame per token, then the terminal frame,
/// then the stream ends.
pub fn sse_stream<S>(frames: ResponseFrames, events: S) -> impl Stream<Item = Result<Event, Infallible>>
where
    S: Stream<Item = TaskEvent> + Send + 'static,
{
    async_stream::stream! {
        let mut events = Box::pin(events);
        let mut completed = false;

        while let Some(event) = events.next().await {
            match event {
                TaskEvent::Token(text) => yield Ok(frame(&frames.delta(text))),
                TaskEvent::Completed(completion) => {
                    yield Ok(frame(&frames.terminal(&completion)));
                    completed = true;
                    break;
                }
            }
        }

        if !completed {
            let completion = Completion::failure("task ended without a result");
            yield Ok(frame(&frames.terminal(&completion)));
        }
    }
}

/// Wrap an event stream as an SSE response with keep-alive comments.
pub fn sse_response<S>(
    frames: ResponseFrames,
    events: S,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = TaskEvent> + Send + 'static,
{
    Sse::new(sse_stream(frames, events)).keep_alive(KeepAlive::default())
}
