//! Incremental decoder for the backend's streaming body.
//!
//! The backend streams one JSON object per event, but network reads do not
//! respect object boundaries: an object may arrive split over several reads,
//! or several objects may arrive in one read. The decoder buffers bytes until
//! complete objects can be parsed and turns each into a [`StreamEvent`].

use super::types::{validate_finished, StreamEvent};
use serde_json::Value;

/// Default cap on buffered, not-yet-parseable bytes.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Stateful chunk-to-event decoder.
#[derive(Debug)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    max_pending: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_BYTES)
    }
}

impl StreamDecoder {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
        }
    }

    /// Bytes carried over to the next read.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume one network read and return every event it completes.
    ///
    /// Data that does not parse yet is kept and nothing is emitted for it.
    /// Once the carried-over data exceeds the cap, an error event is emitted
    /// and the buffer is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        {
            let mut objects = serde_json::Deserializer::from_slice(&self.pending).into_iter::<Value>();
            while let Some(Ok(value)) = objects.next() {
                consumed = objects.byte_offset();
                if let Some(event) = decode_event(&value) {
                    let terminal = event.is_terminal();
                    events.push(event);
                    if terminal {
                        break;
                    }
                }
            }
        }

        // Anything after the last complete object (a partial object, or data
        // that is not JSON yet) waits for the next read.
        self.pending.drain(..consumed);
        if self.pending.iter().all(u8::is_ascii_whitespace) {
            self.pending.clear();
        }

        if self.pending.len() > self.max_pending {
            tracing::warn!(
                pending_bytes = self.pending.len(),
                limit = self.max_pending,
                "Discarding unparseable stream data"
            );
            self.pending.clear();
            events.push(StreamEvent::Error(format!(
                "stream parse error: more than {} bytes without a complete event",
                self.max_pending
            )));
        }

        events
    }
}

/// Map one backend event object to a stream event.
///
/// Non-final events with empty text (stream start, tool chatter) yield nothing.
pub fn decode_event(value: &Value) -> Option<StreamEvent> {
    let text = value.get("text").and_then(Value::as_str).unwrap_or_default();
    let finished = value
        .get("is_finished")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if finished {
        return Some(match validate_finished(value) {
            Ok((_, usage)) => StreamEvent::Final {
                text: text.to_string(),
                usage,
            },
            Err(message) => StreamEvent::Error(message),
        });
    }

    if text.is_empty() {
        None
    } else {
        Some(StreamEvent::Token(text.to_string()))
    }
}
