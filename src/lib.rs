//! commandr - OpenAI-compatible gateway for the Cohere chat API
//!
//! Accepts OpenAI chat-completion requests, converts them to the Cohere
//! protocol, and runs them through a bounded worker queue that allows one
//! in-flight request per client and rotates across several backend keys.
//! Streaming responses are relayed token by token as server-sent events.

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod convert;
pub mod credentials;
pub mod logging;
pub mod metrics;
pub mod queue;
