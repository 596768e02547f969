//! Shared helpers for the gateway integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use commandr::api::{create_router, AppState};
use commandr::backend::{ChatBackend, CohereClient};
use commandr::config::ProxyConfig;
use commandr::credentials::CredentialRotator;
use commandr::queue::{spawn_workers, AggregateStats, TaskQueue};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use wiremock::MockServer;

pub const BACKEND_PATH: &str = "/v1/chat";

pub struct TestApp {
    pub router: Router,
    pub queue: Arc<TaskQueue>,
    pub stats: Arc<AggregateStats>,
}

/// Default configuration pointed at a mock backend.
pub fn test_config(server: &MockServer) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.backend.url = format!("{}{}", server.uri(), BACKEND_PATH);
    config.backend.credentials = vec!["key-a".to_string(), "key-b".to_string()];
    config
}

/// Wire a full router, queue and worker pool against the mock backend.
pub fn make_app(config: ProxyConfig) -> TestApp {
    let rotator = Arc::new(CredentialRotator::new(&config.backend.credentials).unwrap());
    let backend: Arc<dyn ChatBackend> =
        Arc::new(CohereClient::from_config(&config.backend, &config.queue).unwrap());
    let stats = Arc::new(AggregateStats::new());
    let queue = Arc::new(TaskQueue::new(config.queue.clone(), Arc::clone(&stats)));
    spawn_workers(Arc::clone(&queue), backend, rotator);

    let state = Arc::new(AppState::new(
        Arc::new(config),
        Arc::clone(&queue),
        Arc::clone(&stats),
    ));

    TestApp {
        router: create_router(state),
        queue,
        stats,
    }
}

pub fn make_app_with_mock(server: &MockServer) -> TestApp {
    make_app(test_config(server))
}

/// POST a chat completion as if it came from `client_ip`.
pub fn chat_request(client_ip: &str, body: Value) -> Request<Body> {
    chat_request_at("/commandr/v1/chat/completions", client_ip, body)
}

pub fn chat_request_at(uri: &str, client_ip: &str, body: Value) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let addr: SocketAddr = format!("{}:40000", client_ip).parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub async fn body_to_json(body: Body) -> Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}

/// Parse the `data:` payloads of an SSE body, skipping keep-alive comments.
pub fn sse_payloads(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|event| {
            event
                .lines()
                .find_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        })
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

/// Non-streaming backend answer.
pub fn backend_completion(text: &str, input: u32, output: u32) -> Value {
    serde_json::json!({
        "response_id": "r-1",
        "text": text,
        "generation_id": "g-1",
        "finish_reason": "COMPLETE",
        "meta": {"tokens": {"input_tokens": input, "output_tokens": output}}
    })
}

/// Streaming backend body: one JSON object per line, ending with stream-end.
pub fn backend_stream(tokens: &[&str], input: u32, output: u32) -> String {
    let mut lines = vec![r#"{"is_finished":false,"event_type":"stream-start","generation_id":"g-1"}"#.to_string()];
    for token in tokens {
        lines.push(
            serde_json::json!({"is_finished": false, "event_type": "text-generation", "text": token})
                .to_string(),
        );
    }
    lines.push(
        serde_json::json!({
            "is_finished": true,
            "event_type": "stream-end",
            "finish_reason": "COMPLETE",
            "response": {
                "text": tokens.concat(),
                "meta": {"tokens": {"input_tokens": input, "output_tokens": output}}
            }
        })
        .to_string(),
    );
    lines.join("\n") + "\n"
}
