//! End-to-end chat completion tests against a mock backend.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_non_streaming_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .and(header("authorization", "Bearer key-a"))
        .and(body_partial_json(json!({
            "message": "hi",
            "chat_history": [],
            "stream": false,
            "temperature": 0.3,
            "prompt_truncation": "OFF",
            "connectors": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_completion("hello", 3, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["object"], "chat.completion");
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["model"], "command-r-plus");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "hello");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        body["usage"],
        json!({"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4})
    );

    let snapshot = app.stats.snapshot();
    assert_eq!(snapshot.total_token_usage, 4);
    assert_eq!(snapshot.total_requests_served, 1);
}

#[tokio::test]
async fn test_null_stream_is_non_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_completion("hello", 3, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "user", "content": "hi"}], "stream": null}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "hello");
}

#[tokio::test]
async fn test_streaming_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(backend_stream(&["he", "llo"], 3, 1)))
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "user", "content": "hi"}], "stream": true}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/event-stream"));

    let body = body_to_string(response.into_body()).await;
    assert!(!body.contains("[DONE]"));

    let frames = sse_payloads(&body);
    assert_eq!(frames.len(), 3, "unexpected frames: {:?}", frames);

    let contents: Vec<_> = frames
        .iter()
        .map(|f| f["choices"][0]["delta"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["he", "llo", ""]);

    assert!(frames[0]["choices"][0]["finish_reason"].is_null());
    assert!(frames[1]["choices"][0]["finish_reason"].is_null());
    assert_eq!(frames[2]["choices"][0]["finish_reason"], "stop");

    for frame in &frames {
        assert_eq!(frame["object"], "chat.completion.chunk");
        assert_eq!(frame["id"], frames[0]["id"]);
        assert_eq!(frame["created"], frames[0]["created"]);
        assert_eq!(frame["model"], "command-r-plus");
    }

    assert_eq!(app.stats.snapshot().total_token_usage, 4);
}

#[tokio::test]
async fn test_backend_error_becomes_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Unexpected error during generation: ```Backend error: 500 Internal Server Error | internal failure```"
    );
    assert_eq!(body["usage"]["total_tokens"], 0);

    let snapshot = app.stats.snapshot();
    assert_eq!(snapshot.total_requests_served, 1);
    assert_eq!(snapshot.total_token_usage, 0);
    assert!(app.queue.locks().is_empty());
}

#[tokio::test]
async fn test_backend_error_in_stream_is_single_terminal_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "user", "content": "hi"}], "stream": true}),
        ))
        .await
        .unwrap();

    let frames = sse_payloads(&body_to_string(response.into_body()).await);
    assert_eq!(frames.len(), 1);
    let content = frames[0]["choices"][0]["delta"]["content"].as_str().unwrap();
    assert!(content.starts_with("Unexpected error during generation: ```Backend error: 500"));
    assert_eq!(frames[0]["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_stream_cut_short_reports_error_after_tokens() {
    let server = MockServer::start().await;
    let truncated = concat!(
        r#"{"is_finished":false,"event_type":"text-generation","text":"he"}"#,
        "\n",
        r#"{"is_finished":false,"event_type":"text-gen"#
    );
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(truncated))
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "user", "content": "hi"}], "stream": true}),
        ))
        .await
        .unwrap();

    let frames = sse_payloads(&body_to_string(response.into_body()).await);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["choices"][0]["delta"]["content"], "he");
    let last = frames[1]["choices"][0]["delta"]["content"].as_str().unwrap();
    assert!(last.contains("ended before"));
}

#[tokio::test]
async fn test_history_and_roles_are_translated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BACKEND_PATH))
        .and(body_partial_json(json!({
            "message": "and now?",
            "chat_history": [
                {"role": "USER", "message": "be brief.hello"},
                {"role": "CHATBOT", "message": "hi"}
            ],
            "temperature": 0.7
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_completion("ok", 5, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({
                "model": "gpt-4",
                "temperature": 0.7,
                "messages": [
                    {"role": "system", "content": "be brief."},
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi"},
                    {"role": "user", "content": "and now?"}
                ]
            }),
        ))
        .await
        .unwrap();

    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["choices"][0]["message"]["content"], "ok");
}

#[tokio::test]
async fn test_malformed_messages_answered_as_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": [{"role": "tool", "content": "x"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.starts_with("Failed to convert the messages"));
    assert!(app.queue.locks().is_empty());
}

#[tokio::test]
async fn test_malformed_messages_in_stream_mode() {
    let server = MockServer::start().await;
    let app = make_app_with_mock(&server);

    let response = app
        .router
        .clone()
        .oneshot(chat_request(
            "10.0.0.1",
            json!({"messages": "hello", "stream": true}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let frames = sse_payloads(&body_to_string(response.into_body()).await);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["choices"][0]["finish_reason"], "stop");
    assert!(frames[0]["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap()
        .contains("must be an array"));
}

#[tokio::test]
async fn test_invalid_json_body_is_bad_request() {
    let server = MockServer::start().await;
    let app = make_app_with_mock(&server);

    let mut request = Request::builder()
        .method("POST")
        .uri("/commandr/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    request
        .extensions_mut()
        .insert(axum::extract::ConnectInfo("10.0.0.1:1234".parse::<std::net::SocketAddr>().unwrap()));

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_missing_client_address_is_bad_request() {
    let server = MockServer::start().await;
    let app = make_app_with_mock(&server);

    let request = Request::builder()
        .method("POST")
        .uri("/commandr/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"messages": [{"role": "user", "content": "hi"}]}).to_string(),
        ))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_credentials_rotate_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer key-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_completion("from a", 1, 1)))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer key-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_completion("from b", 1, 1)))
        .expect(2)
        .mount(&server)
        .await;

    let app = make_app_with_mock(&server);
    let mut contents = Vec::new();
    for _ in 0..4 {
        let response = app
            .router
            .clone()
            .oneshot(chat_request(
                "10.0.0.1",
                json!({"messages": [{"role": "user", "content": "hi"}]}),
            ))
            .await
            .unwrap();
        let body = body_to_json(response.into_body()).await;
        contents.push(body["choices"][0]["message"]["content"].as_str().unwrap().to_string());
    }

    assert_eq!(contents, vec!["from a", "from b", "from a", "from b"]);
}
