use super::relay::{sse_response, ResponseFrames};
use super::types::{ApiError, ChatCompletionRequest};
use super::AppState;
use crate::backend::GenerationRequest;
use crate::convert::convert_messages;
use crate::logging::generate_request_id;
use crate::queue::{Completion, TaskEvent};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

/// POST /<ns>/v1/chat/completions
pub async fn handle(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request_id = generate_request_id();

    let client_ip = client_identity(
        &headers,
        connect_info.as_ref(),
        state.config.server.trust_proxy_headers,
    )
    .ok_or_else(|| ApiError::bad_request("Unable to determine client address"))?;
    let client_id = client_ip.to_string();

    // Busy clients are turned away before their body is looked at
    state.queue.check_admission(&client_id).map_err(|e| {
        warn!(request_id = %request_id, client_id = %client_id, error = %e, "Request not admitted");
        ApiError::from(e)
    })?;

    let Json(request) = payload.map_err(|e| {
        warn!(request_id = %request_id, client_id = %client_id, error = %e, "Rejected request body");
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(&e.body_text())
        } else {
            ApiError::bad_request(&e.body_text())
        }
    })?;
    let frames = ResponseFrames::new(&state.config.backend.model);

    let turns = match convert_messages(&request.messages) {
        Ok(turns) => turns,
        Err(e) => {
            warn!(request_id = %request_id, client_id = %client_id, error = %e, "Failed to convert messages");
            let completion = Completion::rejected(format!("Failed to convert the messages: {}", e));
            return Ok(respond_once(frames, completion, request.stream));
        }
    };

    let generation = GenerationRequest {
        turns,
        stream: request.stream,
        temperature: request
            .temperature
            .unwrap_or(state.config.backend.default_temperature),
    };

    let mut handle = state.queue.submit(&client_id, generation).map_err(|e| {
        warn!(request_id = %request_id, client_id = %client_id, error = %e, "Request not admitted");
        ApiError::from(e)
    })?;

    info!(
        request_id = %request_id,
        client_id = %client_id,
        task_id = %handle.task_id,
        stream = request.stream,
        "Request admitted"
    );

    if request.stream {
        let events = async_stream::stream! {
            while let Some(event) = handle.next_event().await {
                yield event;
            }
        };
        Ok(sse_response(frames, events).into_response())
    } else {
        let completion = handle.completion().await;
        Ok(Json(frames.completion(&completion)).into_response())
    }
}

/// Answer without queueing, as a completion object or a one-frame stream.
fn respond_once(frames: ResponseFrames, completion: Completion, stream: bool) -> Response {
    if stream {
        let events = stream::iter([TaskEvent::Completed(completion)]);
        sse_response(frames, events).into_response()
    } else {
        Json(frames.completion(&completion)).into_response()
    }
}

/// Identify the caller: the peer address, or the leftmost `X-Forwarded-For`
/// entry when proxy headers are trusted.
pub(crate) fn client_identity(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    if trust_proxy_headers {
        if let Some(ip) = leftmost_forwarded_for(headers) {
            return Some(ip);
        }
    }
    connect_info.map(|ConnectInfo(addr)| addr.ip())
}

fn leftmost_forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    first
        .parse::<IpAddr>()
        .ok()
        .or_else(|| first.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
