//! Plaintext usage summary served at `/`.

use crate::api::AppState;
use crate::queue::StatsSnapshot;
use axum::{extract::State, http::header, response::IntoResponse};
use std::sync::Arc;

/// GET /
pub async fn handle(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = render(
        &state.stats.snapshot(),
        state.queue.depth(),
        state.queue.running(),
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

pub(crate) fn render(snapshot: &StatsSnapshot, queued: usize, running: usize) -> String {
    format!(
        "# Stats\n\
         \x20 - Uptime: {}\n\
         \x20 - Total Token Usage: {}\n\
         \x20 - Total Completion Tokens: {}\n\
         \x20 - Total Prompt Tokens: {}\n\
         \x20 - Total Requests Served: {}\n\
         \x20 - Requests in Queue: {}\n\
         \x20 - Requests Running: {}",
        snapshot.uptime.as_secs(),
        snapshot.total_token_usage,
        snapshot.total_completion_tokens,
        snapshot.total_prompt_tokens,
        snapshot.total_requests_served,
        queued,
        running,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_render_stats() {
        let snapshot = StatsSnapshot {
            uptime: Duration::from_secs(42),
            total_token_usage: 4,
            total_prompt_tokens: 3,
            total_completion_tokens: 1,
            total_requests_served: 1,
        };

        let text = render(&snapshot, 2, 1);
        assert!(text.starts_with("# Stats\n  - Uptime: 42\n"));
        assert!(text.contains("  - Total Token Usage: 4\n"));
        assert!(text.contains("  - Total Prompt Tokens: 3\n"));
        assert!(text.contains("  - Requests in Queue: 2\n"));
        assert!(text.ends_with("  - Requests Running: 1"));
    }
}
