//! Process-wide usage counters.

use crate::backend::Usage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Aggregate token usage and request count since startup.
///
/// Written by queue workers, read by the stats endpoint.
#[derive(Debug)]
pub struct AggregateStats {
    total_token_usage: AtomicU64,
    total_prompt_tokens: AtomicU64,
    total_completion_tokens: AtomicU64,
    total_requests_served: AtomicU64,
    started_at: Instant,
}

/// Point-in-time copy of [`AggregateStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub total_token_usage: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_requests_served: u64,
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateStats {
    pub fn new() -> Self {
        Self {
            total_token_usage: AtomicU64::new(0),
            total_prompt_tokens: AtomicU64::new(0),
            total_completion_tokens: AtomicU64::new(0),
            total_requests_served: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one finished task. Usage is added when known; the served
    /// counter is bumped either way.
    pub fn record(&self, usage: Option<Usage>) {
        if let Some(usage) = usage {
            self.total_prompt_tokens
                .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
            self.total_completion_tokens
                .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
            self.total_token_usage
                .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);

            metrics::counter!("proxy_tokens_total", "type" => "prompt")
                .increment(u64::from(usage.prompt_tokens));
            metrics::counter!("proxy_tokens_total", "type" => "completion")
                .increment(u64::from(usage.completion_tokens));
        }
        self.total_requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.uptime(),
            total_token_usage: self.total_token_usage.load(Ordering::Relaxed),
            total_prompt_tokens: self.total_prompt_tokens.load(Ordering::Relaxed),
            total_completion_tokens: self.total_completion_tokens.load(Ordering::Relaxed),
            total_requests_served: self.total_requests_served.load(Ordering::Relaxed),
        }
    }
}
