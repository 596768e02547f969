//! Task queue configuration

use serde::{Deserialize, Serialize};

/// Configuration for the admission queue and its worker pool.
///
/// # Example
///
/// ```toml
/// [queue]
/// concurrency = 2
/// max_size = 100
/// max_wait_seconds = 600
/// task_timeout_seconds = 180
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of tasks that may talk to the backend at the same time.
    ///
    /// Default: 1
    pub concurrency: usize,

    /// Maximum number of tasks waiting for a worker.
    ///
    /// Default: 100
    /// When the queue is full, new requests immediately return 503.
    pub max_size: u32,

    /// Maximum time a task may wait for a worker, in seconds.
    ///
    /// Default: 600
    /// Tasks exceeding this are answered with a timeout completion at dequeue.
    pub max_wait_seconds: u64,

    /// Hard ceiling on a running task, in seconds.
    ///
    /// Default: 180
    /// Armed when a worker picks the task up; the upstream call is abandoned
    /// when it fires.
    pub task_timeout_seconds: u64,

    /// Largest unparsed fragment the stream decoder will buffer, in bytes.
    ///
    /// Default: 1 MiB
    pub max_pending_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_size: 100,
            max_wait_seconds: 600,
            task_timeout_seconds: 180,
            max_pending_bytes: 1024 * 1024,
        }
    }
}
