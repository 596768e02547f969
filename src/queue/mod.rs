//! Admission control and task queue.
//!
//! Each client identity may have one task queued or running at a time. Tasks
//! wait in a bounded FIFO channel until one of a fixed pool of workers picks
//! them up (see [`worker`]). Workers report progress to the submitting
//! handler over a per-task event channel.

pub mod locks;
pub mod stats;
pub mod worker;

pub use locks::{ClientLease, ClientLocks};
pub use stats::{AggregateStats, StatsSnapshot};
pub use worker::{spawn_workers, TaskFailure};

use crate::backend::{GenerationRequest, Usage};
use crate::config::QueueConfig;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Progress reported to the caller of [`TaskQueue::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// Incremental text, streaming tasks only.
    Token(String),
    /// Terminal event. Always the last one sent for a task.
    Completed(Completion),
}

/// Final result of a task as shown to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
    pub failed: bool,
}

impl Completion {
    pub fn success(content: String, usage: Usage) -> Self {
        Self {
            content,
            usage: Some(usage),
            failed: false,
        }
    }

    /// Error completion; the detail is wrapped in the message clients see.
    pub fn failure(detail: impl fmt::Display) -> Self {
        Self {
            content: format!("Unexpected error during generation: ```{}```", detail),
            usage: None,
            failed: true,
        }
    }

    /// Failed completion whose content is shown as-is.
    pub fn rejected(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
            failed: true,
        }
    }
}

/// Errors returned at submission time.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The client already has a task queued or running.
    #[error("Too many requests: client {client_id} already has a request in flight")]
    AdmissionRejected { client_id: String },

    /// Queue is full (depth == max_size)
    #[error("Queue is full ({max_size} requests)")]
    Full { max_size: u32 },

    #[error("Server is shutting down")]
    ShuttingDown,
}

/// A unit of work owned by the queue from submission to completion.
pub struct Task {
    pub id: Uuid,
    pub request: GenerationRequest,
    pub created_at: Instant,
    pub events: mpsc::UnboundedSender<TaskEvent>,
    pub lease: ClientLease,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("client_id", &self.lease.client_id())
            .field("stream", &self.request.stream)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Receiving side of a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: Uuid,
    events: mpsc::UnboundedReceiver<TaskEvent>,
}

impl TaskHandle {
    /// Next event, or `None` once the task is gone.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal event, skipping tokens.
    pub async fn completion(mut self) -> Completion {
        while let Some(event) = self.events.recv().await {
            if let TaskEvent::Completed(completion) = event {
                return completion;
            }
        }
        Completion::failure("task ended without a result")
    }
}

/// Bounded FIFO of admitted tasks plus the bookkeeping shared with workers.
pub struct TaskQueue {
    tx: mpsc::Sender<Task>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Task>>,
    depth: AtomicUsize,
    running: AtomicUsize,
    locks: ClientLocks,
    stats: Arc<AggregateStats>,
    config: QueueConfig,
    shutdown: CancellationToken,
}

impl TaskQueue {
    pub fn new(config: QueueConfig, stats: Arc<AggregateStats>) -> Self {
        let (tx, rx) = mpsc::channel((config.max_size as usize).max(1));
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            depth: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            locks: ClientLocks::new(),
            stats,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cheap admission check without taking the client lock.
    ///
    /// Lets callers turn away a busy client before doing any work on its
    /// request. `submit` still decides atomically.
    pub fn check_admission(&self, client_id: &str) -> Result<(), QueueError> {
        if self.is_shutting_down() {
            return Err(QueueError::ShuttingDown);
        }
        if self.locks.is_locked(client_id) {
            metrics::counter!("proxy_admission_rejected_total").increment(1);
            return Err(QueueError::AdmissionRejected {
                client_id: client_id.to_string(),
            });
        }
        Ok(())
    }

    /// Admit a task for `client_id`.
    ///
    /// Fails without side effects if the client already has a task in flight,
    /// the queue is full, or shutdown has begun.
    pub fn submit(
        &self,
        client_id: &str,
        request: GenerationRequest,
    ) -> Result<TaskHandle, QueueError> {
        if self.is_shutting_down() {
            return Err(QueueError::ShuttingDown);
        }

        let lease = self.locks.try_acquire(client_id).ok_or_else(|| {
            metrics::counter!("proxy_admission_rejected_total").increment(1);
            QueueError::AdmissionRejected {
                client_id: client_id.to_string(),
            }
        })?;

        // CAS loop so concurrent submitters cannot overshoot max_size
        loop {
            let current = self.depth.load(Ordering::SeqCst);
            if current >= self.config.max_size as usize {
                return Err(QueueError::Full {
                    max_size: self.config.max_size,
                });
            }
            if self
                .depth
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let task = Task {
            id: Uuid::new_v4(),
            request,
            created_at: Instant::now(),
            events,
            lease,
        };
        let task_id = task.id;

        if self.tx.try_send(task).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.publish_depth();
            return Err(QueueError::Full {
                max_size: self.config.max_size,
            });
        }
        self.publish_depth();

        tracing::debug!(task_id = %task_id, client_id, depth = self.depth(), "Task queued");

        Ok(TaskHandle {
            task_id,
            events: receiver,
        })
    }

    /// Wait for the next task. Returns `None` once shutdown has begun.
    pub(crate) async fn next_task(&self) -> Option<Task> {
        let mut rx = self.rx.lock().await;
        let task = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            task = rx.recv() => task,
        };
        if task.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.publish_depth();
        }
        task
    }

    /// Stop accepting work, stop the workers and answer every queued task
    /// with an error completion.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut drained = 0usize;
        while let Ok(task) = rx.try_recv() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.finish(&task.id, "shutdown", None);
            let Task { events, lease, .. } = task;
            drop(lease);
            let _ = events.send(TaskEvent::Completed(Completion::failure(
                TaskFailure::ShuttingDown,
            )));
            drained += 1;
        }
        self.publish_depth();

        if drained > 0 {
            tracing::info!(drained, "Answered queued tasks during shutdown");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Tasks waiting for a worker.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Tasks currently talking to the backend.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn locks(&self) -> &ClientLocks {
        &self.locks
    }

    pub fn stats(&self) -> &Arc<AggregateStats> {
        &self.stats
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn task_started(&self) {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("proxy_tasks_running").set(running as f64);
    }

    pub(crate) fn task_stopped(&self) {
        let running = self.running.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("proxy_tasks_running").set(running as f64);
    }

    /// Terminal bookkeeping shared by every path that ends a task.
    pub(crate) fn finish(&self, task_id: &Uuid, outcome: &'static str, usage: Option<Usage>) {
        self.stats.record(usage);
        metrics::counter!("proxy_requests_total", "outcome" => outcome).increment(1);
        tracing::debug!(task_id = %task_id, outcome, "Task recorded");
    }

    fn publish_depth(&self) {
        metrics::gauge!("proxy_queue_depth").set(self.depth() as f64);
    }
}
