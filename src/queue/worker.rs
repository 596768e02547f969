//! Worker pool that drives queued tasks against the backend.

use super::{Completion, Task, TaskEvent, TaskQueue};
use crate::backend::{ChatBackend, GenerationRequest, StreamEvent, Usage};
use crate::credentials::{Credential, CredentialRotator};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Why a task ended without a successful completion.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("{0}")]
    Backend(String),

    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("request waited more than {seconds}s for a free worker")]
    QueueTimeout { seconds: u64 },

    #[error("caller disconnected")]
    Abandoned,

    #[error("worker failed: {0}")]
    Panicked(String),

    #[error("server is shutting down")]
    ShuttingDown,
}

impl TaskFailure {
    /// Label for the `outcome` metric and log field.
    pub fn outcome(&self) -> &'static str {
        match self {
            TaskFailure::Backend(_) => "error",
            TaskFailure::Timeout { .. } | TaskFailure::QueueTimeout { .. } => "timeout",
            TaskFailure::Abandoned => "abandoned",
            TaskFailure::Panicked(_) => "panic",
            TaskFailure::ShuttingDown => "shutdown",
        }
    }
}

#[derive(Clone)]
struct Worker {
    queue: Arc<TaskQueue>,
    backend: Arc<dyn ChatBackend>,
    rotator: Arc<CredentialRotator>,
}

/// Start `concurrency` workers that pull from `queue` until it shuts down.
pub fn spawn_workers(
    queue: Arc<TaskQueue>,
    backend: Arc<dyn ChatBackend>,
    rotator: Arc<CredentialRotator>,
) -> Vec<JoinHandle<()>> {
    let concurrency = queue.config().concurrency.max(1);
    let worker = Worker {
        queue,
        backend,
        rotator,
    };

    (0..concurrency)
        .map(|index| {
            let worker = worker.clone();
            tokio::spawn(
                async move { worker.run().await }
                    .instrument(tracing::info_span!("worker", worker = index)),
            )
        })
        .collect()
}

impl Worker {
    async fn run(self) {
        debug!("Worker started");
        while let Some(task) = self.queue.next_task().await {
            self.dispatch(task).await;
        }
        debug!("Worker stopped");
    }

    async fn dispatch(&self, task: Task) {
        if task.events.is_closed() {
            debug!(task_id = %task.id, client_id = task.lease.client_id(), "Caller gone, skipping task");
            self.queue.finish(&task.id, TaskFailure::Abandoned.outcome(), None);
            return;
        }

        let max_wait = self.queue.config().max_wait_seconds;
        if task.created_at.elapsed() > Duration::from_secs(max_wait) {
            warn!(
                task_id = %task.id,
                client_id = task.lease.client_id(),
                waited_ms = task.created_at.elapsed().as_millis() as u64,
                "Task timed out in queue"
            );
            let failure = TaskFailure::QueueTimeout { seconds: max_wait };
            self.queue.finish(&task.id, failure.outcome(), None);
            let Task { events, lease, .. } = task;
            drop(lease);
            let _ = events.send(TaskEvent::Completed(Completion::failure(failure)));
            return;
        }

        let (credential_index, credential) = self.rotator.next();
        let task_id = task.id;
        let events = task.events.clone();

        // Run in a separate task so a panic is contained and reported.
        self.queue.task_started();
        let joined = tokio::spawn(self.clone().execute(task, credential_index, credential)).await;
        self.queue.task_stopped();

        if let Err(join_error) = joined {
            error!(task_id = %task_id, error = %join_error, "Task panicked");
            let failure = TaskFailure::Panicked(join_error.to_string());
            self.queue.finish(&task_id, failure.outcome(), None);
            let _ = events.send(TaskEvent::Completed(Completion::failure(failure)));
        }
    }

    async fn execute(self, task: Task, credential_index: usize, credential: Credential) {
        let Task {
            id,
            request,
            created_at,
            events,
            lease,
        } = task;
        let timeout_seconds = self.queue.config().task_timeout_seconds;
        let cancel = CancellationToken::new();

        debug!(
            task_id = %id,
            client_id = lease.client_id(),
            credential_index,
            stream = request.stream,
            "Task started"
        );

        let generation = self.generate(&credential, request, &events, cancel.clone());
        let result = tokio::select! {
            result = tokio::time::timeout(Duration::from_secs(timeout_seconds), generation) => {
                result.unwrap_or(Err(TaskFailure::Timeout { seconds: timeout_seconds }))
            }
            _ = events.closed() => Err(TaskFailure::Abandoned),
        };
        // Whichever branch lost has already dropped the backend call.
        cancel.cancel();

        let (completion, outcome, usage) = match result {
            Ok((content, usage)) => (Completion::success(content, usage), "success", Some(usage)),
            Err(failure) => {
                let outcome = failure.outcome();
                (Completion::failure(&failure), outcome, None)
            }
        };

        self.queue.finish(&id, outcome, usage);
        metrics::histogram!("proxy_task_duration_seconds").record(created_at.elapsed().as_secs_f64());
        info!(
            task_id = %id,
            client_id = lease.client_id(),
            credential_index,
            outcome,
            elapsed_ms = created_at.elapsed().as_millis() as u64,
            "Task finished"
        );

        // Release before answering so the client can submit again immediately.
        drop(lease);
        let _ = events.send(TaskEvent::Completed(completion));
    }

    async fn generate(
        &self,
        credential: &Credential,
        request: GenerationRequest,
        events: &mpsc::UnboundedSender<TaskEvent>,
        cancel: CancellationToken,
    ) -> Result<(String, Usage), TaskFailure> {
        let mut stream = self
            .backend
            .generate(credential, request, cancel)
            .await
            .map_err(|e| TaskFailure::Backend(e.to_string()))?;

        let mut content = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Token(text) => {
                    content.push_str(&text);
                    let _ = events.send(TaskEvent::Token(text));
                }
                StreamEvent::Final { text, usage } => {
                    let content = if text.is_empty() { content } else { text };
                    return Ok((content, usage));
                }
                StreamEvent::Error(message) => return Err(TaskFailure::Backend(message)),
            }
        }

        Err(TaskFailure::Backend(
            "backend stream ended without a result".to_string(),
        ))
    }
}
