//! Worker loop pulling ready tasks from the store and executing them.

use super::models::{Task, TaskKind};
use super::registry::{TaskFailure, TaskOutcome, TaskRegistry};
use super::retry_policy::RetryPolicy;
use super::store::TaskStore;
use anyhow::Result;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happened to a task after one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    Completed,
    Skipped(String),
    /// Failed, scheduled to run again at the given unix timestamp.
    Retrying { run_at: i64 },
    /// Failed for good and recorded in the completed log.
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: String,
    pub kind: TaskKind,
    pub disposition: TaskDisposition,
}

pub struct TaskWorker {
    store: Arc<dyn TaskStore>,
    registry: Arc<TaskRegistry>,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
}

impl TaskWorker {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<TaskRegistry>,
        retry_policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            retry_policy,
            poll_interval,
        }
    }

    /// Executes the next ready task, if there is one.
    pub async fn run_once(&self) -> Result<Option<TaskReport>> {
        let now = chrono::Utc::now().timestamp();
        let Some(task) = self.store.dequeue_ready(now)? else {
            return Ok(None);
        };

        debug!("Running {} [{}] ({})", task.kind, task.id, task.label);
        let started = Instant::now();
        let result = self.execute(&task).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        let disposition = match result {
            Ok(TaskOutcome::Completed) => {
                self.store.complete(&task, None, duration_ms)?;
                info!("Task {} ({}) completed in {}ms", task.kind, task.label, duration_ms);
                TaskDisposition::Completed
            }
            Ok(TaskOutcome::Skipped(reason)) => {
                self.store.complete(&task, None, duration_ms)?;
                debug!("Task {} ({}) skipped: {}", task.kind, task.label, reason);
                TaskDisposition::Skipped(reason)
            }
            Err(failure) => self.handle_failure(&task, failure, duration_ms, now)?,
        };

        Ok(Some(TaskReport {
            task_id: task.id,
            kind: task.kind,
            disposition,
        }))
    }

    async fn execute(&self, task: &Task) -> Result<TaskOutcome, TaskFailure> {
        let Some(handler) = self.registry.get(task.kind) else {
            return Err(TaskFailure::fatal(format!(
                "MissingHandler: no handler registered for {}",
                task.kind
            )));
        };

        match AssertUnwindSafe(handler.run(task)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(TaskFailure::fatal(format!(
                "{} panicked\nHandlerPanic: task handler panicked",
                task.kind
            ))),
        }
    }

    fn handle_failure(
        &self,
        task: &Task,
        failure: TaskFailure,
        duration_ms: i64,
        now: i64,
    ) -> Result<TaskDisposition> {
        let failed_attempts = task.attempts + 1;
        if self.retry_policy.should_retry(&failure, failed_attempts) {
            let run_at = self.retry_policy.next_retry_at(failed_attempts, now);
            self.store.retry_later(task, run_at, &failure.trace)?;
            warn!(
                "Task {} ({}) failed (attempt {}/{}), retrying in {}s: {}",
                task.kind,
                task.label,
                failed_attempts,
                self.retry_policy.max_attempts,
                run_at - now,
                last_line(&failure.trace)
            );
            Ok(TaskDisposition::Retrying { run_at })
        } else {
            self.store.complete(task, Some(&failure.trace), duration_ms)?;
            error!(
                "Task {} ({}) failed permanently after {} attempts: {}",
                task.kind,
                task.label,
                failed_attempts,
                last_line(&failure.trace)
            );
            Ok(TaskDisposition::Failed)
        }
    }

    /// Processes tasks until `shutdown` is cancelled, sleeping `poll_interval`
    /// whenever the queue has nothing ready.
    pub async fn run(&self, worker_id: usize, shutdown: CancellationToken) {
        info!("Task worker {} started", worker_id);
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("Task worker {} error: {:#}", worker_id, e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Task worker {} stopped", worker_id);
    }
}

fn last_line(trace: &str) -> &str {
    trace.trim().lines().last().unwrap_or_default()
}

/// Runs `count` workers sharing `worker` until `shutdown` is cancelled.
pub async fn run_worker_pool(worker: Arc<TaskWorker>, count: usize, shutdown: CancellationToken) {
    let loops = (0..count.max(1)).map(|worker_id| {
        let worker = Arc::clone(&worker);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(worker_id, shutdown).await })
    });
    for result in futures::future::join_all(loops).await {
        if let Err(e) = result {
            error!("Task worker terminated abnormally: {}", e);
        }
    }
}
