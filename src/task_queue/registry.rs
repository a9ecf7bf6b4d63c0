//! Lookup table binding each [`TaskKind`] to the handler that executes it.

use super::models::{Task, TaskKind};
use super::retry_policy::RetryableError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Successful end of a task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// Nothing to do; the reason is logged, not recorded as an error.
    Skipped(String),
}

/// Failed task execution, as recorded in the completed log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub retryable: bool,
    /// Multi-line error text whose last line reads `Kind: message`.
    pub trace: String,
}

impl TaskFailure {
    pub fn retryable(trace: impl Into<String>) -> Self {
        Self {
            retryable: true,
            trace: trace.into(),
        }
    }

    pub fn fatal(trace: impl Into<String>) -> Self {
        Self {
            retryable: false,
            trace: trace.into(),
        }
    }
}

impl RetryableError for TaskFailure {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

pub type TaskResult = Result<TaskOutcome, TaskFailure>;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, task: &Task) -> TaskResult;
}

#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `kind`, replacing any previous binding.
    pub fn register(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Kinds with no handler bound.
    pub fn missing_kinds(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|kind| !self.handlers.contains_key(kind))
            .collect()
    }
}
