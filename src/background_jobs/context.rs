use crate::catalog::CatalogStore;
use crate::task_queue::TaskStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub catalog: Arc<dyn CatalogStore>,

    pub tasks: Arc<dyn TaskStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        catalog: Arc<dyn CatalogStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            cancellation_token,
            catalog,
            tasks,
        }
    }

    /// Same resources, different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            catalog: Arc::clone(&self.catalog),
            tasks: Arc::clone(&self.tasks),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
