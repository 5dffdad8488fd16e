//! TaskRuntime - spawn-on-create workflow execution.
//!
//! Creating a task never blocks the caller: the workflow function runs
//! on a detached worker and the caller polls the task store. The
//! runtime converts returned values into completed tasks and raised
//! errors into failed ones; a task cancelled mid-run stays cancelled.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lenswork_core::store::{StoreError, TaskStore};
use lenswork_core::types::{Task, TaskError, TaskStatus};
use lenswork_core::upstream::UpstreamClient;
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowRegistry};

/// Runtime errors surfaced at task creation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown workflow type: {0}")]
    UnknownWorkflow(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Schedules workflow executions over the shared task store.
pub struct TaskRuntime {
    store: Arc<dyn TaskStore>,
    upstream: Arc<dyn UpstreamClient>,
    registry: Arc<WorkflowRegistry>,
}

impl TaskRuntime {
    /// Create a new runtime.
    pub fn new(
        store: Arc<dyn TaskStore>,
        upstream: Arc<dyn UpstreamClient>,
        registry: Arc<WorkflowRegistry>,
    ) -> Self {
        Self {
            store,
            upstream,
            registry,
        }
    }

    /// The shared task store.
    pub fn store(&self) -> Arc<dyn TaskStore> {
        self.store.clone()
    }

    /// Registered workflow type names.
    pub fn workflow_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Create a task and schedule its workflow on a background worker.
    ///
    /// The worker is never joined here; callers poll `tasks.get` /
    /// `tasks.result`.
    pub async fn start_workflow(&self, workflow: &str, args: Value) -> Result<Task, RuntimeError> {
        let implementation = self
            .registry
            .get(workflow)
            .ok_or_else(|| RuntimeError::UnknownWorkflow(workflow.to_string()))?;
        let task = self.store.create(workflow, args.clone()).await?;

        let store = self.store.clone();
        let upstream = self.upstream.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            execute(store, upstream, implementation, task_id, args).await;
        });
        Ok(task)
    }

    /// Spawn the background TTL sweeper.
    pub fn spawn_sweeper(&self, interval: Duration) -> Sweeper {
        let store = self.store.clone();
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match store.cleanup().await {
                            Ok(removed) if removed > 0 => {
                                tracing::info!(removed, "expired tasks swept");
                            }
                            Ok(_) => {}
                            Err(err) => tracing::warn!(error = %err, "task cleanup failed"),
                        }
                    }
                }
            }
        });
        Sweeper {
            token,
            handle: Some(handle),
        }
    }
}

async fn execute(
    store: Arc<dyn TaskStore>,
    upstream: Arc<dyn UpstreamClient>,
    workflow: Arc<dyn Workflow>,
    task_id: String,
    args: Value,
) {
    // a task cancelled before its worker starts never transitions to working
    if let Err(err) = store.update_status(&task_id, TaskStatus::Working).await {
        tracing::debug!(task_id = %task_id, error = %err, "task did not start");
        return;
    }
    tracing::info!(task_id = %task_id, workflow = workflow.name(), "workflow started");

    let ctx = WorkflowContext::new(task_id.clone(), store.clone(), upstream);
    match workflow.run(ctx.clone(), args).await {
        Ok(result) => {
            if ctx.is_cancelled().await {
                tracing::info!(task_id = %task_id, "workflow wound down after cancellation");
                return;
            }
            if let Err(err) = store.set_result(&task_id, result).await {
                tracing::warn!(task_id = %task_id, error = %err, "result write failed");
                return;
            }
            if let Err(err) = store.update_status(&task_id, TaskStatus::Completed).await {
                tracing::warn!(task_id = %task_id, error = %err, "completion failed");
                return;
            }
            tracing::info!(task_id = %task_id, workflow = workflow.name(), "workflow completed");
        }
        Err(err) => {
            if ctx.is_cancelled().await {
                tracing::info!(task_id = %task_id, "workflow failed after cancellation");
                return;
            }
            tracing::error!(
                task_id = %task_id,
                workflow = workflow.name(),
                step = %err.step,
                error = %err.message,
                "workflow failed"
            );
            let record = TaskError {
                step: err.step,
                message: err.message,
                recoverable: err.recoverable,
            };
            if let Err(err) = store.set_error(&task_id, record).await {
                tracing::warn!(task_id = %task_id, error = %err, "error write failed");
                return;
            }
            if let Err(err) = store.update_status(&task_id, TaskStatus::Failed).await {
                tracing::warn!(task_id = %task_id, error = %err, "failure transition failed");
            }
        }
    }
}

/// Handle for the background cleanup task; disposable cleanly.
pub struct Sweeper {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
