//! Workflow abstraction module
//!
//! This module defines the Workflow trait and related types:
//! - Workflow: a named, long-running composition of upstream calls
//! - WorkflowContext: store/upstream access plus cancellation checks
//! - WorkflowError: step-scoped failure record
//! - WorkflowRegistry: immutable name-to-implementation table

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::store::TaskStore;
use crate::types::{TaskId, TaskProgress, TaskStatus};
use crate::upstream::{UpstreamClient, UpstreamError};

/// Step-scoped workflow failure.
///
/// The runtime converts this into the failed task's error record.
#[derive(Debug, Clone, Error)]
#[error("workflow step '{step}' failed: {message}")]
pub struct WorkflowError {
    /// Name of the step that raised
    pub step: String,
    /// Error message
    pub message: String,
    /// Whether the caller could plausibly recover by retrying
    pub recoverable: bool,
}

impl WorkflowError {
    /// Create a non-recoverable step failure.
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            recoverable: false,
        }
    }

    /// Create an argument/schema validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::step("validate", message)
    }

    /// Wrap an upstream error, inheriting its transience.
    pub fn upstream(step: impl Into<String>, error: UpstreamError) -> Self {
        Self {
            step: step.into(),
            recoverable: error.is_transient(),
            message: error.to_string(),
        }
    }
}

/// Execution context handed to a workflow function.
///
/// Provides access to the task store (progress, checkpoints, the
/// cancellation bit) and the upstream client.
#[derive(Clone)]
pub struct WorkflowContext {
    /// Task being executed
    pub task_id: TaskId,
    /// Task store - the single source of truth for status and results
    pub store: Arc<dyn TaskStore>,
    /// Upstream client
    pub upstream: Arc<dyn UpstreamClient>,
}

impl WorkflowContext {
    /// Create a new workflow context.
    pub fn new(
        task_id: impl Into<TaskId>,
        store: Arc<dyn TaskStore>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            store,
            upstream,
        }
    }

    /// Check whether cancellation has been requested.
    ///
    /// A deleted task counts as cancelled so orphaned workers wind down.
    pub async fn is_cancelled(&self) -> bool {
        match self.store.get(&self.task_id).await {
            Ok(Some(task)) => task.status == TaskStatus::Cancelled,
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(task_id = %self.task_id, error = %err, "cancellation check failed");
                false
            }
        }
    }

    /// Record a progress hint; failures are logged and swallowed.
    pub async fn progress(&self, progress: TaskProgress) {
        if let Err(err) = self.store.update_progress(&self.task_id, progress).await {
            tracing::debug!(task_id = %self.task_id, error = %err, "progress update dropped");
        }
    }

    /// Write a checkpoint visible before completion.
    pub async fn checkpoint(&self, partial: Value) {
        if let Err(err) = self.store.set_partial_result(&self.task_id, partial).await {
            tracing::debug!(task_id = %self.task_id, error = %err, "checkpoint dropped");
        }
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("task_id", &self.task_id)
            .finish()
    }
}

/// Workflow trait - a named composition of upstream primitives.
///
/// Implementations must check cancellation at every safe point: after
/// create, after each poll, between parallel branches, before each
/// research call. A cancelled workflow returns `Value::Null`; the
/// runtime leaves the task in its cancelled state.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Get the workflow type name (must be unique)
    fn name(&self) -> &str;

    /// Get the workflow description
    fn description(&self) -> &str;

    /// Execute the workflow to completion.
    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError>;
}

/// Workflow registry for looking up implementations by type name.
///
/// Populated once at startup and immutable afterwards.
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
        }
    }

    /// Register a workflow
    pub fn register(&mut self, workflow: Arc<dyn Workflow>) {
        self.workflows
            .insert(workflow.name().to_string(), workflow);
    }

    /// Get a workflow by type name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.workflows.get(name).cloned()
    }

    /// Get all registered type names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedWorkflow(&'static str);

    #[async_trait]
    impl Workflow for NamedWorkflow {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test workflow"
        }

        async fn run(&self, _ctx: WorkflowContext, _args: Value) -> Result<Value, WorkflowError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_registry_lookup_and_names() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Arc::new(NamedWorkflow("lifecycle.harvest")));
        registry.register(Arc::new(NamedWorkflow("semantic.cron")));

        assert!(registry.get("lifecycle.harvest").is_some());
        assert!(registry.get("unknown.workflow").is_none());
        assert_eq!(
            registry.names(),
            vec!["lifecycle.harvest".to_string(), "semantic.cron".to_string()]
        );
    }

    #[test]
    fn test_validation_error_shape() {
        let err = WorkflowError::validation("query is required");
        assert_eq!(err.step, "validate");
        assert!(!err.recoverable);
    }

    #[test]
    fn test_upstream_error_transience_propagates() {
        let err = WorkflowError::upstream(
            "create",
            UpstreamError::Server {
                status: 502,
                message: "bad gateway".to_string(),
            },
        );
        assert!(err.recoverable);

        let err = WorkflowError::upstream(
            "create",
            UpstreamError::Request {
                status: 422,
                message: "bad entity".to_string(),
            },
        );
        assert!(!err.recoverable);
    }
}
