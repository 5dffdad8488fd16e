//! Store module
//!
//! Defines the TaskStore abstraction. The store is the single source of
//! truth for task status, progress and results, and the synchronization
//! point for cooperative cancellation.
//!
//! Note: Implementations are in the lenswork-stores crate.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::{Task, TaskError, TaskProgress, TaskStatus};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task {0} is already in a terminal state")]
    TerminalState(String),

    #[error("illegal status transition for task {task}: {from:?} -> {to:?}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("concurrent task limit reached ({0})")]
    CapacityExceeded(usize),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// Task persistence and lifecycle bookkeeping.
///
/// All operations are safe under concurrent calls; a single task's
/// lifecycle is linearizable. Progress updates are hints, not
/// synchronization points.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a new pending task. Fails with `CapacityExceeded` when the
    /// number of non-terminal tasks has reached the configured cap.
    async fn create(&self, workflow: &str, args: Value) -> Result<Task, StoreError>;

    /// Load a task by id.
    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// List tasks, optionally filtered by status.
    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, StoreError>;

    /// Transition a task to a new status, validating the path.
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// Record a progress hint. Ignored for terminal tasks.
    async fn update_progress(&self, task_id: &str, progress: TaskProgress)
        -> Result<(), StoreError>;

    /// Attach the final result. Rejected once the task is terminal.
    async fn set_result(&self, task_id: &str, result: Value) -> Result<(), StoreError>;

    /// Write a checkpoint visible before completion.
    async fn set_partial_result(&self, task_id: &str, partial: Value) -> Result<(), StoreError>;

    /// Attach the error record. Rejected once the task is terminal.
    async fn set_error(&self, task_id: &str, error: TaskError) -> Result<(), StoreError>;

    /// Request cancellation. Returns false for terminal or missing tasks.
    async fn cancel(&self, task_id: &str) -> Result<bool, StoreError>;

    /// Remove a task record, live or not.
    async fn delete(&self, task_id: &str) -> Result<bool, StoreError>;

    /// Remove expired terminal tasks; returns the number removed.
    async fn cleanup(&self) -> Result<usize, StoreError>;
}
