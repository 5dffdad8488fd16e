//! Task type definitions
//!
//! A Task represents one in-flight or completed execution of a named
//! workflow, tracked by the task store for the lifetime of the process.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type alias for Task ID
pub type TaskId = String;

/// Generate a new task id with the `task_` prefix.
pub fn new_task_id() -> TaskId {
    format!("task_{}", uuid::Uuid::new_v4())
}

/// Task lifecycle states.
///
/// Legal paths are `pending → working → {completed | failed | cancelled}`,
/// plus direct cancellation of a task that never started working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, worker not yet started
    Pending,
    /// Workflow function is running
    Working,
    /// Workflow returned a result
    Completed,
    /// Workflow raised an error
    Failed,
    /// Cancellation was requested and observed
    Cancelled,
}

impl TaskStatus {
    /// Check whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(
                next,
                TaskStatus::Working | TaskStatus::Cancelled | TaskStatus::Failed
            ),
            TaskStatus::Working => matches!(
                next,
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
            ),
            _ => false,
        }
    }

    /// Lowercase label as exposed at the operation boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Working => "working",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Progress hint reported by a running workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    /// Label of the step currently executing
    pub step: String,
    /// Number of completed steps
    pub completed_steps: u32,
    /// Total number of steps the workflow expects to run
    pub total_steps: u32,
    /// Optional human-readable detail (e.g. poll counters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskProgress {
    /// Create a new progress record.
    pub fn new(step: impl Into<String>, completed_steps: u32, total_steps: u32) -> Self {
        Self {
            step: step.into(),
            completed_steps,
            total_steps,
            message: None,
        }
    }

    /// Attach a detail message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Error record stored on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    /// Name of the step that raised
    pub step: String,
    /// Error message
    pub message: String,
    /// Whether the caller could plausibly recover by retrying
    pub recoverable: bool,
}

/// Task - one execution of a named workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, `task_` prefixed
    pub id: TaskId,
    /// Workflow type name
    pub workflow: String,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// Latest progress hint
    #[serde(default)]
    pub progress: Option<TaskProgress>,
    /// Input arguments as passed by the caller
    pub args: Value,
    /// Final result, set exactly once before completion
    #[serde(default)]
    pub result: Option<Value>,
    /// Checkpoint written before completion (e.g. created webset ids)
    #[serde(default)]
    pub partial_result: Option<Value>,
    /// Error record, set exactly once before failure
    #[serde(default)]
    pub error: Option<TaskError>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// Expiry timestamp used by the TTL sweeper
    pub expires_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(workflow: impl Into<String>, args: Value, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: new_task_id(),
            workflow: workflow.into(),
            status: TaskStatus::Pending,
            progress: None,
            args,
            result: None,
            partial_result: None,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    /// Attempt a status transition; returns false when illegal.
    pub fn try_transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.touch();
        true
    }

    /// Refresh the updated-at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Check whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check whether the TTL has elapsed for a terminal task.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_terminal() && self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_id_prefix() {
        let task = Task::new("lifecycle.harvest", json!({}), Duration::hours(1));
        assert!(task.id.starts_with("task_"));
    }

    #[test]
    fn test_status_transition_paths() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Working));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::Working.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Working.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Working.can_transition_to(TaskStatus::Cancelled));

        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Working));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Working));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Working));
        assert!(!TaskStatus::Working.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_try_transition_rejects_backwards() {
        let mut task = Task::new("research.deep", json!({}), Duration::hours(1));
        assert!(task.try_transition(TaskStatus::Working));
        assert!(task.try_transition(TaskStatus::Completed));
        assert!(!task.try_transition(TaskStatus::Working));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_expiry_respects_ttl() {
        let task = Task::new("qd.winnow", json!({}), Duration::hours(1));
        assert!(task.expires_at >= task.created_at + Duration::hours(1));
        // non-terminal tasks never expire
        assert!(!task.is_expired(Utc::now() + Duration::hours(2)));
    }
}
