//! Boundary view types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lenswork_core::types::{Task, TaskError, TaskProgress, TaskStatus};

fn default_args() -> Value {
    Value::Object(serde_json::Map::new())
}

/// The single dispatcher input: `{operation, args}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRequest {
    pub operation: String,
    #[serde(default = "default_args")]
    pub args: Value,
}

/// Full task view for `tasks.get`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
    #[serde(rename = "type")]
    pub workflow: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<TaskProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            workflow: task.workflow.clone(),
            status: task.status,
            progress: task.progress.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Summary view for `tasks.list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub workflow: String,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            workflow: task.workflow.clone(),
            status: task.status,
            created_at: task.created_at,
        }
    }
}
