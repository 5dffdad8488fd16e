//! TaskStore in-memory implementation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use lenswork_core::store::{StoreError, TaskStore};
use lenswork_core::types::{Task, TaskError, TaskProgress, TaskStatus};

const DEFAULT_MAX_ACTIVE_TASKS: usize = 20;
const DEFAULT_TTL_SECS: i64 = 3_600;

/// Configuration for the in-memory task store.
#[derive(Debug, Clone)]
pub struct InMemoryTaskStoreConfig {
    /// Soft cap on concurrent non-terminal tasks
    pub max_active: usize,
    /// Time a terminal task remains queryable before cleanup
    pub ttl: Duration,
}

impl Default for InMemoryTaskStoreConfig {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE_TASKS,
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }
}

/// In-memory task store.
///
/// Tasks live for one process lifetime. Unlike a cache, reaching the
/// capacity limit rejects creation instead of evicting: live tasks are
/// jobs, not entries.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    config: InMemoryTaskStoreConfig,
}

impl InMemoryTaskStore {
    /// Create a store with default capacity and TTL.
    pub fn new() -> Self {
        Self::with_config(InMemoryTaskStoreConfig::default())
    }

    /// Create a store with explicit configuration.
    pub fn with_config(config: InMemoryTaskStoreConfig) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            config: InMemoryTaskStoreConfig {
                max_active: config.max_active.max(1),
                ttl: config.ttl,
            },
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Task>>, StoreError> {
        self.tasks
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Task>>, StoreError> {
        self.tasks
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn with_live_task<T>(
        &self,
        task_id: &str,
        apply: impl FnOnce(&mut Task) -> T,
    ) -> Result<T, StoreError> {
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if task.is_terminal() {
            return Err(StoreError::TerminalState(task_id.to_string()));
        }
        let out = apply(task);
        task.touch();
        Ok(out)
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, workflow: &str, args: Value) -> Result<Task, StoreError> {
        let mut tasks = self.write()?;
        let active = tasks.values().filter(|t| !t.is_terminal()).count();
        if active >= self.config.max_active {
            return Err(StoreError::CapacityExceeded(self.config.max_active));
        }
        let task = Task::new(workflow, args, self.config.ttl);
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.read()?.get(task_id).cloned())
    }

    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, StoreError> {
        let tasks = self.read()?;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        let from = task.status;
        if !task.try_transition(status) {
            return Err(StoreError::InvalidTransition {
                task: task_id.to_string(),
                from,
                to: status,
            });
        }
        if status.is_terminal() {
            task.expires_at = Utc::now() + self.config.ttl;
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        task_id: &str,
        progress: TaskProgress,
    ) -> Result<(), StoreError> {
        // Progress is a hint; a terminal task silently ignores late updates.
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if !task.is_terminal() {
            task.progress = Some(progress);
            task.touch();
        }
        Ok(())
    }

    async fn set_result(&self, task_id: &str, result: Value) -> Result<(), StoreError> {
        self.with_live_task(task_id, |task| {
            task.result = Some(result);
        })
    }

    async fn set_partial_result(&self, task_id: &str, partial: Value) -> Result<(), StoreError> {
        self.with_live_task(task_id, |task| {
            task.partial_result = Some(partial);
        })
    }

    async fn set_error(&self, task_id: &str, error: TaskError) -> Result<(), StoreError> {
        self.with_live_task(task_id, |task| {
            task.error = Some(error);
        })
    }

    async fn cancel(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.write()?;
        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(false);
        };
        if task.is_terminal() {
            return Ok(false);
        }
        task.try_transition(TaskStatus::Cancelled);
        task.expires_at = Utc::now() + self.config.ttl;
        Ok(true)
    }

    async fn delete(&self, task_id: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(task_id).is_some())
    }

    async fn cleanup(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut tasks = self.write()?;
        let before = tasks.len();
        tasks.retain(|_, task| !task.is_expired(now));
        let removed = before - tasks.len();
        if removed > 0 {
            tracing::debug!(removed, "task store cleanup");
        }
        Ok(removed)
    }
}
