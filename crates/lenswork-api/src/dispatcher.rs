//! Operation dispatcher.
//!
//! All functionality is surfaced through one entry accepting
//! `{operation, args}`. Task operations go through the runtime and
//! store; upstream pass-throughs apply the projection policy (bulk
//! items are always enveloped and projected, single-item gets return
//! the raw form).

use std::sync::Arc;

use serde_json::{json, Value};

use lenswork_core::projection::{bundle_items, enrichment_definitions};
use lenswork_core::store::TaskStore;
use lenswork_core::types::{TaskStatus, WebsetItem};
use lenswork_core::upstream::{
    CreateWebsetRequest, EnrichmentSpec, MonitorCadence, MonitorSpec, ResearchRequest,
    UpstreamClient,
};
use lenswork_runtime::TaskRuntime;

use crate::dto::{OperationRequest, TaskSummary, TaskView};
use crate::error::ApiError;

const DEFAULT_LIST_LIMIT: usize = 25;
const MAX_PAGE_SIZE: usize = 100;

/// The single operation entry point.
pub struct Dispatcher {
    runtime: Arc<TaskRuntime>,
    store: Arc<dyn TaskStore>,
    upstream: Arc<dyn UpstreamClient>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(
        runtime: Arc<TaskRuntime>,
        store: Arc<dyn TaskStore>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            runtime,
            store,
            upstream,
        }
    }

    /// Route one operation to its handler.
    pub async fn dispatch(&self, request: OperationRequest) -> Result<Value, ApiError> {
        let args = request.args;
        tracing::debug!(operation = %request.operation, "dispatching operation");
        match request.operation.as_str() {
            "tasks.create" => self.tasks_create(args).await,
            "tasks.get" => self.tasks_get(&args).await,
            "tasks.result" => self.tasks_result(&args).await,
            "tasks.list" => self.tasks_list(&args).await,
            "tasks.cancel" => self.tasks_cancel(&args).await,
            "websets.create" => self.websets_create(args).await,
            "websets.get" => self.websets_get(&args).await,
            "websets.cancel" => self.websets_cancel(&args).await,
            "websets.delete" => self.websets_delete(&args).await,
            "items.list" => self.items_list(&args).await,
            "items.get" => self.items_get(&args).await,
            "enrichments.create" => self.enrichments_create(&args).await,
            "enrichments.delete" => self.enrichments_delete(&args).await,
            "monitors.create" => self.monitors_create(&args).await,
            "research.create" => self.research_create(args).await,
            "research.get" => self.research_get(&args).await,
            "events.list" => self.events_list(&args).await,
            operation => Err(ApiError::UnknownOperation(operation.to_string())),
        }
    }

    async fn tasks_create(&self, mut args: Value) -> Result<Value, ApiError> {
        let workflow = args
            .get("type")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidArgument("'type' is required".to_string()))?;
        if let Some(object) = args.as_object_mut() {
            object.remove("type");
        }
        let task = self.runtime.start_workflow(&workflow, args).await?;
        Ok(json!({ "taskId": task.id, "status": task.status }))
    }

    async fn tasks_get(&self, args: &Value) -> Result<Value, ApiError> {
        let task_id = require_str(args, "taskId")?;
        let task = self
            .store
            .get(&task_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))?;
        to_value(TaskView::from(&task))
    }

    /// Never blocks: a non-terminal task returns its status.
    async fn tasks_result(&self, args: &Value) -> Result<Value, ApiError> {
        let task_id = require_str(args, "taskId")?;
        let task = self
            .store
            .get(&task_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))?;
        match task.status {
            TaskStatus::Completed => Ok(task.result.unwrap_or(Value::Null)),
            TaskStatus::Failed => {
                let mut response = json!({ "status": task.status, "error": task.error });
                if let Some(partial) = task.partial_result {
                    response["partialResult"] = partial;
                }
                Ok(response)
            }
            TaskStatus::Cancelled => Ok(json!({ "status": task.status })),
            status => {
                let mut response = json!({
                    "status": status,
                    "message": format!("task is {}", status.as_str()),
                });
                if let Some(progress) = task.progress {
                    response["progress"] = to_value(progress)?;
                }
                Ok(response)
            }
        }
    }

    async fn tasks_list(&self, args: &Value) -> Result<Value, ApiError> {
        let status = match args.get("status") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<TaskStatus>(value.clone()).map_err(|_| {
                    ApiError::InvalidArgument(format!("invalid status filter: {}", value))
                })?,
            ),
        };
        let tasks = self.store.list(status).await?;
        let summaries: Vec<TaskSummary> = tasks.iter().map(TaskSummary::from).collect();
        to_value(summaries)
    }

    async fn tasks_cancel(&self, args: &Value) -> Result<Value, ApiError> {
        let task_id = require_str(args, "taskId")?;
        let cancelled = self.store.cancel(&task_id).await?;
        Ok(json!({ "cancelled": cancelled }))
    }

    async fn websets_create(&self, args: Value) -> Result<Value, ApiError> {
        let request: CreateWebsetRequest = serde_json::from_value(args)
            .map_err(|e| ApiError::InvalidArgument(format!("invalid webset request: {}", e)))?;
        let webset = self.upstream.create_webset(request).await?;
        to_value(webset)
    }

    async fn websets_get(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "id")?;
        let webset = self.upstream.get_webset(&webset_id).await?;
        to_value(webset)
    }

    async fn websets_cancel(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "id")?;
        let webset = self.upstream.cancel_webset(&webset_id).await?;
        to_value(webset)
    }

    async fn websets_delete(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "id")?;
        self.upstream.delete_webset(&webset_id).await?;
        Ok(json!({ "deleted": true, "id": webset_id }))
    }

    /// Bulk listing: mandatory `{data, total, included, excluded}` envelope.
    async fn items_list(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "websetId")?;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIST_LIMIT);

        let webset = self.upstream.get_webset(&webset_id).await?;
        let definitions = enrichment_definitions(&webset.enrichments);

        let mut items: Vec<WebsetItem> = Vec::new();
        let mut cursor: Option<String> = None;
        while items.len() < limit {
            let page_size = (limit - items.len()).clamp(1, MAX_PAGE_SIZE);
            let page = self
                .upstream
                .list_items(&webset_id, cursor.as_deref(), page_size)
                .await?;
            if page.items.is_empty() {
                break;
            }
            items.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        items.truncate(limit);
        to_value(bundle_items(&items, &definitions))
    }

    /// Single-item get returns the raw form.
    async fn items_get(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "websetId")?;
        let item_id = require_str(args, "id")?;
        let item = self.upstream.get_item(&webset_id, &item_id).await?;
        to_value(item)
    }

    async fn enrichments_create(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "websetId")?;
        let spec = EnrichmentSpec {
            description: require_str(args, "description")?,
            format: serde_json::from_value(
                args.get("format").cloned().unwrap_or(Value::Null),
            )
            .map_err(|_| {
                ApiError::InvalidArgument(
                    "'format' must be one of text|number|options|date|email|phone|url".to_string(),
                )
            })?,
            options: args.get("options").and_then(|v| {
                v.as_array().map(|list| {
                    list.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
            }),
        };
        let enrichment = self.upstream.create_enrichment(&webset_id, spec).await?;
        to_value(enrichment)
    }

    async fn enrichments_delete(&self, args: &Value) -> Result<Value, ApiError> {
        let webset_id = require_str(args, "websetId")?;
        let enrichment_id = require_str(args, "enrichmentId")?;
        self.upstream
            .delete_enrichment(&webset_id, &enrichment_id)
            .await?;
        Ok(json!({ "deleted": true, "id": enrichment_id }))
    }

    async fn monitors_create(&self, args: &Value) -> Result<Value, ApiError> {
        let spec = MonitorSpec {
            webset_id: require_str(args, "websetId")?,
            cadence: MonitorCadence {
                cron: require_str(args, "cron")?,
                timezone: args
                    .get("timezone")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
        };
        if spec.cadence.cron.split_whitespace().count() != 5 {
            return Err(ApiError::InvalidArgument(format!(
                "cron '{}' must have 5 fields",
                spec.cadence.cron
            )));
        }
        let monitor = self.upstream.create_monitor(spec).await?;
        to_value(monitor)
    }

    async fn research_create(&self, args: Value) -> Result<Value, ApiError> {
        let request: ResearchRequest = serde_json::from_value(args)
            .map_err(|e| ApiError::InvalidArgument(format!("invalid research request: {}", e)))?;
        let job = self.upstream.create_research(request).await?;
        to_value(job)
    }

    async fn research_get(&self, args: &Value) -> Result<Value, ApiError> {
        let research_id = require_str(args, "id")?;
        let job = self.upstream.get_research(&research_id).await?;
        to_value(job)
    }

    async fn events_list(&self, args: &Value) -> Result<Value, ApiError> {
        let cursor = args.get("cursor").and_then(|v| v.as_str());
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIST_LIMIT);
        let page = self.upstream.list_events(cursor, limit).await?;
        to_value(page)
    }
}

fn require_str(args: &Value, key: &str) -> Result<String, ApiError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidArgument(format!("'{}' is required", key)))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}
