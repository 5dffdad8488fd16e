//! `lifecycle.harvest` - create one webset, drive it to idle, collect.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use lenswork_core::projection::{bundle_items, enrichment_definitions};
use lenswork_core::upstream::{CreateWebsetRequest, SearchSpec};
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError};

use crate::helpers::{
    cancel_webset_best_effort, collect_items, criteria_specs, enrichment_specs, entity_spec,
    item_cap, optional_bool, optional_u64, poll_config, poll_until_idle, require_str, steps_value,
    StepTracker, DEFAULT_ITEM_COUNT,
};

const TOTAL_STEPS: u32 = 4;

/// The simplest workflow: one search, one dataset, one harvest.
pub struct LifecycleHarvest;

#[async_trait]
impl Workflow for LifecycleHarvest {
    fn name(&self) -> &str {
        "lifecycle.harvest"
    }

    fn description(&self) -> &str {
        "Create a webset with search, criteria and enrichments; poll to idle; collect items"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let query = require_str(&args, "query")?;
        let entity = entity_spec(&args)?
            .ok_or_else(|| WorkflowError::validation("'entity' is required"))?;
        let criteria = criteria_specs(&args)?;
        let enrichments = enrichment_specs(&args)?;
        let count = optional_u64(&args, "count", DEFAULT_ITEM_COUNT);
        let cleanup = optional_bool(&args, "cleanup", false);
        let poll = poll_config(&args);

        tracker.begin("create");
        let request = CreateWebsetRequest {
            search: SearchSpec {
                query,
                count: Some(count),
                entity: Some(entity),
                criteria,
            },
            enrichments,
            external_id: None,
            metadata: None,
        };
        let webset = ctx
            .upstream
            .create_webset(request)
            .await
            .map_err(|e| WorkflowError::upstream("create", e))?;
        let webset_id = webset.id.clone();
        ctx.checkpoint(json!({ "websetId": webset_id })).await;
        if ctx.is_cancelled().await {
            cancel_webset_best_effort(&ctx, &webset_id).await;
            return Ok(Value::Null);
        }

        tracker.begin("poll");
        let outcome = poll_until_idle(&ctx, &webset_id, "poll", (2, TOTAL_STEPS), &poll).await?;
        if outcome.cancelled {
            return Ok(Value::Null);
        }

        tracker.begin("collect");
        let raw = collect_items(&ctx, &webset_id, item_cap(count), "collect").await?;
        let definitions = enrichment_definitions(&outcome.webset.enrichments);
        let mut bundle = bundle_items(&raw, &definitions);
        bundle.data.truncate(count as usize);
        let item_count = bundle.data.len();

        if cleanup {
            tracker.begin("cleanup");
            if let Err(err) = ctx.upstream.delete_webset(&webset_id).await {
                tracing::warn!(webset_id = %webset_id, error = %err, "webset cleanup failed");
            }
        }

        let search_progress = outcome
            .webset
            .last_search()
            .map(|s| s.progress)
            .unwrap_or_default();
        let steps = tracker.finish();
        let mut result = json!({
            "websetId": webset_id,
            "items": bundle.data,
            "itemCount": item_count,
            "searchProgress": search_progress,
            "enrichmentCount": outcome.webset.enrichments.len(),
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        });
        if outcome.timed_out {
            result["timedOut"] = json!(true);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{company_item, test_context, MockUpstream};
    use lenswork_core::TaskStore;
    use std::sync::Arc;

    #[test]
    fn test_missing_query_is_a_validation_failure() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new());
            let (ctx, _store) = test_context(upstream).await;
            let err = LifecycleHarvest
                .run(ctx, json!({ "entity": { "type": "company" } }))
                .await
                .unwrap_err();
            assert_eq!(err.step, "validate");
            assert!(!err.recoverable);
        });
    }

    #[test]
    fn test_harvest_collects_and_projects_items() {
        tokio_test::block_on(async {
            let upstream = Arc::new(
                MockUpstream::new().queue_items(vec![
                    company_item("item_1", "Acme Robotics", "https://acme.example"),
                    company_item("item_2", "Zenith Biotech", "https://zenith.example"),
                ]),
            );
            let (ctx, _store) = test_context(upstream.clone()).await;

            let result = LifecycleHarvest
                .run(
                    ctx,
                    json!({
                        "query": "robotics startups",
                        "entity": { "type": "company" },
                        "count": 5,
                        "pollIntervalMs": 5
                    }),
                )
                .await
                .unwrap();

            assert_eq!(result["websetId"], "ws_1");
            assert_eq!(result["itemCount"], 2);
            assert_eq!(result["items"][0]["name"], "Acme Robotics");
            assert!(result.get("timedOut").is_none());
            // raw item properties never cross the boundary
            assert!(result["items"][0].get("properties").is_none());
            let steps: Vec<String> = result["steps"]
                .as_array()
                .unwrap()
                .iter()
                .map(|s| s["name"].as_str().unwrap().to_string())
                .collect();
            assert_eq!(steps, vec!["validate", "create", "poll", "collect"]);
        });
    }

    #[test]
    fn test_timeout_returns_partial_result_not_failure() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new().stay_running());
            let (ctx, _store) = test_context(upstream).await;

            let result = LifecycleHarvest
                .run(
                    ctx,
                    json!({
                        "query": "AI infra startups",
                        "entity": { "type": "company" },
                        "count": 5,
                        "timeout": 100,
                        "pollIntervalMs": 10
                    }),
                )
                .await
                .unwrap();

            assert_eq!(result["timedOut"], json!(true));
            assert_eq!(result["items"], json!([]));
            assert_eq!(result["websetId"], "ws_1");
        });
    }

    #[test]
    fn test_cleanup_deletes_the_webset() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new().queue_items(vec![]));
            let (ctx, _store) = test_context(upstream.clone()).await;

            LifecycleHarvest
                .run(
                    ctx,
                    json!({
                        "query": "robotics",
                        "entity": { "type": "company" },
                        "cleanup": true,
                        "pollIntervalMs": 5
                    }),
                )
                .await
                .unwrap();

            assert_eq!(upstream.delete_calls(), vec!["ws_1".to_string()]);
        });
    }

    #[test]
    fn test_cancellation_after_create_cancels_the_webset_once() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new().stay_running());
            let (ctx, store) = test_context(upstream.clone()).await;
            // cancel before the workflow observes its first checkpoint
            store.cancel(&ctx.task_id).await.unwrap();

            let result = LifecycleHarvest
                .run(
                    ctx,
                    json!({ "query": "robotics", "entity": { "type": "company" } }),
                )
                .await
                .unwrap();

            assert_eq!(result, Value::Null);
            assert_eq!(upstream.cancel_calls(), vec!["ws_1".to_string()]);
        });
    }
}
