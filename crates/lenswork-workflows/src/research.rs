//! `research.deep` and `research.verifiedCollection`.
//!
//! The first is a thin wrapper over the upstream deep-research API; the
//! second fans per-item research over a harvested collection with
//! bounded parallelism, isolating per-item failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use lenswork_core::projection::{bundle_items, enrichment_definitions, ProjectedItem};
use lenswork_core::types::ResearchStatus;
use lenswork_core::upstream::{CreateWebsetRequest, ResearchRequest, SearchSpec};
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError};

use crate::cron::template::substitute;
use crate::helpers::{
    cancel_webset_best_effort, collect_items, criteria_specs, enrichment_specs, entity_spec,
    item_cap, optional_str, optional_u64, poll_config, poll_research, poll_until_idle,
    require_str, steps_value, PollConfig, StepTracker, DEFAULT_ITEM_COUNT,
};

const RESEARCH_CONCURRENCY: usize = 3;
const DEFAULT_RESEARCH_LIMIT: u64 = 5;
const DEFAULT_ITEM_PROMPT: &str = "Research {{name}} ({{url}}): verify key facts and summarize \
recent developments. Context: {{description}}";

/// One upstream deep-research job, polled to completion.
pub struct ResearchDeep;

#[async_trait]
impl Workflow for ResearchDeep {
    fn name(&self) -> &str {
        "research.deep"
    }

    fn description(&self) -> &str {
        "Dispatch an upstream deep-research job and poll it to completion"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let instructions = require_str(&args, "instructions")?;
        let model = optional_str(&args, "model");
        let output_schema = args.get("outputSchema").cloned();
        let poll = poll_config(&args);

        tracker.begin("dispatch");
        if ctx.is_cancelled().await {
            return Ok(Value::Null);
        }
        let job = ctx
            .upstream
            .create_research(ResearchRequest {
                instructions,
                model,
                output_schema,
            })
            .await
            .map_err(|e| WorkflowError::upstream("dispatch", e))?;
        ctx.checkpoint(json!({ "researchId": job.id })).await;

        tracker.begin("poll");
        let (job, timed_out) = poll_research(&ctx, &job.id, "poll", &poll).await?;
        if ctx.is_cancelled().await {
            return Ok(Value::Null);
        }

        let steps = tracker.finish();
        let mut result = json!({
            "researchId": job.id,
            "status": job.status,
            "result": job.result_value(),
            "model": job.model,
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        });
        if timed_out {
            result["timedOut"] = json!(true);
        }
        Ok(result)
    }
}

/// Harvest a collection, then research each of its leading items.
pub struct VerifiedCollection;

fn item_prompt(template: &str, item: &ProjectedItem) -> String {
    let vars: HashMap<String, String> = HashMap::from([
        ("name".to_string(), item.name.clone()),
        ("url".to_string(), item.url.clone().unwrap_or_default()),
        (
            "description".to_string(),
            item.description.clone().unwrap_or_default(),
        ),
    ]);
    substitute(template, &vars)
}

async fn research_one(
    ctx: WorkflowContext,
    semaphore: Arc<Semaphore>,
    index: usize,
    instructions: String,
    poll: PollConfig,
) -> (usize, Result<Value, String>) {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return (index, Err("research pool closed".to_string())),
    };
    if ctx.is_cancelled().await {
        return (index, Err("cancelled".to_string()));
    }
    let job = match ctx
        .upstream
        .create_research(ResearchRequest {
            instructions,
            model: None,
            output_schema: None,
        })
        .await
    {
        Ok(job) => job,
        Err(err) => return (index, Err(err.to_string())),
    };
    match poll_research(&ctx, &job.id, "research", &poll).await {
        Ok((job, true)) => (index, Err(format!("research {} timed out", job.id))),
        Ok((job, false)) => match job.status {
            ResearchStatus::Completed => {
                (index, Ok(job.result_value().unwrap_or(Value::Null)))
            }
            status => (
                index,
                Err(format!("research {} ended as {:?}", job.id, status)),
            ),
        },
        Err(err) => (index, Err(err.message)),
    }
}

#[async_trait]
impl Workflow for VerifiedCollection {
    fn name(&self) -> &str {
        "research.verifiedCollection"
    }

    fn description(&self) -> &str {
        "Collect a webset, then run bounded per-item research over its leading items"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let query = require_str(&args, "query")?;
        let entity = entity_spec(&args)?;
        let criteria = criteria_specs(&args)?;
        let enrichments = enrichment_specs(&args)?;
        let count = optional_u64(&args, "count", DEFAULT_ITEM_COUNT);
        let research_limit = optional_u64(&args, "researchLimit", DEFAULT_RESEARCH_LIMIT) as usize;
        let prompt_template =
            optional_str(&args, "researchPrompt").unwrap_or_else(|| DEFAULT_ITEM_PROMPT.to_string());
        let poll = poll_config(&args);

        tracker.begin("create");
        let webset = ctx
            .upstream
            .create_webset(CreateWebsetRequest {
                search: SearchSpec {
                    query,
                    count: Some(count),
                    entity,
                    criteria,
                },
                enrichments,
                external_id: None,
                metadata: None,
            })
            .await
            .map_err(|e| WorkflowError::upstream("create", e))?;
        let webset_id = webset.id.clone();
        ctx.checkpoint(json!({ "websetId": webset_id })).await;
        if ctx.is_cancelled().await {
            cancel_webset_best_effort(&ctx, &webset_id).await;
            return Ok(Value::Null);
        }

        tracker.begin("poll");
        let outcome = poll_until_idle(&ctx, &webset_id, "poll", (2, 5), &poll).await?;
        if outcome.cancelled {
            return Ok(Value::Null);
        }

        tracker.begin("collect");
        let raw = collect_items(&ctx, &webset_id, item_cap(count), "collect").await?;
        let definitions = enrichment_definitions(&outcome.webset.enrichments);
        let mut bundle = bundle_items(&raw, &definitions);
        bundle.data.truncate(count as usize);

        tracker.begin("research");
        let targets = bundle.data.len().min(research_limit);
        let semaphore = Arc::new(Semaphore::new(RESEARCH_CONCURRENCY));
        let mut in_flight = FuturesUnordered::new();
        for (index, item) in bundle.data.iter().take(targets).enumerate() {
            in_flight.push(research_one(
                ctx.clone(),
                semaphore.clone(),
                index,
                item_prompt(&prompt_template, item),
                poll,
            ));
        }
        let mut research_results: Vec<Option<Result<Value, String>>> = vec![None; targets];
        while let Some((index, result)) = in_flight.next().await {
            research_results[index] = Some(result);
        }
        if ctx.is_cancelled().await {
            cancel_webset_best_effort(&ctx, &webset_id).await;
            return Ok(Value::Null);
        }

        let mut researched = 0usize;
        let items: Vec<Value> = bundle
            .data
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let mut entry = serde_json::to_value(item).unwrap_or(Value::Null);
                if let Some(result) = research_results.get(index).and_then(|r| r.as_ref()) {
                    match result {
                        Ok(value) => {
                            researched += 1;
                            entry["research"] = value.clone();
                        }
                        Err(message) => {
                            entry["researchError"] = json!(message);
                        }
                    }
                }
                entry
            })
            .collect();

        let item_count = items.len();
        let steps = tracker.finish();
        let mut result = json!({
            "websetId": webset_id,
            "items": items,
            "itemCount": item_count,
            "researchedCount": researched,
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        });
        if outcome.timed_out {
            result["timedOut"] = json!(true);
        }
        Ok(result)
    }
}
