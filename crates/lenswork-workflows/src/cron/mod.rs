//! `semantic.cron` - N lenses, one composite signal.
//!
//! A declarative pipeline: expand templates, validate the config, bind
//! or create one webset per lens, poll the created ones to idleness,
//! evaluate shapes per item, join evidence across lenses, evaluate the
//! signal rule, and emit a self-contained snapshot (plus a delta when
//! the caller supplies the previous one).

pub mod config;
pub mod delta;
pub mod join;
pub mod shape;
pub mod signal;
pub mod template;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::{json, Value};

use lenswork_core::types::Webset;
use lenswork_core::upstream::{
    CreateWebsetRequest, CriterionSpec, EnrichmentSpec, MonitorCadence, MonitorSpec, SearchSpec,
};
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError};

use crate::helpers::{
    cancel_webset_best_effort, collect_items, item_cap, optional_u64, poll_config,
    poll_until_idle, steps_value, StepTracker,
};

use config::{ConditionOp, CronConfig, LensConfig, ShapeConfig};
use delta::{compute_delta, JoinSnapshot, LensSnapshot, Snapshot};
use join::{join_lenses, LensEvaluation, ShapedItem};
use shape::{resolve_enrichments, ShapeEvaluator};
use signal::evaluate_signal;

const TOTAL_STEPS: u32 = 6;
const DEFAULT_LENS_COUNT: u64 = 25;

/// Compose N independent datasets into one boolean signal.
pub struct SemanticCron;

struct LensBinding {
    lens: LensConfig,
    webset_id: String,
    created: bool,
    webset: Webset,
}

/// Infer an enrichment format from the operators applied to it.
fn infer_format(op: ConditionOp) -> lenswork_core::types::EnrichmentFormat {
    use lenswork_core::types::EnrichmentFormat;
    match op {
        ConditionOp::Gte
        | ConditionOp::Gt
        | ConditionOp::Lte
        | ConditionOp::Lt
        | ConditionOp::Eq => EnrichmentFormat::Number,
        ConditionOp::WithinDays => EnrichmentFormat::Date,
        ConditionOp::OneOf => EnrichmentFormat::Options,
        ConditionOp::Exists | ConditionOp::Contains | ConditionOp::Matches => {
            EnrichmentFormat::Text
        }
    }
}

/// Enrichment definitions a lens needs for its shapes, derived from the
/// conditions when the lens does not declare them explicitly.
fn derived_enrichments(lens_id: &str, shapes: &[ShapeConfig]) -> Vec<EnrichmentSpec> {
    let mut specs: Vec<EnrichmentSpec> = Vec::new();
    for shape in shapes.iter().filter(|s| s.lens_id == lens_id) {
        for condition in &shape.conditions {
            if specs.iter().any(|s| s.description == condition.enrichment) {
                continue;
            }
            specs.push(EnrichmentSpec {
                description: condition.enrichment.clone(),
                format: infer_format(condition.op),
                options: condition
                    .value
                    .as_ref()
                    .and_then(|v| v.as_array())
                    .map(|list| {
                        list.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    }),
            });
        }
    }
    specs
}

fn string_map(args: &Value, key: &str) -> Result<HashMap<String, String>, WorkflowError> {
    let Some(value) = args.get(key) else {
        return Ok(HashMap::new());
    };
    let object = value
        .as_object()
        .ok_or_else(|| WorkflowError::validation(format!("'{}' must be an object", key)))?;
    let mut map = HashMap::new();
    for (k, v) in object {
        let rendered = match v {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(WorkflowError::validation(format!(
                    "'{}.{}' must be a scalar, got {}",
                    key, k, other
                )))
            }
        };
        map.insert(k.clone(), rendered);
    }
    Ok(map)
}

#[async_trait]
impl Workflow for SemanticCron {
    fn name(&self) -> &str {
        "semantic.cron"
    }

    fn description(&self) -> &str {
        "Evaluate N lens websets into one composite signal with snapshot deltas"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let config_value = args
            .get("config")
            .filter(|v| v.is_object())
            .ok_or_else(|| WorkflowError::validation("'config' is required and must be an object"))?;
        let variables = string_map(&args, "variables")?;

        // expand over the raw text so templates nested inside any string
        // (queries, prompts, enrichment descriptions) are substituted
        let expanded = template::substitute_json(&config_value.to_string(), &variables);
        let residuals = template::residual_tokens(&expanded);
        if !residuals.is_empty() {
            return Err(WorkflowError::validation(format!(
                "unresolved template variables: {}",
                residuals.join(", ")
            )));
        }
        let config: CronConfig = serde_json::from_str(&expanded)
            .map_err(|e| WorkflowError::validation(format!("invalid config: {}", e)))?;
        config.validate().map_err(WorkflowError::validation)?;
        let evaluator =
            ShapeEvaluator::compile(&config.shapes).map_err(WorkflowError::validation)?;
        let join_config = config
            .join
            .clone()
            .ok_or_else(|| WorkflowError::validation("config is missing 'join'"))?;
        let signal_config = config
            .signal
            .clone()
            .ok_or_else(|| WorkflowError::validation("config is missing 'signal'"))?;
        let declared = config.lens_ids();

        let previous: Option<Snapshot> = match args.get("previousSnapshot") {
            Some(Value::Null) | None => None,
            Some(value) => Some(serde_json::from_value(value.clone()).map_err(|e| {
                WorkflowError::validation(format!("invalid previousSnapshot: {}", e))
            })?),
        };
        let existing: Option<HashMap<String, String>> =
            match args.get("existingWebsets").filter(|v| !v.is_null()) {
                Some(_) => Some(string_map(&args, "existingWebsets")?),
                None => None,
            };
        let count = optional_u64(&args, "count", DEFAULT_LENS_COUNT);
        let poll = poll_config(&args);

        tracker.begin("resolve");
        let reevaluation = existing.is_some();
        let mut bindings: Vec<LensBinding> = Vec::with_capacity(config.lenses.len());
        if let Some(existing) = &existing {
            for lens in &config.lenses {
                let webset_id = existing
                    .get(&lens.id)
                    .cloned()
                    .or_else(|| lens.webset_id.clone())
                    .ok_or_else(|| {
                        WorkflowError::validation(format!(
                            "existingWebsets is missing lens '{}'",
                            lens.id
                        ))
                    })?;
                let webset = ctx
                    .upstream
                    .get_webset(&webset_id)
                    .await
                    .map_err(|e| WorkflowError::upstream("resolve", e))?;
                bindings.push(LensBinding {
                    lens: lens.clone(),
                    webset_id,
                    created: false,
                    webset,
                });
            }
        } else {
            for lens in &config.lenses {
                let binding = if let Some(webset_id) = &lens.webset_id {
                    // bound websets are externally owned and never polled
                    let webset = ctx
                        .upstream
                        .get_webset(webset_id)
                        .await
                        .map_err(|e| WorkflowError::upstream("resolve", e))?;
                    LensBinding {
                        lens: lens.clone(),
                        webset_id: webset_id.clone(),
                        created: false,
                        webset,
                    }
                } else {
                    let search = lens.search.clone().ok_or_else(|| {
                        WorkflowError::validation(format!("lens '{}' has no search", lens.id))
                    })?;
                    let enrichments = if lens.enrichments.is_empty() {
                        derived_enrichments(&lens.id, &config.shapes)
                    } else {
                        lens.enrichments.clone()
                    };
                    let webset = ctx
                        .upstream
                        .create_webset(CreateWebsetRequest {
                            search: SearchSpec {
                                query: search.query,
                                count: search.count.or(Some(count)),
                                entity: search.entity,
                                criteria: search
                                    .criteria
                                    .into_iter()
                                    .map(|description| CriterionSpec { description })
                                    .collect(),
                            },
                            enrichments,
                            external_id: None,
                            metadata: None,
                        })
                        .await
                        .map_err(|e| WorkflowError::upstream("resolve", e))?;
                    LensBinding {
                        lens: lens.clone(),
                        webset_id: webset.id.clone(),
                        created: true,
                        webset,
                    }
                };
                bindings.push(binding);

                ctx.checkpoint(json!({
                    "websets": bindings
                        .iter()
                        .map(|b| (b.lens.id.clone(), b.webset_id.clone()))
                        .collect::<BTreeMap<String, String>>()
                }))
                .await;
                if ctx.is_cancelled().await {
                    for binding in bindings.iter().filter(|b| b.created) {
                        cancel_webset_best_effort(&ctx, &binding.webset_id).await;
                    }
                    return Ok(Value::Null);
                }
            }
        }

        let mut timed_out = false;
        if !reevaluation {
            tracker.begin("poll");
            let polls = bindings
                .iter()
                .filter(|b| b.created)
                .map(|b| poll_until_idle(&ctx, &b.webset_id, "poll", (2, TOTAL_STEPS), &poll));
            let outcomes = join_all(polls).await;
            let mut outcome_iter = outcomes.into_iter();
            let mut cancelled = false;
            let mut poll_cancelled: Vec<String> = Vec::new();
            for binding in bindings.iter_mut().filter(|b| b.created) {
                let outcome = outcome_iter
                    .next()
                    .ok_or_else(|| WorkflowError::step("poll", "poll outcome missing"))??;
                timed_out |= outcome.timed_out;
                if outcome.cancelled {
                    cancelled = true;
                    poll_cancelled.push(binding.webset_id.clone());
                }
                binding.webset = outcome.webset;
            }
            if cancelled {
                for binding in bindings.iter().filter(|b| b.created) {
                    if !poll_cancelled.contains(&binding.webset_id) {
                        cancel_webset_best_effort(&ctx, &binding.webset_id).await;
                    }
                }
                return Ok(Value::Null);
            }
        }

        tracker.begin("evaluate");
        let mut lens_evals: Vec<LensEvaluation> = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let descriptions: HashMap<String, String> = binding
                .webset
                .enrichments
                .iter()
                .map(|e| (e.id.clone(), e.description.clone()))
                .collect();
            let items =
                collect_items(&ctx, &binding.webset_id, item_cap(count), "evaluate").await?;
            let total_items = items.len();
            let shaped: Vec<ShapedItem> = items
                .iter()
                .filter(|item| item.has_satisfied_evaluation())
                .filter_map(|item| {
                    let values = resolve_enrichments(item, &descriptions);
                    if !evaluator.is_shaped(&binding.lens.id, &values) {
                        return None;
                    }
                    Some(ShapedItem {
                        item_id: item.id.clone(),
                        name: item.entity_name(),
                        url: item.url().map(str::to_string),
                        created_at: item.created_at,
                        enrichments: values
                            .into_iter()
                            .map(|(description, value)| (description, value.result))
                            .collect(),
                    })
                })
                .collect();
            lens_evals.push(LensEvaluation {
                lens_id: binding.lens.id.clone(),
                webset_id: binding.webset_id.clone(),
                total_items,
                shaped,
                shape_labels: evaluator.labels(&binding.lens.id),
            });

            if ctx.is_cancelled().await {
                for binding in bindings.iter().filter(|b| b.created) {
                    cancel_webset_best_effort(&ctx, &binding.webset_id).await;
                }
                return Ok(Value::Null);
            }
        }

        tracker.begin("join");
        let outcome = join_lenses(&lens_evals, &join_config);
        let signal = evaluate_signal(&signal_config.requires, &declared, &outcome);

        let snapshot = Snapshot {
            evaluated_at: Utc::now(),
            lenses: lens_evals
                .iter()
                .map(|lens| {
                    (
                        lens.lens_id.clone(),
                        LensSnapshot {
                            webset_id: lens.webset_id.clone(),
                            total_items: lens.total_items,
                            shaped_count: lens.shaped.len(),
                            shapes: lens.shape_labels.clone(),
                        },
                    )
                })
                .collect(),
            join: JoinSnapshot::from(&outcome),
            signal,
        };
        let delta = previous.as_ref().map(|prev| compute_delta(prev, &snapshot));

        if !reevaluation {
            if let Some(monitor) = &config.monitor {
                tracker.begin("monitor");
                if ctx.is_cancelled().await {
                    for binding in bindings.iter().filter(|b| b.created) {
                        cancel_webset_best_effort(&ctx, &binding.webset_id).await;
                    }
                    return Ok(Value::Null);
                }
                for binding in &bindings {
                    let spec = MonitorSpec {
                        webset_id: binding.webset_id.clone(),
                        cadence: MonitorCadence {
                            cron: monitor.cron.clone(),
                            timezone: monitor.timezone.clone(),
                        },
                    };
                    if let Err(err) = ctx.upstream.create_monitor(spec).await {
                        tracing::warn!(
                            webset_id = %binding.webset_id,
                            error = %err,
                            "monitor attach failed"
                        );
                    }
                }
            }
        }

        let websets: BTreeMap<String, String> = bindings
            .iter()
            .map(|b| (b.lens.id.clone(), b.webset_id.clone()))
            .collect();
        let steps = tracker.finish();
        let mut result = json!({
            "name": config.name,
            "mode": if reevaluation { "reevaluation" } else { "initial" },
            "websets": websets,
            "snapshot": snapshot,
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        });
        if let Some(delta) = delta {
            result["delta"] = serde_json::to_value(delta).unwrap_or(Value::Null);
        }
        if timed_out {
            result["timedOut"] = json!(true);
        }
        Ok(result)
    }
}
