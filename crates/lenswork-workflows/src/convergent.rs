//! `convergent.search` - parallel searches, fuzzy entity intersection.
//!
//! Launches 2-5 queries as independent websets and deduplicates the
//! entities they return: exact URL match first, then Dice bigram name
//! similarity. Entities seen by two or more queries form the
//! intersection; single-query entities land in per-query buckets.

use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};

use lenswork_core::similarity::dice_coefficient;
use lenswork_core::types::WebsetItem;
use lenswork_core::upstream::{CreateWebsetRequest, SearchSpec};
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError};

use crate::helpers::{
    cancel_webset_best_effort, collect_items, criteria_specs, entity_spec, item_cap, optional_f64,
    optional_u64, poll_config, poll_until_idle, steps_value, StepTracker, DEFAULT_ITEM_COUNT,
};

const TOTAL_STEPS: u32 = 5;
const MIN_QUERIES: usize = 2;
const MAX_QUERIES: usize = 5;
const DEFAULT_NAME_THRESHOLD: f64 = 0.85;

/// Cross-validate a hypothesis by approaching it from several angles.
pub struct ConvergentSearch;

struct EntityRecord {
    name: String,
    url: Option<String>,
    found_in: BTreeSet<usize>,
    occurrences: usize,
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn fold_item(records: &mut Vec<EntityRecord>, item: &WebsetItem, query_index: usize, threshold: f64) {
    let name = item.entity_name();
    let url = item.url().map(normalize_url);

    if let Some(url) = &url {
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.url.as_deref() == Some(url.as_str()))
        {
            record.found_in.insert(query_index);
            record.occurrences += 1;
            return;
        }
    }
    if let Some(record) = records
        .iter_mut()
        .find(|r| dice_coefficient(&r.name, &name) >= threshold)
    {
        record.found_in.insert(query_index);
        record.occurrences += 1;
        if record.url.is_none() {
            record.url = url;
        }
        return;
    }
    records.push(EntityRecord {
        name,
        url,
        found_in: BTreeSet::from([query_index]),
        occurrences: 1,
    });
}

#[async_trait]
impl Workflow for ConvergentSearch {
    fn name(&self) -> &str {
        "convergent.search"
    }

    fn description(&self) -> &str {
        "Run parallel searches and intersect their entities via URL and fuzzy name matching"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let queries: Vec<String> = match args.get("queries").and_then(|v| v.as_array()) {
            Some(list) => list
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        WorkflowError::validation("'queries' must be an array of strings")
                    })
                })
                .collect::<Result<_, _>>()?,
            None => {
                return Err(WorkflowError::validation(
                    "'queries' is required and must be an array of strings",
                ))
            }
        };
        if queries.len() < MIN_QUERIES || queries.len() > MAX_QUERIES {
            return Err(WorkflowError::validation(format!(
                "'queries' must contain between {} and {} entries, got {}",
                MIN_QUERIES,
                MAX_QUERIES,
                queries.len()
            )));
        }
        let entity = entity_spec(&args)?;
        let criteria = criteria_specs(&args)?;
        let count = optional_u64(&args, "count", DEFAULT_ITEM_COUNT);
        let threshold = optional_f64(&args, "nameThreshold", DEFAULT_NAME_THRESHOLD);
        let poll = poll_config(&args);

        tracker.begin("create");
        let creates = queries.iter().map(|query| {
            let request = CreateWebsetRequest {
                search: SearchSpec {
                    query: query.clone(),
                    count: Some(count),
                    entity: entity.clone(),
                    criteria: criteria.clone(),
                },
                enrichments: Vec::new(),
                external_id: None,
                metadata: None,
            };
            ctx.upstream.create_webset(request)
        });
        let mut webset_ids = Vec::with_capacity(queries.len());
        for created in join_all(creates).await {
            let webset = created.map_err(|e| WorkflowError::upstream("create", e))?;
            webset_ids.push(webset.id);
        }
        ctx.checkpoint(json!({ "websetIds": webset_ids })).await;
        if ctx.is_cancelled().await {
            for webset_id in &webset_ids {
                cancel_webset_best_effort(&ctx, webset_id).await;
            }
            return Ok(Value::Null);
        }

        tracker.begin("poll");
        let polls = webset_ids
            .iter()
            .map(|id| poll_until_idle(&ctx, id, "poll", (2, TOTAL_STEPS), &poll));
        let mut outcomes = Vec::with_capacity(webset_ids.len());
        for polled in join_all(polls).await {
            outcomes.push(polled?);
        }
        if outcomes.iter().any(|o| o.cancelled) {
            // branches that already went idle never observed cancellation
            for (id, outcome) in webset_ids.iter().zip(&outcomes) {
                if !outcome.cancelled {
                    cancel_webset_best_effort(&ctx, id).await;
                }
            }
            return Ok(Value::Null);
        }
        let timed_out = outcomes.iter().any(|o| o.timed_out);

        tracker.begin("collect");
        let mut per_query: Vec<Vec<WebsetItem>> = Vec::with_capacity(webset_ids.len());
        for id in &webset_ids {
            per_query.push(collect_items(&ctx, id, item_cap(count), "collect").await?);
        }

        tracker.begin("dedupe");
        let total_items: usize = per_query.iter().map(Vec::len).sum();
        let mut records: Vec<EntityRecord> = Vec::new();
        for (query_index, items) in per_query.iter().enumerate() {
            for item in items {
                fold_item(&mut records, item, query_index, threshold);
            }
        }

        let total_queries = queries.len();
        let mut intersection: Vec<Value> = records
            .iter()
            .filter(|r| r.found_in.len() >= 2)
            .map(|r| {
                let confidence = if total_items > 0 {
                    r.occurrences as f64 / total_items as f64
                } else {
                    0.0
                };
                json!({
                    "name": r.name,
                    "url": r.url,
                    "foundInQueries": r.found_in.iter().copied().collect::<Vec<usize>>(),
                    "foundInCount": r.found_in.len(),
                    "confidence": confidence,
                })
            })
            .collect();
        intersection.sort_by(|a, b| {
            let ca = a["confidence"].as_f64().unwrap_or(0.0);
            let cb = b["confidence"].as_f64().unwrap_or(0.0);
            cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
        });

        let unique: Vec<Value> = (0..total_queries)
            .map(|query_index| {
                let entities: Vec<Value> = records
                    .iter()
                    .filter(|r| r.found_in.len() == 1 && r.found_in.contains(&query_index))
                    .map(|r| json!({ "name": r.name, "url": r.url }))
                    .collect();
                json!({ "query": queries[query_index], "entities": entities })
            })
            .collect();

        let mut overlap_matrix = vec![vec![0usize; total_queries]; total_queries];
        for record in &records {
            for &i in &record.found_in {
                for &j in &record.found_in {
                    overlap_matrix[i][j] += 1;
                }
            }
        }

        let steps = tracker.finish();
        let mut result = json!({
            "websetIds": webset_ids,
            "totalQueries": total_queries,
            "intersection": intersection,
            "unique": unique,
            "overlapMatrix": overlap_matrix,
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        });
        if timed_out {
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
    fn test_query_count_is_range_checked() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new());
            let (ctx, _store) = test_context(upstream).await;
            let err = ConvergentSearch
                .run(ctx, json!({ "queries": ["only one"] }))
                .await
                .unwrap_err();
            assert_eq!(err.step, "validate");
        });
    }

    #[test]
    fn test_intersection_unique_and_overlap() {
        tokio_test::block_on(async {
            let upstream = Arc::new(
                MockUpstream::new()
                    .queue_items(vec![
                        company_item("i1", "Company A", "https://a.example"),
                        company_item("i2", "Company B", "https://b.example"),
                    ])
                    .queue_items(vec![
                        company_item("i3", "Company A", "https://a.example"),
                        company_item("i4", "Company C", "https://c.example"),
                    ]),
            );
            let (ctx, _store) = test_context(upstream).await;

            let result = ConvergentSearch
                .run(
                    ctx,
                    json!({
                        "queries": ["best robotics startups", "fastest growing robotics companies"],
                        "entity": { "type": "company" },
                        "pollIntervalMs": 5
                    }),
                )
                .await
                .unwrap();

            let intersection = result["intersection"].as_array().unwrap();
            assert_eq!(intersection.len(), 1);
            assert_eq!(intersection[0]["url"], "https://a.example");
            assert_eq!(intersection[0]["confidence"], json!(0.5));

            let unique = result["unique"].as_array().unwrap();
            assert_eq!(unique[0]["entities"][0]["url"], "https://b.example");
            assert_eq!(unique[1]["entities"][0]["url"], "https://c.example");

            assert_eq!(result["overlapMatrix"][0][1], json!(1));
            assert_eq!(result["overlapMatrix"][1][0], json!(1));
        });
    }

    #[test]
    fn test_fuzzy_name_match_joins_entities_without_urls() {
        tokio_test::block_on(async {
            let mut first = company_item("i1", "Acme Robotics Incorporated", "https://x1.example");
            first.properties["url"] = Value::Null;
            let mut second = company_item("i2", "Acme Robotics Incorporated.", "https://x2.example");
            second.properties["url"] = Value::Null;

            let upstream = Arc::new(
                MockUpstream::new()
                    .queue_items(vec![first])
                    .queue_items(vec![second]),
            );
            let (ctx, _store) = test_context(upstream).await;

            let result = ConvergentSearch
                .run(
                    ctx,
                    json!({
                        "queries": ["q one", "q two"],
                        "pollIntervalMs": 5
                    }),
                )
                .await
                .unwrap();

            assert_eq!(result["intersection"].as_array().unwrap().len(), 1);
        });
    }

    #[test]
    fn test_cancellation_cancels_every_created_webset() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new().stay_running());
            let (ctx, store) = test_context(upstream.clone()).await;
            store.cancel(&ctx.task_id).await.unwrap();

            let result = ConvergentSearch
                .run(ctx, json!({ "queries": ["a", "b"] }))
                .await
                .unwrap();

            assert_eq!(result, Value::Null);
            let mut cancels = upstream.cancel_calls();
            cancels.sort();
            assert_eq!(cancels, vec!["ws_1".to_string(), "ws_2".to_string()]);
        });
    }
}
