//! `qd.winnow` - quality-diversity winnowing over a webset.
//!
//! The webset's criteria define behavioral dimensions and its
//! enrichments define fitness. Each item is classified into a niche (the
//! bit vector of satisfied criteria), scored, and the best item per
//! niche survives. Quality metrics and per-criterion descriptor feedback
//! close the loop for the caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use lenswork_core::projection::{enrichment_definitions, project_item};
use lenswork_core::types::{
    EnrichmentFormat, EnrichmentStatus, Satisfaction, Webset, WebsetItem,
};
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError};

use crate::helpers::{
    collect_items, item_cap, optional_str, optional_u64, parse_number, require_str, steps_value,
    StepTracker,
};

const DEFAULT_COLLECT_COUNT: u64 = 25;
const DEFAULT_ROUNDS: u64 = 1;
const MAX_ROUNDS: u64 = 10;
const DEFAULT_ROUND_DELAY_MS: u64 = 2_000;

// Descriptor feedback thresholds on the live success rate.
const TOO_STRICT_BELOW: f64 = 5.0;
const NOT_DISCRIMINATING_ABOVE: f64 = 95.0;

/// Keep the best of every kind, not the best overall.
pub struct QdWinnow;

/// Elite selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionStrategy {
    /// One elite per populated niche
    Diverse,
    /// Only items satisfying every criterion
    AllCriteria,
    /// Every item satisfying at least one criterion
    AnyCriteria,
}

impl SelectionStrategy {
    fn parse(input: &str) -> Result<Self, WorkflowError> {
        match input {
            "diverse" => Ok(Self::Diverse),
            "all-criteria" => Ok(Self::AllCriteria),
            "any-criteria" => Ok(Self::AnyCriteria),
            other => Err(WorkflowError::validation(format!(
                "unknown strategy '{}'; expected diverse | all-criteria | any-criteria",
                other
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Diverse => "diverse",
            Self::AllCriteria => "all-criteria",
            Self::AnyCriteria => "any-criteria",
        }
    }
}

struct ScoredItem {
    item: WebsetItem,
    vector: Vec<bool>,
    niche: String,
    fitness: f64,
}

/// Criteria descriptions of the webset's most recent search.
fn criteria_list(webset: &Webset) -> Vec<String> {
    webset
        .last_search()
        .map(|s| s.criteria.iter().map(|c| c.description.clone()).collect())
        .unwrap_or_default()
}

/// Classify an item into its niche.
///
/// Position i is true iff the evaluation for criterion i is `yes`;
/// missing evaluations contribute false.
fn classify(item: &WebsetItem, criteria: &[String]) -> (Vec<bool>, String) {
    let vector: Vec<bool> = criteria
        .iter()
        .map(|criterion| {
            item.evaluations
                .iter()
                .find(|e| &e.criterion == criterion)
                .map(|e| e.satisfied == Satisfaction::Yes)
                .unwrap_or(false)
        })
        .collect();
    let niche = vector
        .iter()
        .map(|&bit| if bit { "1" } else { "0" })
        .collect::<Vec<_>>()
        .join(",");
    (vector, niche)
}

/// Fitness of one item: the mean of its completed-enrichment sub-scores.
fn fitness(item: &WebsetItem) -> f64 {
    let scores: Vec<f64> = item
        .enrichments
        .iter()
        .filter(|r| r.status == EnrichmentStatus::Completed)
        .map(|r| {
            let first = r.first_result().unwrap_or("");
            match r.format {
                EnrichmentFormat::Number => parse_number(first).unwrap_or(0.0),
                EnrichmentFormat::Options
                | EnrichmentFormat::Text
                | EnrichmentFormat::Date
                | EnrichmentFormat::Email
                | EnrichmentFormat::Phone
                | EnrichmentFormat::Url => {
                    if first.trim().is_empty() {
                        0.0
                    } else {
                        1.0
                    }
                }
            }
        })
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Pick elites per the strategy, ordered by fitness descending.
fn select_elites<'a>(scored: &'a [ScoredItem], strategy: SelectionStrategy) -> Vec<&'a ScoredItem> {
    let mut elites: Vec<&ScoredItem> = match strategy {
        SelectionStrategy::Diverse => {
            let mut best: HashMap<&str, &ScoredItem> = HashMap::new();
            for candidate in scored {
                match best.get(candidate.niche.as_str()) {
                    Some(current) if current.fitness >= candidate.fitness => {}
                    _ => {
                        best.insert(candidate.niche.as_str(), candidate);
                    }
                }
            }
            best.into_values().collect()
        }
        SelectionStrategy::AllCriteria => scored
            .iter()
            .filter(|s| !s.vector.is_empty() && s.vector.iter().all(|&b| b))
            .collect(),
        SelectionStrategy::AnyCriteria => scored
            .iter()
            .filter(|s| s.vector.iter().any(|&b| b))
            .collect(),
    };
    elites.sort_by(|a, b| {
        b.fitness
            .partial_cmp(&a.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    elites
}

/// Shannon entropy of the niche distribution, normalized to [0, 1].
fn normalized_diversity(scored: &[ScoredItem], criteria_count: usize) -> f64 {
    if criteria_count == 0 || scored.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in scored {
        *counts.entry(item.niche.as_str()).or_insert(0) += 1;
    }
    let total = scored.len() as f64;
    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();
    entropy / criteria_count as f64
}

fn quality_metrics(
    scored: &[ScoredItem],
    elites: &[&ScoredItem],
    criteria_count: usize,
    webset: &Webset,
) -> Value {
    let total_niches = (criteria_count as f64).exp2();
    let populated: usize = {
        let mut seen: Vec<&str> = scored.iter().map(|s| s.niche.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    };
    let coverage = if total_niches > 0.0 {
        populated as f64 / total_niches
    } else {
        0.0
    };
    let avg_fitness = if elites.is_empty() {
        0.0
    } else {
        elites.iter().map(|e| e.fitness).sum::<f64>() / elites.len() as f64
    };

    let (found, analyzed) = webset.searches.iter().fold((0u64, 0u64), |(f, a), search| {
        (f + search.progress.found, a + search.progress.analyzed)
    });
    let stringency = if analyzed > 0 {
        found as f64 / analyzed as f64
    } else {
        0.0
    };

    json!({
        "coverage": coverage,
        "avgFitness": avg_fitness,
        "diversity": normalized_diversity(scored, criteria_count),
        "stringency": stringency,
        "populatedNiches": populated,
        "totalNiches": total_niches as u64,
    })
}

/// Label each criterion by how well it discriminates, from the live
/// success rate of the webset's last search.
fn descriptor_feedback(webset: &Webset) -> Vec<Value> {
    webset
        .last_search()
        .map(|search| {
            search
                .criteria
                .iter()
                .map(|criterion| {
                    let label = match criterion.success_rate {
                        Some(rate) if rate < TOO_STRICT_BELOW => "too-strict",
                        Some(rate) if rate > NOT_DISCRIMINATING_ABOVE => "not-discriminating",
                        Some(_) => "good-discriminator",
                        None => "unknown",
                    };
                    json!({
                        "criterion": criterion.description,
                        "successRate": criterion.success_rate,
                        "label": label,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Workflow for QdWinnow {
    fn name(&self) -> &str {
        "qd.winnow"
    }

    fn description(&self) -> &str {
        "Classify webset items into criterion niches, score fitness, keep the elites"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let webset_id = require_str(&args, "websetId")?;
        let strategy = SelectionStrategy::parse(
            &optional_str(&args, "strategy").unwrap_or_else(|| "diverse".to_string()),
        )?;
        let count = optional_u64(&args, "count", DEFAULT_COLLECT_COUNT);
        let rounds = optional_u64(&args, "rounds", DEFAULT_ROUNDS).clamp(1, MAX_ROUNDS);
        let round_delay =
            Duration::from_millis(optional_u64(&args, "roundDelayMs", DEFAULT_ROUND_DELAY_MS));

        let mut round_summaries: Vec<Value> = Vec::new();
        let mut final_webset: Option<Webset> = None;
        let mut final_scored: Vec<ScoredItem> = Vec::new();
        let mut criteria: Vec<String> = Vec::new();

        for round in 1..=rounds {
            if round > 1 {
                tokio::time::sleep(round_delay).await;
            }
            // the webset is externally owned: fetch fresh state, never cancel it
            if ctx.is_cancelled().await {
                return Ok(Value::Null);
            }

            tracker.begin("evaluate");
            let webset = ctx
                .upstream
                .get_webset(&webset_id)
                .await
                .map_err(|e| WorkflowError::upstream("evaluate", e))?;
            criteria = criteria_list(&webset);
            if criteria.is_empty() {
                return Err(WorkflowError::step(
                    "evaluate",
                    format!("webset {} has no criteria to classify against", webset_id),
                ));
            }

            let items = collect_items(&ctx, &webset_id, item_cap(count), "evaluate").await?;
            let scored: Vec<ScoredItem> = items
                .into_iter()
                .map(|item| {
                    let (vector, niche) = classify(&item, &criteria);
                    let fitness = fitness(&item);
                    ScoredItem {
                        item,
                        vector,
                        niche,
                        fitness,
                    }
                })
                .collect();

            let selected = select_elites(&scored, strategy).len();
            round_summaries.push(json!({
                "round": round,
                "itemCount": scored.len(),
                "selectedCount": selected,
            }));

            final_scored = scored;
            final_webset = Some(webset);
        }

        // rounds >= 1, so the webset is always present here
        let webset = final_webset
            .ok_or_else(|| WorkflowError::step("evaluate", "no evaluation round completed"))?;
        let elites = select_elites(&final_scored, strategy);
        let metrics = quality_metrics(&final_scored, &elites, criteria.len(), &webset);
        let feedback = descriptor_feedback(&webset);

        let definitions = enrichment_definitions(&webset.enrichments);
        let elites_value: Vec<Value> = elites
            .iter()
            .map(|scored| {
                let mut entry =
                    serde_json::to_value(project_item(&scored.item, &definitions))
                        .unwrap_or(Value::Null);
                entry["niche"] = json!(scored.niche);
                entry["fitness"] = json!(scored.fitness);
                entry
            })
            .collect();

        let steps = tracker.finish();
        Ok(json!({
            "websetId": webset_id,
            "strategy": strategy.as_str(),
            "criteriaCount": criteria.len(),
            "rounds": round_summaries,
            "elites": elites_value,
            "qualityMetrics": metrics,
            "descriptorFeedback": feedback,
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_context, MockUpstream};
    use lenswork_core::types::{
        Enrichment, ItemEnrichmentResult, ItemEvaluation, SearchCriterion, SearchProgress,
        WebsetSearch, WebsetStatus,
    };
    use std::sync::Arc;

    fn qd_webset(criteria: &[(&str, Option<f64>)]) -> Webset {
        Webset {
            id: "ws_qd".to_string(),
            status: WebsetStatus::Idle,
            searches: vec![WebsetSearch {
                id: "search_1".to_string(),
                query: "robotics startups".to_string(),
                status: None,
                progress: SearchProgress {
                    found: 4,
                    analyzed: 16,
                    completion: 100.0,
                    time_left: None,
                },
                criteria: criteria
                    .iter()
                    .map(|(description, success_rate)| SearchCriterion {
                        description: description.to_string(),
                        success_rate: *success_rate,
                    })
                    .collect(),
            }],
            enrichments: vec![Enrichment {
                id: "enr_1".to_string(),
                description: "score".to_string(),
                format: EnrichmentFormat::Number,
            }],
            monitors: Vec::new(),
        }
    }

    fn scored_item(id: &str, evals: &[(&str, Satisfaction)], score: &str) -> WebsetItem {
        WebsetItem {
            id: id.to_string(),
            source: None,
            created_at: None,
            properties: serde_json::json!({
                "type": "company",
                "url": format!("https://{}.example", id),
                "description": id,
                "company": { "name": id }
            }),
            evaluations: evals
                .iter()
                .map(|(criterion, satisfied)| ItemEvaluation {
                    criterion: criterion.to_string(),
                    satisfied: *satisfied,
                })
                .collect(),
            enrichments: vec![ItemEnrichmentResult {
                enrichment_id: "enr_1".to_string(),
                format: EnrichmentFormat::Number,
                status: EnrichmentStatus::Completed,
                result: Some(vec![score.to_string()]),
            }],
        }
    }

    fn sample_population() -> Vec<WebsetItem> {
        use lenswork_core::types::Satisfaction::{No, Yes};
        vec![
            scored_item("a", &[("c1", Yes), ("c2", Yes)], "5"),
            scored_item("b", &[("c1", Yes), ("c2", No)], "8"),
            scored_item("c", &[("c1", Yes), ("c2", No)], "12"),
            scored_item("d", &[("c1", No), ("c2", Yes)], "3"),
        ]
    }

    #[test]
    fn test_niche_key_shape() {
        let criteria = vec!["c1".to_string(), "c2".to_string(), "c3".to_string()];
        let item = scored_item("a", &[("c1", Satisfaction::Yes)], "1");
        let (vector, niche) = classify(&item, &criteria);
        assert_eq!(vector, vec![true, false, false]);
        assert_eq!(niche, "1,0,0");
        let bits: Vec<&str> = niche.split(',').collect();
        assert_eq!(bits.len(), criteria.len());
        assert!(bits.iter().all(|b| *b == "0" || *b == "1"));
    }

    #[test]
    fn test_fitness_scoring_rules() {
        let mut item = scored_item("a", &[], "12.5");
        assert!((fitness(&item) - 12.5).abs() < 1e-9);

        // unparseable number scores zero
        item.enrichments[0].result = Some(vec!["n/a".to_string()]);
        assert_eq!(fitness(&item), 0.0);

        // pending enrichments never contribute
        item.enrichments[0].status = EnrichmentStatus::Pending;
        assert_eq!(fitness(&item), 0.0);

        // presence formats score one
        item.enrichments[0] = ItemEnrichmentResult {
            enrichment_id: "enr_1".to_string(),
            format: EnrichmentFormat::Text,
            status: EnrichmentStatus::Completed,
            result: Some(vec!["present".to_string()]),
        };
        assert_eq!(fitness(&item), 1.0);

        // no enrichments at all
        item.enrichments.clear();
        assert_eq!(fitness(&item), 0.0);
    }

    #[test]
    fn test_diverse_selection_one_elite_per_niche() {
        tokio_test::block_on(async {
            let upstream = Arc::new(
                MockUpstream::new()
                    .insert_webset(qd_webset(&[("c1", Some(50.0)), ("c2", Some(50.0))]), sample_population()),
            );
            let (ctx, _store) = test_context(upstream).await;

            let result = QdWinnow
                .run(ctx, serde_json::json!({ "websetId": "ws_qd" }))
                .await
                .unwrap();

            let elites = result["elites"].as_array().unwrap();
            assert_eq!(elites.len(), 3);
            // ordered by fitness descending; the 1,0 niche keeps its best item
            assert_eq!(elites[0]["niche"], "1,0");
            assert_eq!(elites[0]["fitness"], 12.0);
            assert_eq!(elites[1]["niche"], "1,1");
            assert_eq!(elites[2]["niche"], "0,1");
            assert_eq!(result["qualityMetrics"]["coverage"], 0.75);
        });
    }

    #[test]
    fn test_strategy_filters() {
        let criteria = vec!["c1".to_string(), "c2".to_string()];
        let scored: Vec<ScoredItem> = sample_population()
            .into_iter()
            .map(|item| {
                let (vector, niche) = classify(&item, &criteria);
                let fitness = fitness(&item);
                ScoredItem {
                    item,
                    vector,
                    niche,
                    fitness,
                }
            })
            .collect();

        let all = select_elites(&scored, SelectionStrategy::AllCriteria);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].niche, "1,1");

        let any = select_elites(&scored, SelectionStrategy::AnyCriteria);
        assert_eq!(any.len(), 4);
        assert!(any.windows(2).all(|w| w[0].fitness >= w[1].fitness));
    }

    #[test]
    fn test_diversity_is_one_iff_uniform() {
        let criteria = vec!["c1".to_string(), "c2".to_string()];
        use lenswork_core::types::Satisfaction::{No, Yes};
        let uniform: Vec<ScoredItem> = vec![
            scored_item("a", &[("c1", Yes), ("c2", Yes)], "1"),
            scored_item("b", &[("c1", Yes), ("c2", No)], "1"),
            scored_item("c", &[("c1", No), ("c2", Yes)], "1"),
            scored_item("d", &[("c1", No), ("c2", No)], "1"),
        ]
        .into_iter()
        .map(|item| {
            let (vector, niche) = classify(&item, &criteria);
            ScoredItem {
                item,
                vector,
                niche,
                fitness: 1.0,
            }
        })
        .collect();
        assert!((normalized_diversity(&uniform, 2) - 1.0).abs() < 1e-9);

        let skewed = &uniform[..2];
        assert!(normalized_diversity(skewed, 2) < 1.0);
    }

    #[test]
    fn test_descriptor_feedback_labels() {
        let webset = qd_webset(&[
            ("rare", Some(2.0)),
            ("everyone", Some(99.0)),
            ("useful", Some(40.0)),
            ("unmeasured", None),
        ]);
        let feedback = descriptor_feedback(&webset);
        let labels: Vec<&str> = feedback
            .iter()
            .map(|f| f["label"].as_str().unwrap())
            .collect();
        assert_eq!(
            labels,
            vec![
                "too-strict",
                "not-discriminating",
                "good-discriminator",
                "unknown"
            ]
        );
    }

    #[test]
    fn test_stringency_from_search_counters() {
        tokio_test::block_on(async {
            let upstream = Arc::new(
                MockUpstream::new()
                    .insert_webset(qd_webset(&[("c1", None), ("c2", None)]), sample_population()),
            );
            let (ctx, _store) = test_context(upstream).await;
            let result = QdWinnow
                .run(ctx, serde_json::json!({ "websetId": "ws_qd" }))
                .await
                .unwrap();
            // found 4 / analyzed 16
            assert_eq!(result["qualityMetrics"]["stringency"], 0.25);
        });
    }

    #[test]
    fn test_missing_webset_id_is_validation_failure() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new());
            let (ctx, _store) = test_context(upstream).await;
            let err = QdWinnow.run(ctx, serde_json::json!({})).await.unwrap_err();
            assert_eq!(err.step, "validate");
        });
    }
}
