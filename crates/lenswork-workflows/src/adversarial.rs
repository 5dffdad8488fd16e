//! `adversarial.verify` - argue both sides before believing either.
//!
//! Two sequential searches gather supporting and disconfirming evidence
//! for a claim; an optional synthesis step hands both sets to the
//! upstream's deep-research API with a deterministically built prompt.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};

use lenswork_core::projection::{bundle_items, enrichment_definitions, ItemBundle, ProjectedItem};
use lenswork_core::types::ResearchStatus;
use lenswork_core::upstream::{CreateWebsetRequest, ResearchRequest, SearchSpec};
use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError};

use crate::helpers::{
    cancel_webset_best_effort, collect_items, criteria_specs, entity_spec, item_cap, optional_bool,
    optional_u64, poll_config, poll_research, poll_until_idle, require_str, steps_value,
    truncate_text, PollConfig, StepTracker,
};

const TOTAL_STEPS: u32 = 4;
const DEFAULT_EVIDENCE_COUNT: u64 = 5;
const PROMPT_ITEM_LIMIT: usize = 10;
const PROMPT_DESCRIPTION_CHARS: usize = 200;

/// Search for the claim and against it, then weigh the evidence.
pub struct AdversarialVerify;

struct EvidencePhase {
    webset_id: String,
    bundle: ItemBundle,
    timed_out: bool,
    cancelled: bool,
}

async fn run_evidence_phase(
    ctx: &WorkflowContext,
    step: &str,
    position: u32,
    query: String,
    args: &Value,
    count: u64,
    poll: &PollConfig,
) -> Result<EvidencePhase, WorkflowError> {
    let request = CreateWebsetRequest {
        search: SearchSpec {
            query,
            count: Some(count),
            entity: entity_spec(args)?,
            criteria: criteria_specs(args)?,
        },
        enrichments: Vec::new(),
        external_id: None,
        metadata: None,
    };
    let webset = ctx
        .upstream
        .create_webset(request)
        .await
        .map_err(|e| WorkflowError::upstream(step, e))?;
    let webset_id = webset.id.clone();

    if ctx.is_cancelled().await {
        cancel_webset_best_effort(ctx, &webset_id).await;
        return Ok(EvidencePhase {
            webset_id,
            bundle: ItemBundle {
                data: Vec::new(),
                total: 0,
                included: 0,
                excluded: 0,
            },
            timed_out: false,
            cancelled: true,
        });
    }

    let outcome = poll_until_idle(ctx, &webset_id, step, (position, TOTAL_STEPS), poll).await?;
    if outcome.cancelled {
        return Ok(EvidencePhase {
            webset_id,
            bundle: ItemBundle {
                data: Vec::new(),
                total: 0,
                included: 0,
                excluded: 0,
            },
            timed_out: false,
            cancelled: true,
        });
    }

    let raw = collect_items(ctx, &webset_id, item_cap(count), step).await?;
    let definitions = enrichment_definitions(&outcome.webset.enrichments);
    let mut bundle = bundle_items(&raw, &definitions);
    bundle.data.truncate(count as usize);

    Ok(EvidencePhase {
        webset_id,
        bundle,
        timed_out: outcome.timed_out,
        cancelled: false,
    })
}

fn describe_items(items: &[ProjectedItem]) -> String {
    if items.is_empty() {
        return "- (no evidence found)\n".to_string();
    }
    let mut out = String::new();
    for item in items.iter().take(PROMPT_ITEM_LIMIT) {
        let description = item
            .description
            .as_deref()
            .map(|d| truncate_text(d, PROMPT_DESCRIPTION_CHARS))
            .unwrap_or_default();
        out.push_str(&format!("- {}: {}\n", item.name, description));
    }
    out
}

fn build_synthesis_prompt(
    claim: &str,
    supporting: &[ProjectedItem],
    disconfirming: &[ProjectedItem],
) -> String {
    format!(
        "Assess the following claim against two independently gathered evidence sets.\n\n\
         Claim: {}\n\n\
         Supporting evidence:\n{}\n\
         Disconfirming evidence:\n{}\n\
         Weigh both sets, state whether the claim holds, and list the key caveats.",
        claim,
        describe_items(supporting),
        describe_items(disconfirming)
    )
}

#[async_trait]
impl Workflow for AdversarialVerify {
    fn name(&self) -> &str {
        "adversarial.verify"
    }

    fn description(&self) -> &str {
        "Gather supporting and disconfirming evidence for a claim, optionally synthesized"
    }

    async fn run(&self, ctx: WorkflowContext, args: Value) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        let mut tracker = StepTracker::new();

        tracker.begin("validate");
        let claim = require_str(&args, "claim")?;
        let count = optional_u64(&args, "count", DEFAULT_EVIDENCE_COUNT);
        let synthesize = optional_bool(&args, "synthesize", true);
        let poll = poll_config(&args);

        tracker.begin("supporting");
        let supporting = run_evidence_phase(
            &ctx,
            "supporting",
            1,
            format!("evidence supporting: {}", claim),
            &args,
            count,
            &poll,
        )
        .await?;
        ctx.checkpoint(json!({ "websetIds": [supporting.webset_id] }))
            .await;
        if supporting.cancelled {
            return Ok(Value::Null);
        }

        tracker.begin("disconfirming");
        let disconfirming = run_evidence_phase(
            &ctx,
            "disconfirming",
            2,
            format!("evidence contradicting: {}", claim),
            &args,
            count,
            &poll,
        )
        .await?;
        ctx.checkpoint(json!({
            "websetIds": [supporting.webset_id, disconfirming.webset_id]
        }))
        .await;
        if disconfirming.cancelled {
            return Ok(Value::Null);
        }

        let mut synthesis = Value::Null;
        let mut research_id = None;
        if synthesize {
            tracker.begin("synthesize");
            if ctx.is_cancelled().await {
                return Ok(Value::Null);
            }
            let prompt =
                build_synthesis_prompt(&claim, &supporting.bundle.data, &disconfirming.bundle.data);
            let job = ctx
                .upstream
                .create_research(ResearchRequest {
                    instructions: prompt,
                    model: None,
                    output_schema: None,
                })
                .await
                .map_err(|e| WorkflowError::upstream("synthesize", e))?;
            let (job, _timed_out) = poll_research(&ctx, &job.id, "synthesize", &poll).await?;
            if job.status == ResearchStatus::Completed {
                synthesis = job.result_value().unwrap_or(Value::Null);
            }
            research_id = Some(job.id);
        }

        let steps = tracker.finish();
        let mut result = json!({
            "claim": claim,
            "supporting": {
                "websetId": supporting.webset_id,
                "items": supporting.bundle.data,
                "itemCount": supporting.bundle.included,
            },
            "disconfirming": {
                "websetId": disconfirming.webset_id,
                "items": disconfirming.bundle.data,
                "itemCount": disconfirming.bundle.included,
            },
            "synthesis": synthesis,
            "duration": started.elapsed().as_millis() as u64,
            "steps": steps_value(&steps),
        });
        if let Some(id) = research_id {
            result["researchId"] = json!(id);
        }
        if supporting.timed_out || disconfirming.timed_out {
            result["timedOut"] = json!(true);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{company_item, test_context, MockUpstream};
    use lenswork_core::types::ResearchOutput;
    use std::sync::Arc;

    #[test]
    fn test_claim_is_required() {
        tokio_test::block_on(async {
            let upstream = Arc::new(MockUpstream::new());
            let (ctx, _store) = test_context(upstream).await;
            let err = AdversarialVerify.run(ctx, json!({})).await.unwrap_err();
            assert_eq!(err.step, "validate");
        });
    }

    #[test]
    fn test_two_searches_and_synthesis() {
        tokio_test::block_on(async {
            let upstream = Arc::new(
                MockUpstream::new()
                    .queue_items(vec![company_item("i1", "Backer Corp", "https://b.example")])
                    .queue_items(vec![company_item("i2", "Doubter Inc", "https://d.example")])
                    .research_output(ResearchOutput {
                        content: None,
                        parsed: Some(json!({ "verdict": "holds with caveats" })),
                    }),
            );
            let (ctx, _store) = test_context(upstream.clone()).await;

            let result = AdversarialVerify
                .run(
                    ctx,
                    json!({
                        "claim": "robotics funding is accelerating",
                        "pollIntervalMs": 5
                    }),
                )
                .await
                .unwrap();

            assert_eq!(result["supporting"]["websetId"], "ws_1");
            assert_eq!(result["disconfirming"]["websetId"], "ws_2");
            assert_eq!(result["synthesis"]["verdict"], "holds with caveats");

            let requests = upstream.research_requests();
            assert_eq!(requests.len(), 1);
            let prompt = &requests[0].instructions;
            assert!(prompt.contains("robotics funding is accelerating"));
            assert!(prompt.contains("Backer Corp"));
            assert!(prompt.contains("Doubter Inc"));
        });
    }

    #[test]
    fn test_synthesis_can_be_skipped() {
        tokio_test::block_on(async {
            let upstream = Arc::new(
                MockUpstream::new()
                    .queue_items(vec![])
                    .queue_items(vec![]),
            );
            let (ctx, _store) = test_context(upstream.clone()).await;

            let result = AdversarialVerify
                .run(
                    ctx,
                    json!({
                        "claim": "x",
                        "synthesize": false,
                        "pollIntervalMs": 5
                    }),
                )
                .await
                .unwrap();

            assert_eq!(result["synthesis"], Value::Null);
            assert!(upstream.research_requests().is_empty());
        });
    }
}
