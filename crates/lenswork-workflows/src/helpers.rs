//! Shared workflow primitives.
//!
//! Every workflow is built from the same small set of moves: validate
//! arguments, create upstream resources, poll them to idleness while
//! mirroring progress, collect items under a hard cap, and check
//! cancellation at each safe point.

use std::time::{Duration, Instant};

use serde_json::Value;

use lenswork_core::types::{ResearchJob, TaskProgress, Webset, WebsetItem, WebsetStatus};
use lenswork_core::upstream::{CriterionSpec, EnrichmentSpec, EntitySpec};
use lenswork_core::workflow::{WorkflowContext, WorkflowError};

/// Default per-step deadline.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);
/// Default webset poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default item count when the caller does not specify one.
pub const DEFAULT_ITEM_COUNT: u64 = 10;
/// Largest single page requested from the streaming item listing.
const MAX_PAGE_SIZE: usize = 100;

/// Timing record for one named step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTiming {
    pub name: String,
    pub duration_ms: u64,
}

/// Records `(name, durationMs)` per step for observability.
///
/// `begin` closes the previous step implicitly; `finish` closes the
/// last one and yields the records for the workflow result.
#[derive(Debug, Default)]
pub struct StepTracker {
    steps: Vec<StepTiming>,
    current: Option<(String, Instant)>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a named step, closing the previous one.
    pub fn begin(&mut self, name: impl Into<String>) {
        self.close_current();
        self.current = Some((name.into(), Instant::now()));
    }

    /// Close the current step and return all timings.
    pub fn finish(mut self) -> Vec<StepTiming> {
        self.close_current();
        self.steps
    }

    fn close_current(&mut self) {
        if let Some((name, started)) = self.current.take() {
            self.steps.push(StepTiming {
                name,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }
    }
}

/// Serialize step timings for inclusion in a workflow result.
pub fn steps_value(steps: &[StepTiming]) -> Value {
    serde_json::to_value(steps).unwrap_or(Value::Null)
}

/// Poll loop configuration, derived from task args.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Refresh cadence
    pub interval: Duration,
    /// Per-step deadline; elapsing returns `timed_out` without raising
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// Build a poll configuration from `timeout` / `pollIntervalMs` args.
pub fn poll_config(args: &Value) -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(optional_u64(
            args,
            "pollIntervalMs",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )),
        deadline: Duration::from_millis(optional_u64(
            args,
            "timeout",
            DEFAULT_STEP_TIMEOUT.as_millis() as u64,
        )),
    }
}

/// Outcome of driving a webset towards idleness.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Last observed webset state
    pub webset: Webset,
    /// Deadline elapsed before the webset went idle
    pub timed_out: bool,
    /// Task cancellation was observed; upstream cancel was requested
    pub cancelled: bool,
}

/// Drive a webset until `idle`, mirroring search counters into task
/// progress on every refresh.
///
/// A webset that transitions to `paused` fails the step with a
/// non-recoverable error. An elapsed deadline returns `timed_out`
/// without raising so workflows may keep partial results. Observed
/// cancellation requests an upstream cancel (once) and returns early.
pub async fn poll_until_idle(
    ctx: &WorkflowContext,
    webset_id: &str,
    step: &str,
    position: (u32, u32),
    config: &PollConfig,
) -> Result<PollOutcome, WorkflowError> {
    let started = Instant::now();
    loop {
        let webset = ctx
            .upstream
            .get_webset(webset_id)
            .await
            .map_err(|e| WorkflowError::upstream(step, e))?;

        let progress = webset.last_search().map(|s| s.progress).unwrap_or_default();
        ctx.progress(
            TaskProgress::new(step, position.0, position.1).with_message(format!(
                "found {} / analyzed {}",
                progress.found, progress.analyzed
            )),
        )
        .await;

        match webset.status {
            WebsetStatus::Idle => {
                return Ok(PollOutcome {
                    webset,
                    timed_out: false,
                    cancelled: false,
                });
            }
            WebsetStatus::Paused => {
                return Err(WorkflowError::step(
                    step,
                    format!("webset {} was paused upstream", webset_id),
                ));
            }
            WebsetStatus::Pending | WebsetStatus::Running => {}
        }

        if ctx.is_cancelled().await {
            if let Err(err) = ctx.upstream.cancel_webset(webset_id).await {
                tracing::warn!(webset_id, error = %err, "best-effort webset cancel failed");
            }
            return Ok(PollOutcome {
                webset,
                timed_out: false,
                cancelled: true,
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= config.deadline {
            return Ok(PollOutcome {
                webset,
                timed_out: true,
                cancelled: false,
            });
        }
        let remaining = config.deadline - elapsed;
        tokio::time::sleep(config.interval.min(remaining)).await;
    }
}

/// Collect items from the streaming listing, capped at `cap`.
pub async fn collect_items(
    ctx: &WorkflowContext,
    webset_id: &str,
    cap: usize,
    step: &str,
) -> Result<Vec<WebsetItem>, WorkflowError> {
    let mut items: Vec<WebsetItem> = Vec::new();
    let mut cursor: Option<String> = None;
    while items.len() < cap {
        let page_size = (cap - items.len()).clamp(1, MAX_PAGE_SIZE);
        let page = ctx
            .upstream
            .list_items(webset_id, cursor.as_deref(), page_size)
            .await
            .map_err(|e| WorkflowError::upstream(step, e))?;
        if page.items.is_empty() {
            break;
        }
        items.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    items.truncate(cap);
    Ok(items)
}

/// Poll a research job until it reaches a terminal status.
///
/// Returns the last observed job and whether the deadline elapsed.
pub async fn poll_research(
    ctx: &WorkflowContext,
    research_id: &str,
    step: &str,
    config: &PollConfig,
) -> Result<(ResearchJob, bool), WorkflowError> {
    let started = Instant::now();
    loop {
        let job = ctx
            .upstream
            .get_research(research_id)
            .await
            .map_err(|e| WorkflowError::upstream(step, e))?;
        if job.status.is_terminal() {
            return Ok((job, false));
        }
        if ctx.is_cancelled().await {
            return Ok((job, false));
        }
        let elapsed = started.elapsed();
        if elapsed >= config.deadline {
            return Ok((job, true));
        }
        let remaining = config.deadline - elapsed;
        tokio::time::sleep(config.interval.min(remaining)).await;
    }
}

/// Item cap absorbing upstream over-recall.
pub fn item_cap(count: u64) -> usize {
    (count as usize).saturating_mul(2)
}

/// Request upstream cancellation of a workflow-owned webset.
///
/// Invoked when a workflow observes task cancellation; failures are
/// logged and swallowed. Callers must invoke this at most once per
/// webset.
pub async fn cancel_webset_best_effort(ctx: &WorkflowContext, webset_id: &str) {
    if let Err(err) = ctx.upstream.cancel_webset(webset_id).await {
        tracing::warn!(webset_id, error = %err, "best-effort webset cancel failed");
    }
}

// Argument validators. Failures surface as failed tasks at step
// `validate` with `recoverable: false`.

pub fn require_str(args: &Value, key: &str) -> Result<String, WorkflowError> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        Some(_) => Err(WorkflowError::validation(format!(
            "'{}' must not be empty",
            key
        ))),
        None => Err(WorkflowError::validation(format!(
            "'{}' is required and must be a string",
            key
        ))),
    }
}

pub fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn optional_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub fn optional_f64(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub fn optional_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Read an optional array of strings, rejecting wrongly-typed values.
pub fn optional_string_list(args: &Value, key: &str) -> Result<Vec<String>, WorkflowError> {
    let Some(value) = args.get(key) else {
        return Ok(Vec::new());
    };
    let list = value.as_array().ok_or_else(|| {
        WorkflowError::validation(format!("'{}' must be an array of strings", key))
    })?;
    list.iter()
        .map(|v| {
            v.as_str().map(|s| s.to_string()).ok_or_else(|| {
                WorkflowError::validation(format!("'{}' must be an array of strings", key))
            })
        })
        .collect()
}

/// Read the optional `entity: {type}` argument.
pub fn entity_spec(args: &Value) -> Result<Option<EntitySpec>, WorkflowError> {
    let Some(value) = args.get("entity") else {
        return Ok(None);
    };
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WorkflowError::validation("'entity.type' is required"))?;
    Ok(Some(EntitySpec {
        kind: kind.to_string(),
    }))
}

/// Read the optional `criteria: [string]` argument.
pub fn criteria_specs(args: &Value) -> Result<Vec<CriterionSpec>, WorkflowError> {
    Ok(optional_string_list(args, "criteria")?
        .into_iter()
        .map(|description| CriterionSpec { description })
        .collect())
}

/// Read the optional `enrichments: [{description, format, options?}]` argument.
pub fn enrichment_specs(args: &Value) -> Result<Vec<EnrichmentSpec>, WorkflowError> {
    let Some(value) = args.get("enrichments") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(value.clone())
        .map_err(|e| WorkflowError::validation(format!("invalid 'enrichments': {}", e)))
}

/// Parse the leading float of a stringified enrichment value.
///
/// Mirrors the permissive parsing the upstream's stringified numbers
/// need: `"12.5M"` parses as 12.5, `"n/a"` does not parse.
pub fn parse_number(input: &str) -> Option<f64> {
    let s = input.trim();
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            saw_digit = true;
        }
    }
    if !saw_digit {
        return None;
    }
    let mut end = i;
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }
    s[..end].parse().ok()
}

/// Truncate free text for prompt assembly.
pub fn truncate_text(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
