//! Shape evaluation: does an item "count" within its lens?
//!
//! Enrichment results arrive keyed by opaque enrichment ids; shapes
//! reference them by natural-language description. The resolver re-keys
//! each item's results, then the compiled shapes evaluate their
//! conditions against the first result string.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use lenswork_core::types::{EnrichmentFormat, EnrichmentStatus, WebsetItem};

use super::config::{CombineMode, ConditionConfig, ConditionOp, ShapeConfig};
use crate::helpers::parse_number;

/// One enrichment value, re-keyed by description.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentValue {
    pub format: EnrichmentFormat,
    pub result: Vec<String>,
}

impl EnrichmentValue {
    pub fn first(&self) -> Option<&str> {
        self.result.first().map(String::as_str)
    }
}

/// Re-key an item's completed enrichment results by description.
///
/// Pending and cancelled enrichments carry no value, so conditions over
/// them behave as "missing".
pub fn resolve_enrichments(
    item: &WebsetItem,
    descriptions: &HashMap<String, String>,
) -> HashMap<String, EnrichmentValue> {
    let mut values = HashMap::new();
    for result in &item.enrichments {
        if result.status != EnrichmentStatus::Completed {
            continue;
        }
        let Some(result_strings) = &result.result else {
            continue;
        };
        let description = descriptions
            .get(&result.enrichment_id)
            .cloned()
            .unwrap_or_else(|| result.enrichment_id.clone());
        values.insert(
            description,
            EnrichmentValue {
                format: result.format,
                result: result_strings.clone(),
            },
        );
    }
    values
}

#[derive(Debug)]
struct CompiledCondition {
    enrichment: String,
    op: ConditionOp,
    value: Option<Value>,
    regex: Option<Regex>,
}

#[derive(Debug)]
struct CompiledShape {
    combine: CombineMode,
    conditions: Vec<CompiledCondition>,
    label: String,
}

/// Shapes grouped by lens, with `matches` patterns compiled up front.
#[derive(Debug)]
pub struct ShapeEvaluator {
    by_lens: HashMap<String, Vec<CompiledShape>>,
}

impl ShapeEvaluator {
    /// Compile all shapes; invalid regex patterns are validation errors.
    pub fn compile(shapes: &[ShapeConfig]) -> Result<Self, String> {
        let mut by_lens: HashMap<String, Vec<CompiledShape>> = HashMap::new();
        for shape in shapes {
            let mut conditions = Vec::with_capacity(shape.conditions.len());
            for condition in &shape.conditions {
                let regex = if condition.op == ConditionOp::Matches {
                    let pattern = condition
                        .value
                        .as_ref()
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    Some(Regex::new(pattern).map_err(|e| {
                        format!(
                            "invalid 'matches' pattern on '{}': {}",
                            condition.enrichment, e
                        )
                    })?)
                } else {
                    None
                };
                conditions.push(CompiledCondition {
                    enrichment: condition.enrichment.clone(),
                    op: condition.op,
                    value: condition.value.clone(),
                    regex,
                });
            }
            by_lens
                .entry(shape.lens_id.clone())
                .or_default()
                .push(CompiledShape {
                    combine: shape.combine,
                    label: shape_label(shape),
                    conditions,
                });
        }
        Ok(Self { by_lens })
    }

    /// Whether an item's resolved values pass any of the lens's shapes.
    ///
    /// A lens with no shapes accepts every item.
    pub fn is_shaped(&self, lens_id: &str, values: &HashMap<String, EnrichmentValue>) -> bool {
        let Some(shapes) = self.by_lens.get(lens_id) else {
            return true;
        };
        shapes.iter().any(|shape| {
            let mut results = shape.conditions.iter().map(|c| eval_condition(c, values));
            match shape.combine {
                CombineMode::All => results.all(|r| r),
                CombineMode::Any => results.any(|r| r),
            }
        })
    }

    /// Human-readable labels of the shapes bound to a lens.
    pub fn labels(&self, lens_id: &str) -> Vec<String> {
        self.by_lens
            .get(lens_id)
            .map(|shapes| shapes.iter().map(|s| s.label.clone()).collect())
            .unwrap_or_default()
    }
}

fn shape_label(shape: &ShapeConfig) -> String {
    let conditions: Vec<String> = shape
        .conditions
        .iter()
        .map(|c| {
            let op = match c.op {
                ConditionOp::Exists => "exists",
                ConditionOp::Gte => "gte",
                ConditionOp::Gt => "gt",
                ConditionOp::Lte => "lte",
                ConditionOp::Lt => "lt",
                ConditionOp::Eq => "eq",
                ConditionOp::Contains => "contains",
                ConditionOp::Matches => "matches",
                ConditionOp::OneOf => "oneOf",
                ConditionOp::WithinDays => "withinDays",
            };
            match &c.value {
                Some(value) => format!("{} {} {}", c.enrichment, op, value),
                None => format!("{} {}", c.enrichment, op),
            }
        })
        .collect();
    let combine = match shape.combine {
        CombineMode::All => "all",
        CombineMode::Any => "any",
    };
    format!("{}({})", combine, conditions.join(", "))
}

fn eval_condition(
    condition: &CompiledCondition,
    values: &HashMap<String, EnrichmentValue>,
) -> bool {
    let first = values
        .get(&condition.enrichment)
        .and_then(|v| v.first())
        .map(str::trim);

    // missing or empty fails everything except `exists`, which reports it
    let Some(first) = first.filter(|s| !s.is_empty()) else {
        return false;
    };

    match condition.op {
        ConditionOp::Exists => true,
        ConditionOp::Gte | ConditionOp::Gt | ConditionOp::Lte | ConditionOp::Lt
        | ConditionOp::Eq => {
            let Some(actual) = parse_number(first) else {
                return false;
            };
            let Some(expected) = expected_number(condition.value.as_ref()) else {
                return false;
            };
            match condition.op {
                ConditionOp::Gte => actual >= expected,
                ConditionOp::Gt => actual > expected,
                ConditionOp::Lte => actual <= expected,
                ConditionOp::Lt => actual < expected,
                _ => (actual - expected).abs() < 1e-9,
            }
        }
        ConditionOp::Contains => condition
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .map(|needle| first.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        ConditionOp::Matches => condition
            .regex
            .as_ref()
            .map(|re| re.is_match(first))
            .unwrap_or(false),
        ConditionOp::OneOf => condition
            .value
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|options| {
                options
                    .iter()
                    .filter_map(|v| v.as_str())
                    .any(|option| option.eq_ignore_ascii_case(first))
            })
            .unwrap_or(false),
        ConditionOp::WithinDays => {
            let Some(timestamp) = parse_flexible_date(first) else {
                return false;
            };
            let Some(days) = condition.value.as_ref().and_then(|v| v.as_f64()) else {
                return false;
            };
            let elapsed_ms = (Utc::now() - timestamp).num_milliseconds().abs() as f64;
            elapsed_ms <= days * 86_400_000.0
        }
    }
}

fn expected_number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_number(s),
        _ => None,
    }
}

/// Parse the date formats enrichments actually produce.
fn parse_flexible_date(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Utc
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .single();
    }
    None
}
