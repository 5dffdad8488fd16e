//! Semantic-cron configuration model.
//!
//! The caller supplies a runtime-untyped JSON document; after template
//! expansion it is parsed into the tagged records below and validated
//! once. Every downstream stage assumes a well-formed record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lenswork_core::upstream::{EnrichmentSpec, EntitySpec};

/// Declarative composite-signal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque passthrough for caller bookkeeping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Value>,
    #[serde(default)]
    pub lenses: Vec<LensConfig>,
    #[serde(default)]
    pub shapes: Vec<ShapeConfig>,
    #[serde(default)]
    pub join: Option<JoinConfig>,
    #[serde(default)]
    pub signal: Option<SignalConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorConfig>,
}

/// One independent sensor: a new search or a bound existing webset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<LensSearch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichments: Vec<EnrichmentSpec>,
}

/// Search source of a lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensSearch {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntitySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<String>,
}

/// How a shape combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    #[default]
    All,
    Any,
}

/// Item-level predicate over enrichment values, bound to one lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeConfig {
    pub lens_id: String,
    #[serde(default)]
    pub combine: CombineMode,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

/// Condition operators over stringified enrichment values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    Exists,
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Contains,
    Matches,
    OneOf,
    WithinDays,
}

/// One condition: `enrichment <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    /// Enrichment referenced by its natural-language description
    pub enrichment: String,
    pub op: ConditionOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Cross-lens join selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    Entity,
    #[serde(rename = "entity+temporal")]
    EntityTemporal,
    Temporal,
    Cooccurrence,
}

/// Temporal proximity window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalWindow {
    pub days: f64,
}

impl TemporalWindow {
    /// Window width in milliseconds.
    pub fn millis(&self) -> f64 {
        self.days * 86_400_000.0
    }
}

/// Join rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinConfig {
    pub by: JoinMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_lens_overlap: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalWindow>,
}

pub const DEFAULT_NAME_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MIN_LENS_OVERLAP: usize = 2;
pub const DEFAULT_THRESHOLD_MIN: usize = 2;

impl JoinConfig {
    pub fn name_threshold(&self) -> f64 {
        self.name_threshold.unwrap_or(DEFAULT_NAME_THRESHOLD)
    }

    pub fn min_lens_overlap(&self) -> usize {
        self.min_lens_overlap.unwrap_or(DEFAULT_MIN_LENS_OVERLAP)
    }
}

/// Signal rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalRuleType {
    All,
    Any,
    Threshold,
    Combination,
}

/// The signal rule evaluated over joined evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRule {
    #[serde(rename = "type")]
    pub rule: SignalRuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sufficient: Option<Vec<Vec<String>>>,
}

impl SignalRule {
    pub fn min(&self) -> usize {
        self.min.unwrap_or(DEFAULT_THRESHOLD_MIN)
    }
}

/// Signal configuration wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalConfig {
    pub requires: SignalRule,
}

/// Monitor cadence for recurring re-evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// 5-field cron expression
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl CronConfig {
    /// Declared lens ids, in declaration order.
    pub fn lens_ids(&self) -> Vec<String> {
        self.lenses.iter().map(|l| l.id.clone()).collect()
    }

    /// Structural validation; collects every problem into one message.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors: Vec<String> = Vec::new();

        if self.lenses.is_empty() {
            errors.push("config declares no lenses".to_string());
        }
        let ids = self.lens_ids();
        for lens in &self.lenses {
            if lens.id.trim().is_empty() {
                errors.push("lens id must not be empty".to_string());
            }
            if lens.webset_id.is_none() && lens.search.is_none() {
                errors.push(format!(
                    "lens '{}' needs either 'websetId' or 'search'",
                    lens.id
                ));
            }
            if ids.iter().filter(|id| **id == lens.id).count() > 1 {
                errors.push(format!("duplicate lens id '{}'", lens.id));
            }
        }
        errors.dedup();

        if self.shapes.is_empty() {
            errors.push("config declares no shapes".to_string());
        }
        for shape in &self.shapes {
            if !ids.contains(&shape.lens_id) {
                errors.push(format!("shape references unknown lens '{}'", shape.lens_id));
            }
            if shape.conditions.is_empty() {
                errors.push(format!("shape for lens '{}' has no conditions", shape.lens_id));
            }
            for condition in &shape.conditions {
                validate_condition(condition, &mut errors);
            }
        }

        match &self.join {
            None => errors.push("config is missing 'join'".to_string()),
            Some(join) => {
                if matches!(join.by, JoinMode::EntityTemporal | JoinMode::Temporal)
                    && join.temporal.is_none()
                {
                    errors.push(format!(
                        "join mode '{}' requires a 'temporal' window",
                        match join.by {
                            JoinMode::EntityTemporal => "entity+temporal",
                            _ => "temporal",
                        }
                    ));
                }
                if let Some(window) = &join.temporal {
                    if window.days <= 0.0 {
                        errors.push("'temporal.days' must be positive".to_string());
                    }
                }
            }
        }

        match &self.signal {
            None => errors.push("config is missing 'signal'".to_string()),
            Some(signal) => validate_signal(&signal.requires, &ids, &mut errors),
        }

        if let Some(monitor) = &self.monitor {
            if monitor.cron.split_whitespace().count() != 5 {
                errors.push(format!(
                    "monitor cron '{}' must have 5 fields (minute hour day month weekday)",
                    monitor.cron
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

fn validate_condition(condition: &ConditionConfig, errors: &mut Vec<String>) {
    if condition.enrichment.trim().is_empty() {
        errors.push("condition enrichment must not be empty".to_string());
    }
    match condition.op {
        ConditionOp::Exists => {}
        ConditionOp::OneOf => match condition.value.as_ref().and_then(|v| v.as_array()) {
            Some(list) if !list.is_empty() && list.iter().all(|v| v.is_string()) => {}
            _ => errors.push(format!(
                "'oneOf' condition on '{}' needs a non-empty array of strings",
                condition.enrichment
            )),
        },
        ConditionOp::WithinDays => {
            if condition.value.as_ref().and_then(|v| v.as_f64()).is_none() {
                errors.push(format!(
                    "'withinDays' condition on '{}' needs a numeric value",
                    condition.enrichment
                ));
            }
        }
        ConditionOp::Gte | ConditionOp::Gt | ConditionOp::Lte | ConditionOp::Lt | ConditionOp::Eq => {
            let numeric = match condition.value.as_ref() {
                Some(Value::Number(_)) => true,
                Some(Value::String(s)) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            };
            if !numeric {
                errors.push(format!(
                    "numeric condition on '{}' needs a numeric value",
                    condition.enrichment
                ));
            }
        }
        ConditionOp::Contains | ConditionOp::Matches => {
            if condition
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .map_or(true, |s| s.is_empty())
            {
                errors.push(format!(
                    "condition on '{}' needs a non-empty string value",
                    condition.enrichment
                ));
            }
        }
    }
}

fn validate_signal(rule: &SignalRule, lens_ids: &[String], errors: &mut Vec<String>) {
    match rule.rule {
        SignalRuleType::Threshold => {
            if rule.min() == 0 {
                errors.push("'threshold' signal min must be at least 1".to_string());
            }
        }
        SignalRuleType::Combination => match &rule.sufficient {
            None => errors.push("'combination' signal needs 'sufficient' sets".to_string()),
            Some(sets) if sets.is_empty() => {
                errors.push("'combination' signal needs at least one sufficient set".to_string())
            }
            Some(sets) => {
                for set in sets {
                    for lens_id in set {
                        if !lens_ids.contains(lens_id) {
                            errors.push(format!(
                                "signal combination references unknown lens '{}'",
                                lens_id
                            ));
                        }
                    }
                }
            }
        },
        SignalRuleType::All | SignalRuleType::Any => {}
    }
}
