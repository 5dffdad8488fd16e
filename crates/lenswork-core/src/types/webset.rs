//! Upstream dataset types
//!
//! A webset is an externally stored, stateful dataset of search results
//! with attached enrichments and monitors. The system references websets
//! by id and never owns their storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Composite webset lifecycle state as reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebsetStatus {
    Pending,
    Running,
    Idle,
    Paused,
}

/// Search progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchProgress {
    /// Items found so far
    #[serde(default)]
    pub found: u64,
    /// Items analyzed against the criteria so far
    #[serde(default)]
    pub analyzed: u64,
    /// Completion percentage in [0, 100]
    #[serde(default)]
    pub completion: f64,
    /// Upstream's remaining-time estimate in seconds, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<u64>,
}

/// One verification criterion attached to a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriterion {
    pub description: String,
    /// Live percentage of analyzed items satisfying the criterion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
}

/// A search running inside a webset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsetSearch {
    pub id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: SearchProgress,
    #[serde(default)]
    pub criteria: Vec<SearchCriterion>,
}

/// Result format of an enrichment definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentFormat {
    Text,
    Number,
    Options,
    Date,
    Email,
    Phone,
    Url,
}

/// An enrichment definition attached to a webset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub id: String,
    pub description: String,
    pub format: EnrichmentFormat,
}

/// Monitor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Enabled,
    Disabled,
}

/// A recurring refresh attached to a webset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: String,
    pub webset_id: String,
    /// 5-field cron expression
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MonitorStatus>,
}

/// The webset record as fetched from the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webset {
    pub id: String,
    pub status: WebsetStatus,
    #[serde(default)]
    pub searches: Vec<WebsetSearch>,
    #[serde(default)]
    pub enrichments: Vec<Enrichment>,
    #[serde(default)]
    pub monitors: Vec<Monitor>,
}

impl Webset {
    /// The most recently appended search, if any.
    pub fn last_search(&self) -> Option<&WebsetSearch> {
        self.searches.last()
    }
}

/// Verdict of one criterion evaluation on one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Satisfaction {
    Yes,
    No,
    Unclear,
}

/// One criterion evaluation attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEvaluation {
    pub criterion: String,
    pub satisfied: Satisfaction,
}

/// Completion state of an enrichment result on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Completed,
    Canceled,
}

/// One enrichment result attached to an item.
///
/// Results arrive as stringified values regardless of format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEnrichmentResult {
    pub enrichment_id: String,
    pub format: EnrichmentFormat,
    pub status: EnrichmentStatus,
    #[serde(default)]
    pub result: Option<Vec<String>>,
}

impl ItemEnrichmentResult {
    /// First result string, when the enrichment completed with a value.
    pub fn first_result(&self) -> Option<&str> {
        self.result
            .as_deref()
            .and_then(|r| r.first())
            .map(String::as_str)
    }
}

/// One item inside a webset.
///
/// `properties` is the upstream's entity-type-specific bag; the accessors
/// below encode the extraction precedence used everywhere in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsetItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub evaluations: Vec<ItemEvaluation>,
    #[serde(default)]
    pub enrichments: Vec<ItemEnrichmentResult>,
}

impl WebsetItem {
    /// Entity display name.
    ///
    /// Precedence: company.name → person.name → article.title →
    /// researchPaper.title → custom.title → description → "unknown".
    pub fn entity_name(&self) -> String {
        let p = &self.properties;
        let candidates = [
            p.pointer("/company/name"),
            p.pointer("/person/name"),
            p.pointer("/article/title"),
            p.pointer("/researchPaper/title"),
            p.pointer("/custom/title"),
            p.get("description"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(s) = candidate.as_str() {
                if !s.trim().is_empty() {
                    return s.to_string();
                }
            }
        }
        "unknown".to_string()
    }

    /// Canonical URL of the item, when present.
    pub fn url(&self) -> Option<&str> {
        self.properties.get("url").and_then(|v| v.as_str())
    }

    /// Short description, when present.
    pub fn description(&self) -> Option<&str> {
        self.properties.get("description").and_then(|v| v.as_str())
    }

    /// Entity type tag (company / person / article / ...), when present.
    pub fn entity_type(&self) -> Option<&str> {
        self.properties.get("type").and_then(|v| v.as_str())
    }

    /// Permissive evaluation filter: items with evaluations must have at
    /// least one `yes`; items with no evaluations pass.
    pub fn has_satisfied_evaluation(&self) -> bool {
        self.evaluations.is_empty()
            || self
                .evaluations
                .iter()
                .any(|e| e.satisfied == Satisfaction::Yes)
    }
}
