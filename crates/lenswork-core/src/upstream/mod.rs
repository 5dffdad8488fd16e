//! Upstream client abstraction
//!
//! The upstream is an external web-search and entity-enrichment API
//! exposing websets, streaming item listings, enrichments, monitors and
//! deep-research jobs. The trait below is the only seam through which
//! workflows reach it; the HTTP implementation lives in
//! lenswork-upstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    Enrichment, EnrichmentFormat, Monitor, ResearchJob, Webset, WebsetItem,
};

/// Upstream error types
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream credentials missing: {0}")]
    MissingCredentials(String),

    #[error("upstream rate limited: {0}")]
    RateLimited(String),

    #[error("upstream request failed ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("upstream server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream decode error: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether a retry by the caller could plausibly succeed.
    ///
    /// The core never retries (see the error-handling policy); this flag
    /// is surfaced on failed tasks so callers can decide.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited(_)
                | UpstreamError::Server { .. }
                | UpstreamError::Transport(_)
        )
    }
}

/// Entity scope of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    #[serde(rename = "type")]
    pub kind: String,
}

/// One verification criterion of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionSpec {
    pub description: String,
}

/// A search to run inside a new webset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSpec {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntitySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CriterionSpec>,
}

/// An enrichment to define on a new webset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentSpec {
    pub description: String,
    pub format: EnrichmentFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Request payload for webset creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebsetRequest {
    pub search: SearchSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichments: Vec<EnrichmentSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Monitor cadence: 5-field cron plus timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorCadence {
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Request payload for monitor creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    pub webset_id: String,
    pub cadence: MonitorCadence,
}

/// Request payload for a deep-research job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// One page of a streaming item listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub items: Vec<WebsetItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One page of the upstream event feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Thin adapter over the search/enrichment/research API.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Create a webset with its initial search and enrichments.
    async fn create_webset(&self, request: CreateWebsetRequest) -> Result<Webset, UpstreamError>;

    /// Fetch a webset's composite status, searches and enrichments.
    async fn get_webset(&self, webset_id: &str) -> Result<Webset, UpstreamError>;

    /// Ask the upstream to stop work on a webset.
    async fn cancel_webset(&self, webset_id: &str) -> Result<Webset, UpstreamError>;

    /// Delete a webset.
    async fn delete_webset(&self, webset_id: &str) -> Result<(), UpstreamError>;

    /// List one page of items.
    async fn list_items(
        &self,
        webset_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ItemPage, UpstreamError>;

    /// Fetch a single item in raw form.
    async fn get_item(&self, webset_id: &str, item_id: &str)
        -> Result<WebsetItem, UpstreamError>;

    /// Define an enrichment on an existing webset.
    async fn create_enrichment(
        &self,
        webset_id: &str,
        spec: EnrichmentSpec,
    ) -> Result<Enrichment, UpstreamError>;

    /// Remove an enrichment definition.
    async fn delete_enrichment(
        &self,
        webset_id: &str,
        enrichment_id: &str,
    ) -> Result<(), UpstreamError>;

    /// Register a recurring refresh on a webset.
    async fn create_monitor(&self, spec: MonitorSpec) -> Result<Monitor, UpstreamError>;

    /// Dispatch a deep-research job.
    async fn create_research(&self, request: ResearchRequest)
        -> Result<ResearchJob, UpstreamError>;

    /// Poll a deep-research job.
    async fn get_research(&self, research_id: &str) -> Result<ResearchJob, UpstreamError>;

    /// List one page of the upstream event feed.
    async fn list_events(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<EventPage, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UpstreamError::RateLimited("429".to_string()).is_transient());
        assert!(UpstreamError::Server {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(UpstreamError::Transport("reset".to_string()).is_transient());
        assert!(!UpstreamError::Request {
            status: 404,
            message: "missing".to_string()
        }
        .is_transient());
        assert!(!UpstreamError::MissingCredentials("WEBSETS_API_KEY".to_string()).is_transient());
    }

    #[test]
    fn test_entity_spec_wire_name() {
        let spec = EntitySpec {
            kind: "company".to_string(),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "company" }));
    }
}
