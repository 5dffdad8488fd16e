//! HTTP client for the websets API.
//!
//! Credentials and endpoint come from `WEBSETS_API_KEY` /
//! `WEBSETS_API_URL` unless set explicitly. The core never retries
//! upstream failures; transient errors are classified and surfaced.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use lenswork_core::types::{Enrichment, Monitor, ResearchJob, Webset, WebsetItem};
use lenswork_core::upstream::{
    CreateWebsetRequest, EnrichmentSpec, EventPage, ItemPage, MonitorSpec, ResearchRequest,
    UpstreamClient, UpstreamError,
};

const API_KEY_ENV: &str = "WEBSETS_API_KEY";
const API_URL_ENV: &str = "WEBSETS_API_URL";
const DEFAULT_ENDPOINT: &str = "https://api.websets.dev/v0";

/// HTTP upstream configuration.
#[derive(Debug, Clone)]
pub struct HttpUpstreamConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base endpoint URL.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpUpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl HttpUpstreamConfig {
    /// Build configuration from the environment.
    pub fn from_env() -> Result<Self, UpstreamError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| UpstreamError::MissingCredentials(API_KEY_ENV.to_string()))?;
        let endpoint =
            std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Ok(Self {
            api_key,
            endpoint,
            ..Self::default()
        })
    }
}

/// HTTP upstream client.
#[derive(Debug)]
pub struct HttpUpstream {
    client: reqwest::Client,
    config: HttpUpstreamConfig,
}

impl HttpUpstream {
    /// Create a new client.
    pub fn new(config: HttpUpstreamConfig) -> Result<Self, UpstreamError> {
        if config.api_key.trim().is_empty() {
            return Err(UpstreamError::MissingCredentials(API_KEY_ENV.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create a new client from the environment.
    pub fn from_env() -> Result<Self, UpstreamError> {
        Self::new(HttpUpstreamConfig::from_env()?)
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&self.config.api_key) {
            headers.insert("x-api-key", value);
        }
        headers
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(self.build_url(path))
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .post(self.build_url(path))
            .headers(self.headers())
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        decode(response).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let response = self
            .client
            .post(self.build_url(path))
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), UpstreamError> {
        let response = self
            .client
            .delete(self.build_url(path))
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        expect_success(response).await
    }
}

// Paged listing responses

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListItemsResponse {
    #[serde(default)]
    data: Vec<WebsetItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

fn paged_query(cursor: Option<&str>, limit: usize) -> String {
    match cursor {
        Some(cursor) => format!("?limit={}&cursor={}", limit, cursor),
        None => format!("?limit={}", limit),
    }
}

fn map_status(status: u16, message: String) -> UpstreamError {
    let message = if message.trim().is_empty() {
        "(empty response body)".to_string()
    } else {
        message
    };
    match status {
        429 => UpstreamError::RateLimited(message),
        s if s >= 500 => UpstreamError::Server { status: s, message },
        s => UpstreamError::Request { status: s, message },
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(map_status(status.as_u16(), message))
    }
}

async fn expect_success(response: reqwest::Response) -> Result<(), UpstreamError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(map_status(status.as_u16(), message))
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn create_webset(&self, request: CreateWebsetRequest) -> Result<Webset, UpstreamError> {
        tracing::debug!(query = %request.search.query, "creating webset");
        self.post_json("websets", &request).await
    }

    async fn get_webset(&self, webset_id: &str) -> Result<Webset, UpstreamError> {
        self.get_json(&format!("websets/{}", webset_id)).await
    }

    async fn cancel_webset(&self, webset_id: &str) -> Result<Webset, UpstreamError> {
        tracing::debug!(webset_id, "cancelling webset");
        self.post_empty(&format!("websets/{}/cancel", webset_id))
            .await
    }

    async fn delete_webset(&self, webset_id: &str) -> Result<(), UpstreamError> {
        self.delete(&format!("websets/{}", webset_id)).await
    }

    async fn list_items(
        &self,
        webset_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ItemPage, UpstreamError> {
        let path = format!("websets/{}/items{}", webset_id, paged_query(cursor, limit));
        let response: ListItemsResponse = self.get_json(&path).await?;
        Ok(ItemPage {
            items: response.data,
            next_cursor: response.next_cursor,
        })
    }

    async fn get_item(
        &self,
        webset_id: &str,
        item_id: &str,
    ) -> Result<WebsetItem, UpstreamError> {
        self.get_json(&format!("websets/{}/items/{}", webset_id, item_id))
            .await
    }

    async fn create_enrichment(
        &self,
        webset_id: &str,
        spec: EnrichmentSpec,
    ) -> Result<Enrichment, UpstreamError> {
        self.post_json(&format!("websets/{}/enrichments", webset_id), &spec)
            .await
    }

    async fn delete_enrichment(
        &self,
        webset_id: &str,
        enrichment_id: &str,
    ) -> Result<(), UpstreamError> {
        self.delete(&format!(
            "websets/{}/enrichments/{}",
            webset_id, enrichment_id
        ))
        .await
    }

    async fn create_monitor(&self, spec: MonitorSpec) -> Result<Monitor, UpstreamError> {
        self.post_json("monitors", &spec).await
    }

    async fn create_research(
        &self,
        request: ResearchRequest,
    ) -> Result<ResearchJob, UpstreamError> {
        tracing::debug!("dispatching research job");
        self.post_json("research", &request).await
    }

    async fn get_research(&self, research_id: &str) -> Result<ResearchJob, UpstreamError> {
        self.get_json(&format!("research/{}", research_id)).await
    }

    async fn list_events(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<EventPage, UpstreamError> {
        let path = format!("events{}", paged_query(cursor, limit));
        let response: ListEventsResponse = self.get_json(&path).await?;
        Ok(EventPage {
            events: response.data,
            next_cursor: response.next_cursor,
        })
    }
}
