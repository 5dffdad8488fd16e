//! Shared mock upstream for workflow tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use lenswork_core::store::TaskStore;
use lenswork_core::types::{
    Enrichment, Monitor, MonitorStatus, ResearchJob, ResearchOutput, ResearchStatus,
    SearchCriterion, SearchProgress, Webset, WebsetItem, WebsetSearch, WebsetStatus,
};
use lenswork_core::upstream::{
    CreateWebsetRequest, EnrichmentSpec, EventPage, ItemPage, MonitorSpec, ResearchRequest,
    UpstreamClient, UpstreamError,
};
use lenswork_core::workflow::WorkflowContext;
use lenswork_stores::InMemoryTaskStore;

#[derive(Default)]
struct MockState {
    websets: HashMap<String, Webset>,
    items: HashMap<String, Vec<WebsetItem>>,
    polls_remaining: HashMap<String, usize>,
    queued_items: VecDeque<Vec<WebsetItem>>,
    default_polls: usize,
    stay_running: bool,
    fail_research: bool,
    fail_monitors: bool,
    research_output: Option<ResearchOutput>,
    research_jobs: HashMap<String, ResearchJob>,
    created: usize,
    research_created: usize,
    monitors_created: usize,
    create_requests: Vec<CreateWebsetRequest>,
    cancel_calls: Vec<String>,
    delete_calls: Vec<String>,
    monitor_calls: Vec<MonitorSpec>,
    research_requests: Vec<ResearchRequest>,
}

/// Scriptable in-memory upstream.
pub(crate) struct MockUpstream {
    state: Mutex<MockState>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Websets never leave `running` (deadline tests).
    pub fn stay_running(self) -> Self {
        self.state.lock().unwrap().stay_running = true;
        self
    }

    /// Created websets report `running` for `n` polls before going idle.
    pub fn polls_until_idle(self, n: usize) -> Self {
        self.state.lock().unwrap().default_polls = n;
        self
    }

    /// Items handed to the next created webset (FIFO per creation).
    pub fn queue_items(self, items: Vec<WebsetItem>) -> Self {
        self.state.lock().unwrap().queued_items.push_back(items);
        self
    }

    /// Canned output for completed research jobs.
    pub fn research_output(self, output: ResearchOutput) -> Self {
        self.state.lock().unwrap().research_output = Some(output);
        self
    }

    pub fn fail_research(self) -> Self {
        self.state.lock().unwrap().fail_research = true;
        self
    }

    pub fn fail_monitors(self) -> Self {
        self.state.lock().unwrap().fail_monitors = true;
        self
    }

    /// Seed a pre-existing webset with its items.
    pub fn insert_webset(self, webset: Webset, items: Vec<WebsetItem>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.items.insert(webset.id.clone(), items);
            state.websets.insert(webset.id.clone(), webset);
        }
        self
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().cancel_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().delete_calls.clone()
    }

    pub fn monitor_calls(&self) -> Vec<MonitorSpec> {
        self.state.lock().unwrap().monitor_calls.clone()
    }

    pub fn research_requests(&self) -> Vec<ResearchRequest> {
        self.state.lock().unwrap().research_requests.clone()
    }

    pub fn create_requests(&self) -> Vec<CreateWebsetRequest> {
        self.state.lock().unwrap().create_requests.clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn create_webset(&self, request: CreateWebsetRequest) -> Result<Webset, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        let id = format!("ws_{}", state.created);
        let items = state.queued_items.pop_front().unwrap_or_default();
        let enrichments = request
            .enrichments
            .iter()
            .enumerate()
            .map(|(i, spec)| Enrichment {
                id: format!("enr_{}", i + 1),
                description: spec.description.clone(),
                format: spec.format,
            })
            .collect();
        let webset = Webset {
            id: id.clone(),
            status: WebsetStatus::Running,
            searches: vec![WebsetSearch {
                id: format!("{}_search", id),
                query: request.search.query.clone(),
                status: None,
                progress: SearchProgress {
                    found: items.len() as u64,
                    analyzed: (items.len() as u64) * 2,
                    completion: 0.0,
                    time_left: None,
                },
                criteria: request
                    .search
                    .criteria
                    .iter()
                    .map(|c| SearchCriterion {
                        description: c.description.clone(),
                        success_rate: None,
                    })
                    .collect(),
            }],
            enrichments,
            monitors: Vec::new(),
        };
        let polls = state.default_polls;
        state.polls_remaining.insert(id.clone(), polls);
        state.items.insert(id.clone(), items);
        state.websets.insert(id.clone(), webset.clone());
        state.create_requests.push(request);
        Ok(webset)
    }

    async fn get_webset(&self, webset_id: &str) -> Result<Webset, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if !state.websets.contains_key(webset_id) {
            return Err(UpstreamError::Request {
                status: 404,
                message: format!("webset {} not found", webset_id),
            });
        }
        if !state.stay_running {
            let still_working = {
                let remaining = state
                    .polls_remaining
                    .entry(webset_id.to_string())
                    .or_insert(0);
                if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            };
            if !still_working {
                if let Some(webset) = state.websets.get_mut(webset_id) {
                    if webset.status == WebsetStatus::Running
                        || webset.status == WebsetStatus::Pending
                    {
                        webset.status = WebsetStatus::Idle;
                        if let Some(search) = webset.searches.last_mut() {
                            search.progress.completion = 100.0;
                        }
                    }
                }
            }
        }
        Ok(state.websets[webset_id].clone())
    }

    async fn cancel_webset(&self, webset_id: &str) -> Result<Webset, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls.push(webset_id.to_string());
        let webset = state
            .websets
            .get_mut(webset_id)
            .ok_or_else(|| UpstreamError::Request {
                status: 404,
                message: format!("webset {} not found", webset_id),
            })?;
        webset.status = WebsetStatus::Idle;
        Ok(webset.clone())
    }

    async fn delete_webset(&self, webset_id: &str) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls.push(webset_id.to_string());
        state.websets.remove(webset_id);
        state.items.remove(webset_id);
        Ok(())
    }

    async fn list_items(
        &self,
        webset_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ItemPage, UpstreamError> {
        let state = self.state.lock().unwrap();
        let items = state.items.get(webset_id).cloned().unwrap_or_default();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + limit).min(items.len());
        let page: Vec<WebsetItem> = items[offset.min(items.len())..end].to_vec();
        let next_cursor = if end < items.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(ItemPage {
            items: page,
            next_cursor,
        })
    }

    async fn get_item(
        &self,
        webset_id: &str,
        item_id: &str,
    ) -> Result<WebsetItem, UpstreamError> {
        let state = self.state.lock().unwrap();
        state
            .items
            .get(webset_id)
            .and_then(|items| items.iter().find(|i| i.id == item_id))
            .cloned()
            .ok_or_else(|| UpstreamError::Request {
                status: 404,
                message: format!("item {} not found", item_id),
            })
    }

    async fn create_enrichment(
        &self,
        webset_id: &str,
        spec: EnrichmentSpec,
    ) -> Result<Enrichment, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        let webset = state
            .websets
            .get_mut(webset_id)
            .ok_or_else(|| UpstreamError::Request {
                status: 404,
                message: format!("webset {} not found", webset_id),
            })?;
        let enrichment = Enrichment {
            id: format!("enr_{}", webset.enrichments.len() + 1),
            description: spec.description,
            format: spec.format,
        };
        webset.enrichments.push(enrichment.clone());
        Ok(enrichment)
    }

    async fn delete_enrichment(
        &self,
        webset_id: &str,
        enrichment_id: &str,
    ) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if let Some(webset) = state.websets.get_mut(webset_id) {
            webset.enrichments.retain(|e| e.id != enrichment_id);
        }
        Ok(())
    }

    async fn create_monitor(&self, spec: MonitorSpec) -> Result<Monitor, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_monitors {
            return Err(UpstreamError::Server {
                status: 500,
                message: "monitor backend unavailable".to_string(),
            });
        }
        state.monitors_created += 1;
        let monitor = Monitor {
            id: format!("mon_{}", state.monitors_created),
            webset_id: spec.webset_id.clone(),
            cron: spec.cadence.cron.clone(),
            timezone: spec.cadence.timezone.clone(),
            status: Some(MonitorStatus::Enabled),
        };
        state.monitor_calls.push(spec);
        Ok(monitor)
    }

    async fn create_research(
        &self,
        request: ResearchRequest,
    ) -> Result<ResearchJob, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_research {
            return Err(UpstreamError::Server {
                status: 500,
                message: "research backend unavailable".to_string(),
            });
        }
        state.research_created += 1;
        let id = format!("res_{}", state.research_created);
        let job = ResearchJob {
            id: id.clone(),
            status: ResearchStatus::Pending,
            instructions: Some(request.instructions.clone()),
            model: Some("research-pro".to_string()),
            output: None,
        };
        state.research_jobs.insert(id, job.clone());
        state.research_requests.push(request);
        Ok(job)
    }

    async fn get_research(&self, research_id: &str) -> Result<ResearchJob, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        let output = state
            .research_output
            .clone()
            .unwrap_or_else(|| ResearchOutput {
                content: Some("synthesis".to_string()),
                parsed: None,
            });
        let job = state
            .research_jobs
            .get_mut(research_id)
            .ok_or_else(|| UpstreamError::Request {
                status: 404,
                message: format!("research {} not found", research_id),
            })?;
        job.status = ResearchStatus::Completed;
        job.output = Some(output);
        Ok(job.clone())
    }

    async fn list_events(
        &self,
        _cursor: Option<&str>,
        _limit: usize,
    ) -> Result<EventPage, UpstreamError> {
        Ok(EventPage {
            events: Vec::new(),
            next_cursor: None,
        })
    }
}

/// Build a company item with the given identity.
pub(crate) fn company_item(id: &str, name: &str, url: &str) -> WebsetItem {
    WebsetItem {
        id: id.to_string(),
        source: None,
        created_at: None,
        properties: json!({
            "type": "company",
            "url": url,
            "description": format!("{} description", name),
            "company": { "name": name }
        }),
        evaluations: Vec::new(),
        enrichments: Vec::new(),
    }
}

/// Create a store, a task, and a workflow context wired to the mock.
pub(crate) async fn test_context(
    upstream: Arc<MockUpstream>,
) -> (WorkflowContext, Arc<InMemoryTaskStore>) {
    let store = Arc::new(InMemoryTaskStore::new());
    let task = store
        .create("test.workflow", json!({}))
        .await
        .expect("task create");
    let ctx = WorkflowContext::new(task.id, store.clone(), upstream);
    (ctx, store)
}
