//! Type definitions for tasks and upstream resources.

mod research;
mod task;
mod webset;

pub use research::{ResearchJob, ResearchOutput, ResearchStatus};
pub use task::{new_task_id, Task, TaskError, TaskId, TaskProgress, TaskStatus};
pub use webset::{
    Enrichment, EnrichmentFormat, EnrichmentStatus, ItemEnrichmentResult, ItemEvaluation, Monitor,
    MonitorStatus, Satisfaction, SearchCriterion, SearchProgress, Webset, WebsetItem, WebsetSearch,
    WebsetStatus,
};
