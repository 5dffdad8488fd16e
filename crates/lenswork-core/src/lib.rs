//! # Lenswork Core
//!
//! Core abstractions and deterministic logic for the Lenswork
//! orchestration layer.
//!
//! This crate contains:
//! - Task / progress / error records and the task state machine
//! - TaskStore / UpstreamClient / Workflow abstractions
//! - Item projection applied at the agent boundary
//! - Dice bigram similarity used for fuzzy entity matching
//!
//! This crate does NOT care about:
//! - How tasks are persisted (see lenswork-stores)
//! - How the upstream is reached (see lenswork-upstream)
//! - Which workflows exist (see lenswork-workflows)

pub mod projection;
pub mod similarity;
pub mod store;
pub mod types;
pub mod upstream;
pub mod workflow;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::projection::{
        bundle_items, project_item, ItemBundle, ProjectedEnrichment, ProjectedEvaluation,
        ProjectedItem,
    };
    pub use crate::similarity::dice_coefficient;
    pub use crate::store::{StoreError, TaskStore};
    pub use crate::types::{
        Enrichment, EnrichmentFormat, EnrichmentStatus, ItemEnrichmentResult, ItemEvaluation,
        Monitor, ResearchJob, ResearchOutput, ResearchStatus, Satisfaction, SearchCriterion,
        SearchProgress, Task, TaskError, TaskId, TaskProgress, TaskStatus, Webset, WebsetItem,
        WebsetSearch, WebsetStatus,
    };
    pub use crate::upstream::{
        CreateWebsetRequest, CriterionSpec, EnrichmentSpec, EntitySpec, EventPage, ItemPage,
        MonitorCadence, MonitorSpec, ResearchRequest, SearchSpec, UpstreamClient, UpstreamError,
    };
    pub use crate::workflow::{Workflow, WorkflowContext, WorkflowError, WorkflowRegistry};
}

// Re-export key types at crate root
pub use projection::{bundle_items, project_item, ItemBundle, ProjectedItem};
pub use similarity::dice_coefficient;
pub use store::{StoreError, TaskStore};
pub use types::{Task, TaskError, TaskId, TaskProgress, TaskStatus, Webset, WebsetItem};
pub use upstream::{UpstreamClient, UpstreamError};
pub use workflow::{Workflow, WorkflowContext, WorkflowError, WorkflowRegistry};
