//! # Lenswork Workflows
//!
//! Built-in workflow collection for the Lenswork runtime.
//!
//! This crate provides:
//! - Shared workflow helpers (step tracking, poll-to-idle, item
//!   collection, argument validation)
//! - The seven built-in workflows:
//!   `lifecycle.harvest`, `convergent.search`, `adversarial.verify`,
//!   `research.deep`, `research.verifiedCollection`, `qd.winnow`,
//!   `semantic.cron`

mod adversarial;
mod convergent;
pub mod cron;
mod harvest;
pub mod helpers;
mod qd;
mod registry;
mod research;

#[cfg(test)]
pub(crate) mod test_support;

pub use adversarial::AdversarialVerify;
pub use convergent::ConvergentSearch;
pub use cron::SemanticCron;
pub use harvest::LifecycleHarvest;
pub use qd::QdWinnow;
pub use registry::builtin_registry;
pub use research::{ResearchDeep, VerifiedCollection};

// Re-export core workflow traits for convenience
pub use lenswork_core::workflow::{Workflow, WorkflowContext, WorkflowError, WorkflowRegistry};
