//! Built-in workflow registration.

use std::sync::Arc;

use lenswork_core::workflow::WorkflowRegistry;

use crate::adversarial::AdversarialVerify;
use crate::convergent::ConvergentSearch;
use crate::cron::SemanticCron;
use crate::harvest::LifecycleHarvest;
use crate::qd::QdWinnow;
use crate::research::{ResearchDeep, VerifiedCollection};

/// Build the registry of built-in workflows.
///
/// Called once at startup; the registry is immutable afterwards.
pub fn builtin_registry() -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register(Arc::new(LifecycleHarvest));
    registry.register(Arc::new(ConvergentSearch));
    registry.register(Arc::new(AdversarialVerify));
    registry.register(Arc::new(ResearchDeep));
    registry.register(Arc::new(VerifiedCollection));
    registry.register(Arc::new(QdWinnow));
    registry.register(Arc::new(SemanticCron));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_workflows_registered() {
        let registry = builtin_registry();
        assert_eq!(
            registry.names(),
            vec![
                "adversarial.verify",
                "convergent.search",
                "lifecycle.harvest",
                "qd.winnow",
                "research.deep",
                "research.verifiedCollection",
                "semantic.cron",
            ]
        );
    }
}
