//! Signal evaluation over joined evidence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::config::{JoinMode, SignalRule, SignalRuleType};
use super::join::{JoinOutcome, JoinedEntity};

/// The composite boolean output of a semantic cron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalOutcome {
    pub fired: bool,
    /// The rule type that decided the signal
    pub rule: SignalRuleType,
    /// Lens ids that contributed evidence
    pub satisfied_by: Vec<String>,
    /// The sufficient set that matched, for combination rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_combination: Option<Vec<String>>,
    /// Canonical names of matching entities (entity modes only)
    pub entities: Vec<String>,
}

fn entity_satisfies(entity: &JoinedEntity, rule: &SignalRule, declared: &[String]) -> bool {
    match rule.rule {
        SignalRuleType::All => declared
            .iter()
            .all(|lens| entity.present_in_lenses.contains(lens)),
        SignalRuleType::Any => !entity.present_in_lenses.is_empty(),
        SignalRuleType::Threshold => entity.present_in_lenses.len() >= rule.min(),
        SignalRuleType::Combination => rule
            .sufficient
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|set| set.iter().all(|lens| entity.present_in_lenses.contains(lens))),
    }
}

fn evidence_satisfies(
    evidence: &BTreeSet<String>,
    rule: &SignalRule,
    declared: &[String],
) -> (bool, Option<Vec<String>>) {
    match rule.rule {
        SignalRuleType::All => (declared.iter().all(|lens| evidence.contains(lens)), None),
        SignalRuleType::Any => (!evidence.is_empty(), None),
        SignalRuleType::Threshold => (evidence.len() >= rule.min(), None),
        SignalRuleType::Combination => {
            let matched = rule
                .sufficient
                .as_deref()
                .unwrap_or_default()
                .iter()
                .find(|set| set.iter().all(|lens| evidence.contains(lens)))
                .cloned();
            (matched.is_some(), matched)
        }
    }
}

/// Evaluate the signal rule over a join outcome.
///
/// Entity joins evaluate per-entity and fire when any entity matches;
/// identity-free joins evaluate the lens-evidence set directly.
pub fn evaluate_signal(
    rule: &SignalRule,
    declared: &[String],
    outcome: &JoinOutcome,
) -> SignalOutcome {
    match outcome.mode {
        JoinMode::Entity | JoinMode::EntityTemporal => {
            let matching: Vec<&JoinedEntity> = outcome
                .entities
                .iter()
                .filter(|entity| entity_satisfies(entity, rule, declared))
                .collect();
            let satisfied_by: BTreeSet<String> = matching
                .iter()
                .flat_map(|e| e.present_in_lenses.iter().cloned())
                .collect();
            let matched_combination = if rule.rule == SignalRuleType::Combination {
                rule.sufficient
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .find(|set| {
                        matching.iter().any(|entity| {
                            set.iter().all(|lens| entity.present_in_lenses.contains(lens))
                        })
                    })
                    .cloned()
            } else {
                None
            };
            SignalOutcome {
                fired: !matching.is_empty(),
                rule: rule.rule,
                satisfied_by: satisfied_by.into_iter().collect(),
                matched_combination,
                entities: matching.iter().map(|e| e.name.clone()).collect(),
            }
        }
        JoinMode::Temporal | JoinMode::Cooccurrence => {
            let (fired, matched_combination) =
                evidence_satisfies(&outcome.lenses_with_evidence, rule, declared);
            SignalOutcome {
                fired,
                rule: rule.rule,
                satisfied_by: outcome.lenses_with_evidence.iter().cloned().collect(),
                matched_combination,
                entities: Vec::new(),
            }
        }
    }
}
