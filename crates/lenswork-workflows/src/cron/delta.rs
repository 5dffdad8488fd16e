//! Snapshots and snapshot deltas.
//!
//! A snapshot is the self-contained record of one evaluation; the
//! system never stores them. Callers re-supply the previous snapshot to
//! get a structured delta.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::config::JoinMode;
use super::join::{JoinOutcome, JoinedEntity};
use super::signal::SignalOutcome;

/// Per-lens summary inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensSnapshot {
    pub webset_id: String,
    pub total_items: usize,
    pub shaped_count: usize,
    #[serde(default)]
    pub shapes: Vec<String>,
}

/// A joined entity, reduced to its durable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Canonical key, URL preferred over name
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub present_in_lenses: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enrichments: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl From<&JoinedEntity> for EntitySnapshot {
    fn from(entity: &JoinedEntity) -> Self {
        Self {
            key: entity.key.clone(),
            name: entity.name.clone(),
            url: entity.url.clone(),
            present_in_lenses: entity.present_in_lenses.iter().cloned().collect(),
            enrichments: entity.enrichments_by_lens.clone(),
        }
    }
}

/// Join section of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSnapshot {
    pub by: JoinMode,
    #[serde(default)]
    pub entities: Vec<EntitySnapshot>,
    #[serde(default)]
    pub lenses_with_evidence: Vec<String>,
}

impl From<&JoinOutcome> for JoinSnapshot {
    fn from(outcome: &JoinOutcome) -> Self {
        Self {
            by: outcome.mode,
            entities: outcome.entities.iter().map(EntitySnapshot::from).collect(),
            lenses_with_evidence: outcome.lenses_with_evidence.iter().cloned().collect(),
        }
    }
}

/// A self-contained record of one semantic-cron evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub evaluated_at: DateTime<Utc>,
    pub lenses: BTreeMap<String, LensSnapshot>,
    pub join: JoinSnapshot,
    pub signal: SignalOutcome,
}

/// Signal change between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalTransition {
    pub was: bool,
    pub now: bool,
    pub changed: bool,
    pub new_entities: Vec<String>,
    pub lost_entities: Vec<String>,
}

/// Structured difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    /// Per-lens count of newly shaped items
    pub new_shaped_items: BTreeMap<String, u64>,
    /// Entity keys joined now but not before
    pub new_joins: Vec<String>,
    /// Entity keys joined before but not now
    pub lost_joins: Vec<String>,
    pub signal_transition: SignalTransition,
    /// Humanized elapsed time, minimum unit minutes
    pub time_since_last_eval: String,
}

/// Render a duration as its non-zero `d h m` parts.
pub fn humanize_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let days = total_minutes / 1_440;
    let hours = (total_minutes % 1_440) / 60;
    let minutes = total_minutes % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if parts.is_empty() {
        return "0m".to_string();
    }
    parts.join(" ")
}

/// Compute the delta from `previous` to `current`.
pub fn compute_delta(previous: &Snapshot, current: &Snapshot) -> Delta {
    let new_shaped_items: BTreeMap<String, u64> = current
        .lenses
        .iter()
        .map(|(lens_id, lens)| {
            let before = previous
                .lenses
                .get(lens_id)
                .map(|p| p.shaped_count)
                .unwrap_or(0);
            let gained = lens.shaped_count.saturating_sub(before) as u64;
            (lens_id.clone(), gained)
        })
        .collect();

    let previous_keys: BTreeSet<&String> =
        previous.join.entities.iter().map(|e| &e.key).collect();
    let current_keys: BTreeSet<&String> = current.join.entities.iter().map(|e| &e.key).collect();
    let new_joins: Vec<String> = current_keys
        .difference(&previous_keys)
        .map(|k| (*k).clone())
        .collect();
    let lost_joins: Vec<String> = previous_keys
        .difference(&current_keys)
        .map(|k| (*k).clone())
        .collect();

    let previous_entities: BTreeSet<&String> = previous.signal.entities.iter().collect();
    let current_entities: BTreeSet<&String> = current.signal.entities.iter().collect();
    let new_entities: Vec<String> = current_entities
        .difference(&previous_entities)
        .map(|e| (*e).clone())
        .collect();
    let lost_entities: Vec<String> = previous_entities
        .difference(&current_entities)
        .map(|e| (*e).clone())
        .collect();

    let was = previous.signal.fired;
    let now = current.signal.fired;
    let signal_transition = SignalTransition {
        was,
        now,
        changed: was != now || !new_entities.is_empty() || !lost_entities.is_empty(),
        new_entities,
        lost_entities,
    };

    Delta {
        new_shaped_items,
        new_joins,
        lost_joins,
        signal_transition,
        time_since_last_eval: humanize_duration(current.evaluated_at - previous.evaluated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::config::SignalRuleType;

    fn snapshot(
        evaluated_at: DateTime<Utc>,
        shaped: &[(&str, usize)],
        entity_keys: &[&str],
        fired: bool,
        signal_entities: &[&str],
    ) -> Snapshot {
        Snapshot {
            evaluated_at,
            lenses: shaped
                .iter()
                .map(|(lens_id, count)| {
                    (
                        lens_id.to_string(),
                        LensSnapshot {
                            webset_id: format!("ws_{}", lens_id),
                            total_items: count * 2,
                            shaped_count: *count,
                            shapes: Vec::new(),
                        },
                    )
                })
                .collect(),
            join: JoinSnapshot {
                by: JoinMode::Entity,
                entities: entity_keys
                    .iter()
                    .map(|key| EntitySnapshot {
                        key: key.to_string(),
                        name: key.to_string(),
                        url: None,
                        present_in_lenses: vec!["A".to_string(), "B".to_string()],
                        enrichments: BTreeMap::new(),
                    })
                    .collect(),
                lenses_with_evidence: vec!["A".to_string(), "B".to_string()],
            },
            signal: SignalOutcome {
                fired,
                rule: SignalRuleType::Threshold,
                satisfied_by: vec!["A".to_string(), "B".to_string()],
                matched_combination: None,
                entities: signal_entities.iter().map(|e| e.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_identical_snapshots_produce_empty_delta() {
        let at = Utc::now();
        let a = snapshot(at, &[("A", 3), ("B", 2)], &["acme"], true, &["Acme"]);
        let b = snapshot(
            at + Duration::minutes(30),
            &[("A", 3), ("B", 2)],
            &["acme"],
            true,
            &["Acme"],
        );
        let delta = compute_delta(&a, &b);
        assert!(delta.new_joins.is_empty());
        assert!(delta.lost_joins.is_empty());
        assert!(!delta.signal_transition.changed);
        assert_eq!(delta.new_shaped_items["A"], 0);
        assert_eq!(delta.time_since_last_eval, "30m");
    }

    #[test]
    fn test_newly_fired_signal_transition() {
        let at = Utc::now();
        let before = snapshot(at, &[("A", 0)], &[], false, &[]);
        let after = snapshot(
            at + Duration::hours(2),
            &[("A", 1)],
            &["acme"],
            true,
            &["Acme"],
        );
        let delta = compute_delta(&before, &after);
        assert_eq!(
            delta.signal_transition,
            SignalTransition {
                was: false,
                now: true,
                changed: true,
                new_entities: vec!["Acme".to_string()],
                lost_entities: Vec::new(),
            }
        );
        assert_eq!(delta.new_joins, vec!["acme".to_string()]);
        assert_eq!(delta.new_shaped_items["A"], 1);
        assert_eq!(delta.time_since_last_eval, "2h");
    }

    #[test]
    fn test_shaped_counts_never_go_negative() {
        let at = Utc::now();
        let before = snapshot(at, &[("A", 5)], &[], false, &[]);
        let after = snapshot(at + Duration::minutes(5), &[("A", 2)], &[], false, &[]);
        let delta = compute_delta(&before, &after);
        assert_eq!(delta.new_shaped_items["A"], 0);
    }

    #[test]
    fn test_humanize_duration_parts() {
        assert_eq!(humanize_duration(Duration::seconds(30)), "0m");
        assert_eq!(humanize_duration(Duration::minutes(5)), "5m");
        assert_eq!(humanize_duration(Duration::minutes(125)), "2h 5m");
        assert_eq!(
            humanize_duration(Duration::minutes(1_440 + 60 + 7)),
            "1d 1h 7m"
        );
        assert_eq!(humanize_duration(Duration::days(2)), "2d");
        assert_eq!(humanize_duration(Duration::seconds(-10)), "0m");
    }
}
