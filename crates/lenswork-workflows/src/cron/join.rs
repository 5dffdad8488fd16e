//! Cross-lens join engine.
//!
//! Folds shaped items from every lens into canonical entities (exact
//! URL first, Dice name similarity second) or, for the identity-free
//! modes, into a set of lenses with corroborating evidence.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use lenswork_core::similarity::dice_coefficient;

use super::config::{JoinConfig, JoinMode};

/// One shaped item, reduced to joinable identity.
#[derive(Debug, Clone)]
pub struct ShapedItem {
    pub item_id: String,
    pub name: String,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Enrichment values keyed by description
    pub enrichments: BTreeMap<String, Vec<String>>,
}

/// Everything a lens contributed to one evaluation.
#[derive(Debug, Clone)]
pub struct LensEvaluation {
    pub lens_id: String,
    pub webset_id: String,
    pub total_items: usize,
    pub shaped: Vec<ShapedItem>,
    pub shape_labels: Vec<String>,
}

/// One appearance of an entity inside a lens.
#[derive(Debug, Clone)]
pub struct Appearance {
    pub lens_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A canonical entity folded across lenses.
#[derive(Debug, Clone)]
pub struct JoinedEntity {
    /// Canonical key: URL preferred, then name, then item id
    pub key: String,
    pub name: String,
    pub url: Option<String>,
    pub present_in_lenses: BTreeSet<String>,
    pub appearances: Vec<Appearance>,
    /// Per-lens enrichment snapshot
    pub enrichments_by_lens: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Join result: entities for the identity modes, a lens-evidence set
/// for the identity-free ones.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub mode: JoinMode,
    pub entities: Vec<JoinedEntity>,
    pub lenses_with_evidence: BTreeSet<String>,
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn fold_entities(lenses: &[LensEvaluation], name_threshold: f64) -> Vec<JoinedEntity> {
    let mut entities: Vec<JoinedEntity> = Vec::new();
    for lens in lenses {
        for item in &lens.shaped {
            let url = item.url.as_deref().map(normalize_url);
            let matched = entities.iter_mut().find(|entity| {
                if let (Some(a), Some(b)) = (&entity.url, &url) {
                    if a == b {
                        return true;
                    }
                }
                dice_coefficient(&entity.name, &item.name) >= name_threshold
            });
            match matched {
                Some(entity) => {
                    entity.present_in_lenses.insert(lens.lens_id.clone());
                    entity.appearances.push(Appearance {
                        lens_id: lens.lens_id.clone(),
                        created_at: item.created_at,
                    });
                    entity
                        .enrichments_by_lens
                        .entry(lens.lens_id.clone())
                        .or_default()
                        .extend(item.enrichments.clone());
                    if entity.url.is_none() {
                        entity.url = url;
                    }
                }
                None => {
                    let key = url
                        .clone()
                        .or_else(|| {
                            let name = item.name.trim();
                            if name.is_empty() || name == "unknown" {
                                None
                            } else {
                                Some(name.to_lowercase())
                            }
                        })
                        .unwrap_or_else(|| item.item_id.clone());
                    entities.push(JoinedEntity {
                        key,
                        name: item.name.clone(),
                        url,
                        present_in_lenses: BTreeSet::from([lens.lens_id.clone()]),
                        appearances: vec![Appearance {
                            lens_id: lens.lens_id.clone(),
                            created_at: item.created_at,
                        }],
                        enrichments_by_lens: BTreeMap::from([(
                            lens.lens_id.clone(),
                            item.enrichments.clone(),
                        )]),
                    });
                }
            }
        }
    }
    entities
}

/// Two timestamps from distinct lenses within the window.
fn has_temporal_pair(entity: &JoinedEntity, window_ms: f64) -> bool {
    let stamped: Vec<&Appearance> = entity
        .appearances
        .iter()
        .filter(|a| a.created_at.is_some())
        .collect();
    for (i, first) in stamped.iter().enumerate() {
        for second in stamped.iter().skip(i + 1) {
            if first.lens_id == second.lens_id {
                continue;
            }
            if let (Some(a), Some(b)) = (first.created_at, second.created_at) {
                if (a - b).num_milliseconds().abs() as f64 <= window_ms {
                    return true;
                }
            }
        }
    }
    false
}

fn temporal_evidence(lenses: &[LensEvaluation], window_ms: f64) -> BTreeSet<String> {
    let mut evidence = BTreeSet::new();
    for (i, first) in lenses.iter().enumerate() {
        for second in lenses.iter().skip(i + 1) {
            let close = first.shaped.iter().any(|a| {
                second.shaped.iter().any(|b| match (a.created_at, b.created_at) {
                    (Some(ta), Some(tb)) => {
                        (ta - tb).num_milliseconds().abs() as f64 <= window_ms
                    }
                    _ => false,
                })
            });
            if close {
                evidence.insert(first.lens_id.clone());
                evidence.insert(second.lens_id.clone());
            }
        }
    }
    evidence
}

fn cooccurrence_evidence(lenses: &[LensEvaluation], window_ms: Option<f64>) -> BTreeSet<String> {
    let populated: Vec<&LensEvaluation> =
        lenses.iter().filter(|l| !l.shaped.is_empty()).collect();
    let Some(window_ms) = window_ms else {
        return populated.iter().map(|l| l.lens_id.clone()).collect();
    };
    let earliest = populated
        .iter()
        .flat_map(|l| l.shaped.iter().filter_map(|s| s.created_at))
        .min();
    let Some(earliest) = earliest else {
        // no timestamps anywhere: the window cannot exclude anything
        return populated.iter().map(|l| l.lens_id.clone()).collect();
    };
    populated
        .iter()
        .filter(|lens| {
            lens.shaped.iter().any(|item| match item.created_at {
                Some(t) => (t - earliest).num_milliseconds().abs() as f64 <= window_ms,
                None => false,
            })
        })
        .map(|l| l.lens_id.clone())
        .collect()
}

/// Apply the configured join over every lens's shaped items.
pub fn join_lenses(lenses: &[LensEvaluation], join: &JoinConfig) -> JoinOutcome {
    match join.by {
        JoinMode::Entity | JoinMode::EntityTemporal => {
            let mut entities = fold_entities(lenses, join.name_threshold());
            entities.retain(|e| e.present_in_lenses.len() >= join.min_lens_overlap());
            if join.by == JoinMode::EntityTemporal {
                let window_ms = join.temporal.map(|w| w.millis()).unwrap_or(0.0);
                entities.retain(|e| has_temporal_pair(e, window_ms));
            }
            let lenses_with_evidence = entities
                .iter()
                .flat_map(|e| e.present_in_lenses.iter().cloned())
                .collect();
            JoinOutcome {
                mode: join.by,
                entities,
                lenses_with_evidence,
            }
        }
        JoinMode::Temporal => {
            let window_ms = join.temporal.map(|w| w.millis()).unwrap_or(0.0);
            JoinOutcome {
                mode: join.by,
                entities: Vec::new(),
                lenses_with_evidence: temporal_evidence(lenses, window_ms),
            }
        }
        JoinMode::Cooccurrence => JoinOutcome {
            mode: join.by,
            entities: Vec::new(),
            lenses_with_evidence: cooccurrence_evidence(
                lenses,
                join.temporal.map(|w| w.millis()),
            ),
        },
    }
}
