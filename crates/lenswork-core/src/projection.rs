//! Item projection applied at the agent boundary.
//!
//! Workflows operate on raw upstream items (they need evaluation and
//! enrichment metadata); every multi-item exit surface projects down to
//! the decision-relevant shape below. The raw `properties.content`
//! field, enrichment ids and statuses, reasoning chains and internal
//! timestamps never cross the boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    Enrichment, EnrichmentFormat, EnrichmentStatus, Satisfaction, WebsetItem,
};

/// One criterion verdict in projected form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedEvaluation {
    pub criterion: String,
    pub satisfied: Satisfaction,
}

/// One enrichment value in projected form, keyed by description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedEnrichment {
    pub description: String,
    pub format: EnrichmentFormat,
    pub result: Vec<String>,
}

/// The decision-relevant shape of a webset item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub evaluations: Vec<ProjectedEvaluation>,
    #[serde(default)]
    pub enrichments: Vec<ProjectedEnrichment>,
}

/// Bulk projection envelope, mandatory for multi-item responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBundle {
    pub data: Vec<ProjectedItem>,
    pub total: usize,
    pub included: usize,
    pub excluded: usize,
}

/// Project one item, re-keying enrichment results by description.
///
/// `definitions` maps enrichment id to its definition; results whose id
/// is unknown keep the id as their description. Enrichments that never
/// completed with a value are dropped.
pub fn project_item(item: &WebsetItem, definitions: &HashMap<String, Enrichment>) -> ProjectedItem {
    let evaluations = item
        .evaluations
        .iter()
        .map(|e| ProjectedEvaluation {
            criterion: e.criterion.clone(),
            satisfied: e.satisfied,
        })
        .collect();

    let enrichments = item
        .enrichments
        .iter()
        .filter(|r| r.status == EnrichmentStatus::Completed)
        .filter_map(|r| {
            let result = r.result.clone()?;
            let description = definitions
                .get(&r.enrichment_id)
                .map(|d| d.description.clone())
                .unwrap_or_else(|| r.enrichment_id.clone());
            Some(ProjectedEnrichment {
                description,
                format: r.format,
                result,
            })
        })
        .collect();

    ProjectedItem {
        id: item.id.clone(),
        name: item.entity_name(),
        url: item.url().map(str::to_string),
        entity_type: item.entity_type().map(str::to_string),
        description: item.description().map(str::to_string),
        evaluations,
        enrichments,
    }
}

/// Project a batch, filtering out items with evaluations but no `yes`.
pub fn bundle_items(items: &[WebsetItem], definitions: &HashMap<String, Enrichment>) -> ItemBundle {
    let total = items.len();
    let data: Vec<ProjectedItem> = items
        .iter()
        .filter(|item| item.has_satisfied_evaluation())
        .map(|item| project_item(item, definitions))
        .collect();
    let included = data.len();
    ItemBundle {
        data,
        total,
        included,
        excluded: total - included,
    }
}

/// Build the id-to-definition map from a fetched webset.
pub fn enrichment_definitions(enrichments: &[Enrichment]) -> HashMap<String, Enrichment> {
    enrichments
        .iter()
        .map(|e| (e.id.clone(), e.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemEnrichmentResult, ItemEvaluation};
    use serde_json::json;

    fn sample_definitions() -> HashMap<String, Enrichment> {
        enrichment_definitions(&[Enrichment {
            id: "enr_1".to_string(),
            description: "employee count".to_string(),
            format: EnrichmentFormat::Number,
        }])
    }

    fn sample_item() -> WebsetItem {
        WebsetItem {
            id: "item_1".to_string(),
            source: None,
            created_at: None,
            properties: json!({
                "type": "company",
                "url": "https://acme.example",
                "description": "a robotics company",
                "content": "LARGE SCRAPED BODY",
                "company": { "name": "Acme Robotics" }
            }),
            evaluations: vec![ItemEvaluation {
                criterion: "is a company".to_string(),
                satisfied: Satisfaction::Yes,
            }],
            enrichments: vec![
                ItemEnrichmentResult {
                    enrichment_id: "enr_1".to_string(),
                    format: EnrichmentFormat::Number,
                    status: EnrichmentStatus::Completed,
                    result: Some(vec!["120".to_string()]),
                },
                ItemEnrichmentResult {
                    enrichment_id: "enr_2".to_string(),
                    format: EnrichmentFormat::Text,
                    status: EnrichmentStatus::Pending,
                    result: None,
                },
            ],
        }
    }

    #[test]
    fn test_projection_strips_content_and_ids() {
        let projected = project_item(&sample_item(), &sample_definitions());
        assert_eq!(projected.name, "Acme Robotics");
        assert_eq!(projected.url.as_deref(), Some("https://acme.example"));
        assert_eq!(projected.enrichments.len(), 1);
        assert_eq!(projected.enrichments[0].description, "employee count");

        let value = serde_json::to_value(&projected).unwrap();
        let text = value.to_string();
        assert!(!text.contains("LARGE SCRAPED BODY"));
        assert!(!text.contains("enr_1"));
        assert!(!text.contains("status"));
    }

    #[test]
    fn test_projection_is_a_serde_fixed_point() {
        let projected = project_item(&sample_item(), &sample_definitions());
        let round_tripped: ProjectedItem =
            serde_json::from_value(serde_json::to_value(&projected).unwrap()).unwrap();
        assert_eq!(projected, round_tripped);
    }

    #[test]
    fn test_bundle_counts_and_filtering() {
        let passing = sample_item();
        let mut failing = sample_item();
        failing.id = "item_2".to_string();
        failing.evaluations = vec![ItemEvaluation {
            criterion: "is a company".to_string(),
            satisfied: Satisfaction::No,
        }];
        let mut unevaluated = sample_item();
        unevaluated.id = "item_3".to_string();
        unevaluated.evaluations.clear();

        let bundle = bundle_items(&[passing, failing, unevaluated], &sample_definitions());
        assert_eq!(bundle.total, 3);
        assert_eq!(bundle.included, 2);
        assert_eq!(bundle.excluded, 1);
    }

    #[test]
    fn test_unknown_enrichment_id_keeps_id_as_description() {
        let mut item = sample_item();
        item.enrichments[0].enrichment_id = "enr_missing".to_string();
        let projected = project_item(&item, &sample_definitions());
        assert_eq!(projected.enrichments[0].description, "enr_missing");
    }
}
