//! Stored items and their summariser-facing projection

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The stored unit: a healthcare test case or user story.
///
/// Immutable from the pipeline's perspective; the search backend owns
/// items, the pipeline borrows them for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, unique within the corpus
    pub id: String,

    #[serde(default)]
    pub module: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub steps: String,

    #[serde(default)]
    pub expected_results: String,

    #[serde(default)]
    pub pre_requisites: String,

    #[serde(default)]
    pub priority: String,

    #[serde(default)]
    pub risk: String,

    /// Dense embedding; length must equal the configured dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Opaque metadata carried through to the caller
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Item {
    /// Concatenation of all text fields, used as the dedup fallback
    /// when titles are empty.
    pub fn full_text(&self) -> String {
        [
            self.title.as_str(),
            self.module.as_str(),
            self.description.as_str(),
            self.steps.as_str(),
            self.expected_results.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// The item's `type` metadata value, when present ("testcase",
    /// "userstory", ...).
    pub fn item_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(|v| v.as_str())
    }
}

/// A summariser-facing view over either item shape.
///
/// The corpus mixes test-case-shaped records (`id`, `title`, `steps`)
/// with user-story-shaped ones (`key`, `summary`, `acceptanceCriteria`).
/// The projection picks whichever subset is populated and never guesses
/// which collection a record came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemProjection {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub module: String,

    #[serde(default)]
    pub priority: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub business_value: String,

    #[serde(default)]
    pub acceptance_criteria: String,
}

impl ItemProjection {
    /// Build a projection from an untyped result record.
    ///
    /// Field pairs resolve as: `id` | `key`, `title` | `summary`,
    /// `description` | `userStory`. Missing fields stay empty.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let pick = |keys: &[&str]| -> String {
            keys.iter()
                .filter_map(|k| value.get(k).and_then(|v| v.as_str()))
                .find(|s| !s.is_empty())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            id: pick(&["id", "key"]),
            title: pick(&["title", "summary"]),
            module: pick(&["module", "component"]),
            priority: pick(&["priority"]),
            description: pick(&["description", "userStory", "user_story"]),
            business_value: pick(&["businessValue", "business_value"]),
            acceptance_criteria: pick(&["acceptanceCriteria", "acceptance_criteria"]),
        }
    }
}

impl From<&Item> for ItemProjection {
    fn from(item: &Item) -> Self {
        let meta_str = |key: &str| {
            item.metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            module: item.module.clone(),
            priority: item.priority.clone(),
            description: item.description.clone(),
            business_value: meta_str("businessValue"),
            acceptance_criteria: meta_str("acceptanceCriteria"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection_prefers_testcase_shape() {
        let value = json!({
            "id": "TC_1001",
            "title": "Verify patient consent capture",
            "module": "Consent",
            "priority": "High"
        });
        let proj = ItemProjection::from_value(&value);
        assert_eq!(proj.id, "TC_1001");
        assert_eq!(proj.title, "Verify patient consent capture");
    }

    #[test]
    fn test_projection_falls_back_to_story_shape() {
        let value = json!({
            "key": "HC-204",
            "summary": "As a nurse I want to record vitals",
            "acceptanceCriteria": "Vitals persist across sessions",
            "businessValue": "Reduces charting time"
        });
        let proj = ItemProjection::from_value(&value);
        assert_eq!(proj.id, "HC-204");
        assert_eq!(proj.title, "As a nurse I want to record vitals");
        assert_eq!(proj.acceptance_criteria, "Vitals persist across sessions");
        assert_eq!(proj.business_value, "Reduces charting time");
    }

    #[test]
    fn test_item_json_round_trip() {
        let item = Item {
            id: "TC_7".to_string(),
            module: "Billing".to_string(),
            title: "Claim rejection".to_string(),
            description: "Rejected claims are flagged".to_string(),
            steps: "Submit claim".to_string(),
            expected_results: "Claim flagged".to_string(),
            pre_requisites: String::new(),
            priority: "Medium".to_string(),
            risk: "Low".to_string(),
            embedding: Some(vec![0.1, 0.2]),
            metadata: HashMap::new(),
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }
}
