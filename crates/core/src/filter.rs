//! Metadata filters and lexical field weights

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// AND-composed equality predicates over item metadata fields.
///
/// Absent filters are no-ops; an empty filter set matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub item_type: Option<String>,

    /// Additional equality predicates on opaque metadata keys
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn risk(mut self, risk: impl Into<String>) -> Self {
        self.risk = Some(risk.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.module.is_none()
            && self.priority.is_none()
            && self.risk.is_none()
            && self.item_type.is_none()
            && self.extra.is_empty()
    }

    /// Flatten into `(field, value)` pairs for backend query builders.
    pub fn as_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(ref m) = self.module {
            pairs.push(("module".to_string(), m.clone()));
        }
        if let Some(ref p) = self.priority {
            pairs.push(("priority".to_string(), p.clone()));
        }
        if let Some(ref r) = self.risk {
            pairs.push(("risk".to_string(), r.clone()));
        }
        if let Some(ref t) = self.item_type {
            pairs.push(("type".to_string(), t.clone()));
        }
        for (k, v) in &self.extra {
            pairs.push((k.clone(), v.clone()));
        }
        pairs
    }
}

/// Per-field boosts for the compound lexical query.
///
/// Modelled as an explicit field → weight mapping so the backend query
/// builder never depends on field-name strings scattered through
/// request bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights(Vec<(String, f32)>);

impl FieldWeights {
    pub fn new(weights: Vec<(String, f32)>) -> Self {
        Self(weights)
    }

    /// Restrict to a caller-supplied subset of fields, keeping the
    /// default weight for each. Unknown field names are ignored.
    pub fn restrict_to(&self, fields: &[String]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(name, _)| fields.iter().any(|f| f == name))
                .cloned()
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(name, w)| (name.as_str(), *w))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self(vec![
            ("id".to_string(), 10.0),
            ("title".to_string(), 8.0),
            ("module".to_string(), 5.0),
            ("description".to_string(), 2.0),
            ("expected_results".to_string(), 1.5),
            ("steps".to_string(), 1.0),
            ("pre_requisites".to_string(), 0.8),
        ])
    }
}
