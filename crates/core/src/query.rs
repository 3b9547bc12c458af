//! Query preprocessing records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options controlling the query normaliser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizeOptions {
    pub enable_abbreviations: bool,
    pub enable_synonyms: bool,
    pub max_synonym_variations: usize,
    pub preserve_identifiers: bool,

    /// Caller-supplied abbreviation → expansion pairs, merged over the
    /// built-in map
    pub custom_abbreviations: HashMap<String, String>,

    /// Caller-supplied token → synonyms pairs, merged over the built-in
    /// map
    pub custom_synonyms: HashMap<String, Vec<String>>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            enable_abbreviations: true,
            enable_synonyms: true,
            max_synonym_variations: 3,
            preserve_identifiers: true,
            custom_abbreviations: HashMap::new(),
            custom_synonyms: HashMap::new(),
        }
    }
}

/// A substitution the normaliser applied, recorded for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRewrite {
    pub token: String,
    pub replacement: String,
}

/// The preprocessing result for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTransformation {
    pub original: String,

    /// Lower-cased, whitespace-collapsed, abbreviation-expanded form
    pub normalised: String,

    /// Ordered rewrites; the normalised original is always index 0
    pub expansions: Vec<String>,

    pub abbreviations_applied: Vec<AppliedRewrite>,
    pub synonyms_applied: Vec<AppliedRewrite>,
}

impl QueryTransformation {
    /// An empty query yields an empty record; rejecting it is the
    /// orchestrator's job, not the normaliser's.
    pub fn empty(original: &str) -> Self {
        Self {
            original: original.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalised.is_empty()
    }
}
