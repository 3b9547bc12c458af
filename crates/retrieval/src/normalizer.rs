//! Query normalisation
//!
//! Expands queries with:
//! - Healthcare/QA abbreviation expansion ("ehr" -> "electronic health
//!   record")
//! - Domain synonym variations for recall
//! - Identifier protection so literal ids (TC_123, HC-45) survive
//!   substitution untouched

use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

use casekb_core::{AppliedRewrite, NormalizeOptions, QueryTransformation};

/// Built-in healthcare/QA abbreviation map.
///
/// Values never appear as keys, which keeps normalisation idempotent.
fn builtin_abbreviations() -> HashMap<String, String> {
    let pairs = [
        ("pt", "patient"),
        ("dob", "date of birth"),
        ("ehr", "electronic health record"),
        ("emr", "electronic medical record"),
        ("hcp", "healthcare provider"),
        ("appt", "appointment"),
        ("rx", "prescription"),
        ("otp", "one time password"),
        ("2fa", "two factor authentication"),
        ("wa", "whatsapp"),
        ("msg", "message"),
        ("regn", "registration"),
        ("auth", "authentication"),
        ("uat", "user acceptance testing"),
        ("tc", "test case"),
    ];
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Built-in domain synonym map
fn builtin_synonyms() -> HashMap<String, Vec<String>> {
    let pairs: &[(&str, &[&str])] = &[
        ("patient", &["member", "subscriber"]),
        ("doctor", &["physician", "clinician"]),
        ("consent", &["authorization", "permission"]),
        ("verify", &["validate", "check"]),
        ("appointment", &["booking", "schedule"]),
        ("message", &["notification", "sms"]),
        ("login", &["sign-in", "authentication"]),
        ("error", &["failure", "exception"]),
        ("record", &["chart", "document"]),
        ("claim", &["reimbursement"]),
    ];
    pairs
        .iter()
        .map(|(k, syns)| {
            (
                k.to_string(),
                syns.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            )
        })
        .collect()
}

/// Query normaliser
///
/// The transformation order is fixed: unicode/whitespace/case
/// normalisation, identifier protection, abbreviation expansion,
/// synonym variation. Running the normaliser on its own output is a
/// fixpoint.
pub struct QueryNormalizer {
    options: NormalizeOptions,
    abbreviations: HashMap<String, String>,
    synonyms: HashMap<String, Vec<String>>,
    identifier_patterns: Vec<Regex>,
}

impl QueryNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        let mut abbreviations = builtin_abbreviations();
        for (k, v) in &options.custom_abbreviations {
            abbreviations.insert(k.to_lowercase(), v.to_lowercase());
        }

        let mut synonyms = builtin_synonyms();
        for (k, v) in &options.custom_synonyms {
            synonyms.insert(
                k.to_lowercase(),
                v.iter().map(|s| s.to_lowercase()).collect(),
            );
        }

        let identifier_patterns = ["^tc_\\d+$", "^hc-\\d+$", "^us_\\d+$", "^req-\\d+$"]
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("static pattern"))
            .collect();

        Self {
            options,
            abbreviations,
            synonyms,
            identifier_patterns,
        }
    }

    fn is_identifier(&self, token: &str) -> bool {
        self.identifier_patterns.iter().any(|re| re.is_match(token))
    }

    /// Apply the full transformation pipeline to a raw query.
    ///
    /// Never fails: an empty or whitespace-only query yields an
    /// empty-transformation record; the orchestrator decides whether
    /// that is an error.
    pub fn normalize(&self, query: &str) -> QueryTransformation {
        let cleaned: String = query.nfkc().collect::<String>();
        let tokens: Vec<String> = cleaned
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        if tokens.is_empty() {
            return QueryTransformation::empty(query);
        }

        let protected: Vec<bool> = tokens
            .iter()
            .map(|t| self.options.preserve_identifiers && self.is_identifier(t))
            .collect();

        let mut abbreviations_applied = Vec::new();
        let expanded: Vec<String> = tokens
            .iter()
            .zip(&protected)
            .map(|(token, &is_id)| {
                if !is_id && self.options.enable_abbreviations {
                    if let Some(expansion) = self.abbreviations.get(token) {
                        abbreviations_applied.push(AppliedRewrite {
                            token: token.clone(),
                            replacement: expansion.clone(),
                        });
                        return expansion.clone();
                    }
                }
                token.clone()
            })
            .collect();

        let normalised = expanded.join(" ");

        // Re-tokenise: multi-word expansions introduce new tokens, and
        // synonym variation works on the final token stream.
        let final_tokens: Vec<String> =
            normalised.split_whitespace().map(str::to_string).collect();

        let mut expansions = vec![normalised.clone()];
        let mut synonyms_applied = Vec::new();

        if self.options.enable_synonyms {
            for (idx, token) in final_tokens.iter().enumerate() {
                if self.options.preserve_identifiers && self.is_identifier(token) {
                    continue;
                }
                let Some(variants) = self.synonyms.get(token) else {
                    continue;
                };
                for synonym in variants.iter().take(self.options.max_synonym_variations) {
                    let mut rewritten = final_tokens.clone();
                    rewritten[idx] = synonym.clone();
                    let phrase = rewritten.join(" ");
                    if !expansions.contains(&phrase) {
                        expansions.push(phrase);
                        synonyms_applied.push(AppliedRewrite {
                            token: token.clone(),
                            replacement: synonym.clone(),
                        });
                    }
                }
            }
        }

        QueryTransformation {
            original: query.to_string(),
            normalised,
            expansions,
            abbreviations_applied,
            synonyms_applied,
        }
    }
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(NormalizeOptions::default())
    }
}
