//! Near-duplicate removal
//!
//! Jaccard similarity over whitespace-tokenised, lower-cased titles,
//! falling back to the full document text when titles are empty. The
//! walk is O(n^2) against the kept set, which is fine at this stage of
//! the pipeline (a few dozen candidates at most).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimal view over anything the deduplicator can process: fused
/// candidates, raw result records from the HTTP API, or items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupDoc {
    pub id: String,
    pub title: String,
    /// Fallback text compared when `title` is empty
    #[serde(default)]
    pub body: String,
}

impl DedupDoc {
    fn comparison_text(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.body
        } else {
            &self.title
        }
    }
}

/// A removed near-duplicate with its nearest retained neighbour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedDoc {
    /// Position in the input list
    pub index: usize,
    pub id: String,
    /// Id of the first colliding kept item
    pub duplicate_of: String,
    pub similarity: f64,
}

/// Deduplication result: indices into the input for kept docs (original
/// order preserved) plus the removed docs with provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub kept: Vec<usize>,
    pub removed: Vec<RemovedDoc>,
}

impl DedupOutcome {
    pub fn input_len(&self) -> usize {
        self.kept.len() + self.removed.len()
    }
}

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets. Two empty texts count as
/// identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Walk the input in order, dropping any doc whose similarity to an
/// already-kept doc reaches the threshold.
///
/// Empty input yields an empty outcome, not an error.
pub fn deduplicate(docs: &[DedupDoc], threshold: f64) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();

    for (index, doc) in docs.iter().enumerate() {
        let collision = outcome.kept.iter().find_map(|&kept_idx| {
            let kept = &docs[kept_idx];
            let similarity = jaccard(doc.comparison_text(), kept.comparison_text());
            (similarity >= threshold).then_some((kept.id.clone(), similarity))
        });

        match collision {
            Some((duplicate_of, similarity)) => outcome.removed.push(RemovedDoc {
                index,
                id: doc.id.clone(),
                duplicate_of,
                similarity,
            }),
            None => outcome.kept.push(index),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str) -> DedupDoc {
        DedupDoc {
            id: id.to_string(),
            title: title.to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_empty_input() {
        let outcome = deduplicate(&[], 0.85);
        assert!(outcome.kept.is_empty());
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn test_identical_titles_removed_with_provenance() {
        // Items 2 and 4 (0-based 1 and 3) share a title
        let docs = vec![
            doc("TC_1", "Patient registration happy path"),
            doc("TC_2", "Consent capture via WhatsApp"),
            doc("TC_3", "Claim rejection flow"),
            doc("TC_4", "Consent capture via WhatsApp"),
            doc("TC_5", "Vitals charting"),
        ];
        let outcome = deduplicate(&docs, 0.85);

        assert_eq!(outcome.kept.len(), 4);
        assert_eq!(outcome.removed.len(), 1);
        let removed = &outcome.removed[0];
        assert_eq!(removed.id, "TC_4");
        assert_eq!(removed.duplicate_of, "TC_2");
        assert!((removed.similarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_one_only_removes_identical_token_sets() {
        let docs = vec![
            doc("a", "patient consent flow"),
            doc("b", "patient consent flow extended"),
            doc("c", "patient consent flow"),
        ];
        let outcome = deduplicate(&docs, 1.0);
        assert_eq!(outcome.kept, vec![0, 1]);
        assert_eq!(outcome.removed[0].id, "c");

        // No two kept docs share an identical title
        let kept_titles: Vec<&str> = outcome
            .kept
            .iter()
            .map(|&i| docs[i].title.as_str())
            .collect();
        let unique: HashSet<&str> = kept_titles.iter().copied().collect();
        assert_eq!(kept_titles.len(), unique.len());
    }

    #[test]
    fn test_order_preserved() {
        let docs = vec![
            doc("x", "alpha beta"),
            doc("y", "gamma delta"),
            doc("z", "epsilon zeta"),
        ];
        let outcome = deduplicate(&docs, 0.85);
        assert_eq!(outcome.kept, vec![0, 1, 2]);
    }

    #[test]
    fn test_fallback_to_body_when_title_empty() {
        let mut a = doc("a", "");
        a.body = "verify discharge summary upload".to_string();
        let mut b = doc("b", "");
        b.body = "verify discharge summary upload".to_string();

        let outcome = deduplicate(&[a, b], 0.9);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.removed[0].duplicate_of, "a");
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        let sim = jaccard("patient consent whatsapp", "patient consent email");
        // 2 shared of 4 distinct tokens
        assert!((sim - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_word_order_does_not_matter() {
        assert!((jaccard("consent patient", "patient consent") - 1.0).abs() < f64::EPSILON);
    }
}
