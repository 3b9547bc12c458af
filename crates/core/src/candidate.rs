//! Candidate records emitted by the retrievers and enriched by fusion

use serde::{Deserialize, Serialize};

use crate::item::Item;

/// Which retriever produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Lexical,
    Vector,
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTag::Lexical => write!(f, "lexical"),
            SourceTag::Vector => write!(f, "vector"),
        }
    }
}

/// One item emitted by a retriever for one query.
///
/// Transient: exists only for the lifetime of a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub item: Item,
    /// Raw backend score (BM25 or cosine-derived)
    pub raw_score: f32,
    pub source: SourceTag,
}

/// A candidate after fusion, carrying score provenance from both
/// sources so callers can explain why it ranked where it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub item: Item,

    /// Raw scores per source; 0.0 where the item was absent
    pub lexical_score: f32,
    pub vector_score: f32,

    /// Min-max normalised scores in [0, 1]
    pub normalised_lexical: f64,
    pub normalised_vector: f64,

    /// 1-based ranks within each source list; `None` when absent
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,

    /// The single value the final ordering sorts by
    pub fused_score: f64,

    /// Sources the item appeared in
    pub sources: Vec<SourceTag>,

    /// `best_original_rank - new_rank`; positive means the item moved up
    pub rank_change: i64,
}

impl RankedCandidate {
    /// The better (lower) of the item's original ranks, used for
    /// deterministic tie-breaking.
    pub fn best_original_rank(&self) -> usize {
        match (self.lexical_rank, self.vector_rank) {
            (Some(l), Some(v)) => l.min(v),
            (Some(l), None) => l,
            (None, Some(v)) => v,
            (None, None) => usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            module: String::new(),
            title: String::new(),
            description: String::new(),
            steps: String::new(),
            expected_results: String::new(),
            pre_requisites: String::new(),
            priority: String::new(),
            risk: String::new(),
            embedding: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_best_original_rank() {
        let mut rc = RankedCandidate {
            item: item("TC_1"),
            lexical_score: 1.0,
            vector_score: 0.5,
            normalised_lexical: 1.0,
            normalised_vector: 0.5,
            lexical_rank: Some(3),
            vector_rank: Some(7),
            fused_score: 0.0,
            sources: vec![SourceTag::Lexical, SourceTag::Vector],
            rank_change: 0,
        };
        assert_eq!(rc.best_original_rank(), 3);

        rc.lexical_rank = None;
        assert_eq!(rc.best_original_rank(), 7);
    }

    #[test]
    fn test_candidate_list_json_round_trip() {
        let candidates = vec![
            Candidate {
                item: item("TC_1"),
                raw_score: 4.2,
                source: SourceTag::Lexical,
            },
            Candidate {
                item: item("HC-9"),
                raw_score: 0.91,
                source: SourceTag::Vector,
            },
        ];
        let json = serde_json::to_string(&candidates).unwrap();
        let back: Vec<Candidate> = serde_json::from_str(&json).unwrap();
        assert_eq!(candidates, back);
    }
}
