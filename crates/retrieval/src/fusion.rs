//! Rank fusion
//!
//! Combines the lexical and vector candidate lists into one ordered
//! list under one of three policies. Fusion is pure: it never touches
//! a backend and never fails once the weights have been validated.
//!
//! ## Ordering
//!
//! Results sort by fused score descending. Ties break deterministically:
//! the item with the lower best original rank wins, then lexicographic
//! id. `rank_change` records `best_original_rank - new_rank` so callers
//! can see how far fusion moved an item.

use std::collections::HashMap;

use casekb_core::{Candidate, Error, RankedCandidate, Result, SourceTag};

use casekb_config::constants::retrieval::RRF_K;

/// Fusion policy, selected per request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionPolicy {
    /// Reciprocal Rank Fusion: `sum(1 / (k + rank))`, k = 60
    Rrf,
    /// `w_lex * normalised_lex + w_vec * normalised_vec`
    WeightedNormalised,
    /// `w_lex / rank_lex + w_vec / rank_vec`, 0 for missing ranks
    WeightedReciprocal,
}

impl FusionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionPolicy::Rrf => "rrf",
            FusionPolicy::WeightedNormalised => "weighted",
            FusionPolicy::WeightedReciprocal => "reciprocal",
        }
    }
}

impl std::str::FromStr for FusionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rrf" => Ok(FusionPolicy::Rrf),
            "weighted" => Ok(FusionPolicy::WeightedNormalised),
            "reciprocal" => Ok(FusionPolicy::WeightedReciprocal),
            other => Err(Error::InvalidArgument(format!(
                "unknown fusion method: {}",
                other
            ))),
        }
    }
}

/// Source weights for the weighted policies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f64,
    pub vector: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: casekb_config::constants::retrieval::DEFAULT_BM25_WEIGHT,
            vector: casekb_config::constants::retrieval::DEFAULT_VECTOR_WEIGHT,
        }
    }
}

impl FusionWeights {
    pub fn new(lexical: f64, vector: f64) -> Self {
        Self { lexical, vector }
    }

    /// Reject unusable weights and renormalise the rest to sum to 1.
    pub fn validated(self) -> Result<Self> {
        if !self.lexical.is_finite() || !self.vector.is_finite() {
            return Err(Error::InvalidArgument(
                "fusion weights must be finite".to_string(),
            ));
        }
        if self.lexical < 0.0 || self.vector < 0.0 {
            return Err(Error::InvalidArgument(
                "fusion weights must be non-negative".to_string(),
            ));
        }
        let sum = self.lexical + self.vector;
        if sum <= 0.0 {
            return Err(Error::InvalidArgument(
                "fusion weights must not both be zero".to_string(),
            ));
        }
        Ok(Self {
            lexical: self.lexical / sum,
            vector: self.vector / sum,
        })
    }
}

/// Per-list min-max bounds; a degenerate list (max == min) maps every
/// entry to 1.0.
fn min_max_normalise(scores: &[f32]) -> Vec<f64> {
    let Some(&first) = scores.first() else {
        return Vec::new();
    };
    let (min, max) = scores.iter().fold((first, first), |(lo, hi), &s| {
        (lo.min(s), hi.max(s))
    });
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores
        .iter()
        .map(|&s| ((s - min) / (max - min)) as f64)
        .collect()
}

fn blank_entry(item: &casekb_core::Item) -> RankedCandidate {
    RankedCandidate {
        item: item.clone(),
        lexical_score: 0.0,
        vector_score: 0.0,
        normalised_lexical: 0.0,
        normalised_vector: 0.0,
        lexical_rank: None,
        vector_rank: None,
        fused_score: 0.0,
        sources: Vec::new(),
        rank_change: 0,
    }
}

/// Fuse the two candidate lists under the given policy.
///
/// The output is never longer than `|lexical| + |vector|` and is
/// truncated to `limit`. Weight validation happens before any
/// computation, so an error here has no side effects.
pub fn fuse(
    lexical: &[Candidate],
    vector: &[Candidate],
    policy: FusionPolicy,
    weights: FusionWeights,
    limit: usize,
) -> Result<Vec<RankedCandidate>> {
    let weights = weights.validated()?;

    let lexical_norm = min_max_normalise(
        &lexical.iter().map(|c| c.raw_score).collect::<Vec<_>>(),
    );
    let vector_norm = min_max_normalise(
        &vector.iter().map(|c| c.raw_score).collect::<Vec<_>>(),
    );

    let mut union: HashMap<String, RankedCandidate> = HashMap::new();

    for (idx, candidate) in lexical.iter().enumerate() {
        union
            .entry(candidate.item.id.clone())
            .or_insert_with(|| blank_entry(&candidate.item))
            .apply_lexical(candidate.raw_score, lexical_norm[idx], idx + 1);
    }

    for (idx, candidate) in vector.iter().enumerate() {
        union
            .entry(candidate.item.id.clone())
            .or_insert_with(|| blank_entry(&candidate.item))
            .apply_vector(candidate.raw_score, vector_norm[idx], idx + 1);
    }

    let mut fused: Vec<RankedCandidate> = union
        .into_values()
        .map(|mut rc| {
            rc.fused_score = score_for(&rc, policy, weights);
            rc
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.best_original_rank().cmp(&b.best_original_rank()))
            .then_with(|| a.item.id.cmp(&b.item.id))
    });

    fused.truncate(limit);

    for (idx, rc) in fused.iter_mut().enumerate() {
        rc.rank_change = rc.best_original_rank() as i64 - (idx + 1) as i64;
    }

    Ok(fused)
}

fn score_for(rc: &RankedCandidate, policy: FusionPolicy, weights: FusionWeights) -> f64 {
    match policy {
        FusionPolicy::Rrf => {
            let lex = rc
                .lexical_rank
                .map(|r| 1.0 / (RRF_K + r as f64))
                .unwrap_or(0.0);
            let vec = rc
                .vector_rank
                .map(|r| 1.0 / (RRF_K + r as f64))
                .unwrap_or(0.0);
            lex + vec
        }
        FusionPolicy::WeightedNormalised => {
            weights.lexical * rc.normalised_lexical + weights.vector * rc.normalised_vector
        }
        FusionPolicy::WeightedReciprocal => {
            let lex = rc
                .lexical_rank
                .map(|r| weights.lexical / r as f64)
                .unwrap_or(0.0);
            let vec = rc
                .vector_rank
                .map(|r| weights.vector / r as f64)
                .unwrap_or(0.0);
            lex + vec
        }
    }
}

trait ApplySource {
    fn apply_lexical(&mut self, raw: f32, normalised: f64, rank: usize);
    fn apply_vector(&mut self, raw: f32, normalised: f64, rank: usize);
}

impl ApplySource for RankedCandidate {
    fn apply_lexical(&mut self, raw: f32, normalised: f64, rank: usize) {
        self.lexical_score = raw;
        self.normalised_lexical = normalised;
        self.lexical_rank = Some(rank);
        if !self.sources.contains(&SourceTag::Lexical) {
            self.sources.push(SourceTag::Lexical);
        }
    }

    fn apply_vector(&mut self, raw: f32, normalised: f64, rank: usize) {
        self.vector_score = raw;
        self.normalised_vector = normalised;
        self.vector_rank = Some(rank);
        if !self.sources.contains(&SourceTag::Vector) {
            self.sources.push(SourceTag::Vector);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn item(id: &str) -> casekb_core::Item {
        casekb_core::Item {
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
            metadata: StdHashMap::new(),
        }
    }

    fn candidates(source: SourceTag, scored: &[(&str, f32)]) -> Vec<Candidate> {
        scored
            .iter()
            .map(|(id, score)| Candidate {
                item: item(id),
                raw_score: *score,
                source,
            })
            .collect()
    }

    #[test]
    fn test_output_never_exceeds_input_union() {
        let lex = candidates(SourceTag::Lexical, &[("a", 3.0), ("b", 2.0), ("c", 1.0)]);
        let vec = candidates(SourceTag::Vector, &[("b", 0.9), ("d", 0.8)]);
        for policy in [
            FusionPolicy::Rrf,
            FusionPolicy::WeightedNormalised,
            FusionPolicy::WeightedReciprocal,
        ] {
            let fused = fuse(&lex, &vec, policy, FusionWeights::default(), 100).unwrap();
            assert!(fused.len() <= lex.len() + vec.len());
            assert_eq!(fused.len(), 4); // a, b, c, d
        }
    }

    #[test]
    fn test_rrf_is_symmetric() {
        let lex = candidates(SourceTag::Lexical, &[("a", 3.0), ("b", 2.0), ("c", 1.0)]);
        let vec = candidates(SourceTag::Vector, &[("c", 0.9), ("d", 0.8), ("a", 0.7)]);

        let forward = fuse(&lex, &vec, FusionPolicy::Rrf, FusionWeights::default(), 10).unwrap();

        // Swap the lists (and retag so the inputs are well-formed)
        let lex_swapped = candidates(SourceTag::Lexical, &[("c", 0.9), ("d", 0.8), ("a", 0.7)]);
        let vec_swapped = candidates(SourceTag::Vector, &[("a", 3.0), ("b", 2.0), ("c", 1.0)]);
        let backward = fuse(
            &lex_swapped,
            &vec_swapped,
            FusionPolicy::Rrf,
            FusionWeights::default(),
            10,
        )
        .unwrap();

        let forward_ids: Vec<&str> = forward.iter().map(|r| r.item.id.as_str()).collect();
        let backward_ids: Vec<&str> = backward.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(forward_ids, backward_ids);
    }

    #[test]
    fn test_weighted_with_empty_source_preserves_other_order() {
        let lex = candidates(
            SourceTag::Lexical,
            &[("a", 9.0), ("b", 5.0), ("c", 4.0), ("d", 1.0)],
        );
        let fused = fuse(
            &lex,
            &[],
            FusionPolicy::WeightedNormalised,
            FusionWeights::default(),
            10,
        )
        .unwrap();
        let ids: Vec<&str> = fused.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_degenerate_weights_reproduce_source_order() {
        let lex = candidates(SourceTag::Lexical, &[("a", 9.0), ("b", 5.0), ("c", 4.0)]);
        let vec = candidates(SourceTag::Vector, &[("c", 0.99), ("b", 0.98), ("a", 0.5)]);

        let lexical_only = fuse(
            &lex,
            &vec,
            FusionPolicy::WeightedNormalised,
            FusionWeights::new(1.0, 0.0),
            10,
        )
        .unwrap();
        let ids: Vec<&str> = lexical_only.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(&ids[..3], &["a", "b", "c"]);

        let vector_only = fuse(
            &lex,
            &vec,
            FusionPolicy::WeightedNormalised,
            FusionWeights::new(0.0, 1.0),
            10,
        )
        .unwrap();
        let ids: Vec<&str> = vector_only.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(&ids[..3], &["c", "b", "a"]);
    }

    #[test]
    fn test_normalised_scores_in_unit_interval_and_top_reaches_one() {
        let lex = candidates(SourceTag::Lexical, &[("a", 12.5), ("b", 7.1), ("c", 0.2)]);
        let vec = candidates(SourceTag::Vector, &[("b", 0.93), ("c", 0.41)]);
        let fused = fuse(
            &lex,
            &vec,
            FusionPolicy::WeightedNormalised,
            FusionWeights::default(),
            10,
        )
        .unwrap();

        for rc in &fused {
            assert!((0.0..=1.0).contains(&rc.normalised_lexical));
            assert!((0.0..=1.0).contains(&rc.normalised_vector));
        }
        assert!(fused
            .iter()
            .any(|rc| (rc.normalised_lexical - 1.0).abs() < f64::EPSILON));
        assert!(fused
            .iter()
            .any(|rc| (rc.normalised_vector - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_degenerate_score_range_maps_to_one() {
        let lex = candidates(SourceTag::Lexical, &[("a", 5.0), ("b", 5.0)]);
        let fused = fuse(
            &lex,
            &[],
            FusionPolicy::WeightedNormalised,
            FusionWeights::default(),
            10,
        )
        .unwrap();
        assert!(fused
            .iter()
            .all(|rc| (rc.normalised_lexical - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_invalid_weights_rejected_before_computation() {
        let lex = candidates(SourceTag::Lexical, &[("a", 1.0)]);
        assert!(matches!(
            fuse(
                &lex,
                &[],
                FusionPolicy::WeightedNormalised,
                FusionWeights::new(-0.5, 1.0),
                10
            ),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            fuse(
                &lex,
                &[],
                FusionPolicy::WeightedNormalised,
                FusionWeights::new(0.0, 0.0),
                10
            ),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            fuse(
                &lex,
                &[],
                FusionPolicy::WeightedNormalised,
                FusionWeights::new(f64::NAN, 1.0),
                10
            ),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_non_summing_weights_are_renormalised() {
        let weights = FusionWeights::new(2.0, 6.0).validated().unwrap();
        assert!((weights.lexical - 0.25).abs() < f64::EPSILON);
        assert!((weights.vector - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_items_in_both_sources_rank_higher_under_rrf() {
        let lex = candidates(SourceTag::Lexical, &[("solo", 9.0), ("both", 5.0)]);
        let vec = candidates(SourceTag::Vector, &[("both", 0.9), ("other", 0.8)]);
        let fused = fuse(&lex, &vec, FusionPolicy::Rrf, FusionWeights::default(), 10).unwrap();
        assert_eq!(fused[0].item.id, "both");
        assert_eq!(fused[0].sources.len(), 2);
    }

    #[test]
    fn test_tie_break_is_deterministic_by_rank_then_id() {
        // Two items, each appearing only in one source at rank 1 with
        // identical normalised scores: fused scores tie exactly.
        let lex = candidates(SourceTag::Lexical, &[("zeta", 1.0)]);
        let vec = candidates(SourceTag::Vector, &[("alpha", 1.0)]);
        let fused = fuse(
            &lex,
            &vec,
            FusionPolicy::Rrf,
            FusionWeights::default(),
            10,
        )
        .unwrap();
        // Equal fused score and equal best rank: lexicographic id wins
        assert_eq!(fused[0].item.id, "alpha");
        assert_eq!(fused[1].item.id, "zeta");
    }

    #[test]
    fn test_rank_change_records_movement() {
        let lex = candidates(SourceTag::Lexical, &[("a", 3.0), ("b", 2.0)]);
        let vec = candidates(SourceTag::Vector, &[("b", 0.9)]);
        let fused = fuse(&lex, &vec, FusionPolicy::Rrf, FusionWeights::default(), 10).unwrap();
        // "b" appears in both sources and moves to rank 1: originally
        // best rank 1 (vector), new rank 1 -> change 0; "a" drops.
        let b = fused.iter().find(|r| r.item.id == "b").unwrap();
        let a = fused.iter().find(|r| r.item.id == "a").unwrap();
        assert_eq!(fused[0].item.id, "b");
        assert_eq!(b.rank_change, 0);
        assert_eq!(a.rank_change, 1 - 2);
    }

    #[test]
    fn test_limit_truncates() {
        let lex = candidates(SourceTag::Lexical, &[("a", 3.0), ("b", 2.0), ("c", 1.0)]);
        let fused = fuse(
            &lex,
            &[],
            FusionPolicy::Rrf,
            FusionWeights::default(),
            2,
        )
        .unwrap();
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_weighted_reciprocal_missing_rank_contributes_zero() {
        let lex = candidates(SourceTag::Lexical, &[("a", 3.0)]);
        let vec = candidates(SourceTag::Vector, &[("b", 0.9)]);
        let fused = fuse(
            &lex,
            &vec,
            FusionPolicy::WeightedReciprocal,
            FusionWeights::new(0.5, 0.5),
            10,
        )
        .unwrap();
        for rc in &fused {
            assert!((rc.fused_score - 0.5).abs() < f64::EPSILON);
        }
    }
}
