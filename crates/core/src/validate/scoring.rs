//! # Quality Scores
//!
//! Grounding and coverage as pure functions over a Kit/Ground-Truth pair.

use std::collections::HashSet;

use crate::ground_truth::GroundTruth;
use crate::kit::{KitContent, SourceRef};

/// Fraction of grounded script items whose source reference resolves to a
/// real, in-range Ground-Truth item. An empty grounded set scores 1.0:
/// nothing to violate.
pub fn grounding_score(content: &KitContent, gt: &GroundTruth) -> f64 {
    let grounded: Vec<_> = content.grounded_items().collect();
    if grounded.is_empty() {
        return 1.0;
    }
    let resolved = grounded
        .iter()
        .filter(|item| item.source_ref.map_or(false, |r| gt.resolves(&r)))
        .count();
    resolved as f64 / grounded.len() as f64
}

/// Fraction of distinct Ground-Truth items referenced by a resolvable
/// source ref anywhere in the Kit, capped at 1.0. Counting is by set
/// membership: referencing the same item twice does not inflate the score.
pub fn coverage_score(content: &KitContent, gt: &GroundTruth) -> f64 {
    let total = gt.total_items();
    if total == 0 {
        return 1.0;
    }
    let distinct: HashSet<SourceRef> = content
        .all_source_refs()
        .into_iter()
        .filter(|r| gt.resolves(r))
        .collect();
    (distinct.len() as f64 / total as f64).min(1.0)
}
