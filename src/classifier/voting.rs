/// Distance-weighted category voting
use crate::model::CaseCategory;
use std::collections::BTreeMap;

/// Accumulate `ceiling - distance` per neighbor category
///
/// Unclassified neighbors do not vote.
pub fn tally(neighbors: &[(CaseCategory, f32)], ceiling: f32) -> BTreeMap<CaseCategory, f32> {
    let mut scores = BTreeMap::new();
    for (category, distance) in neighbors {
        if category.is_unclassified() {
            continue;
        }
        *scores.entry(*category).or_insert(0.0) += ceiling - distance;
    }
    scores
}

/// Highest score; ties go to the category earliest in enumeration order
pub fn winner(scores: &BTreeMap<CaseCategory, f32>) -> Option<CaseCategory> {
    let mut best: Option<(CaseCategory, f32)> = None;
    for (category, score) in scores {
        match best {
            Some((_, top)) if *score <= top => {}
            _ => best = Some((*category, *score)),
        }
    }
    best.map(|(category, _)| category)
}
