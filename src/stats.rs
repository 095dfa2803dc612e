use crate::split_read::SplitReadCandidate;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

/// Number of candidates joining one primary chromosome to one supplementary
/// chromosome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerCount {
    pub primary_chromosome: String,
    pub supplementary_chromosome: String,
    pub candidates: usize,
}

fn compare_chromosomes(a: &PartnerCount, b: &PartnerCount) -> Ordering {
    natord::compare(&a.primary_chromosome, &b.primary_chromosome)
        .then_with(|| natord::compare(&a.supplementary_chromosome, &b.supplementary_chromosome))
}

/// Count candidates per fusion partner pair, in natural chromosome order
/// (`2` before `10`).
pub fn count_partners(candidates: &[SplitReadCandidate]) -> Vec<PartnerCount> {
    let mut counts: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    for candidate in candidates {
        *counts
            .entry((
                candidate.primary_chromosome.as_str(),
                candidate.supplementary_chromosome.as_str(),
            ))
            .or_default() += 1;
    }

    let mut partners: Vec<PartnerCount> = counts
        .into_iter()
        .map(|((primary, supplementary), candidates)| PartnerCount {
            primary_chromosome: primary.to_string(),
            supplementary_chromosome: supplementary.to_string(),
            candidates,
        })
        .collect();
    partners.sort_by(compare_chromosomes);
    partners
}
