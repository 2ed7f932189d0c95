//! Population-relative percentile normalization.
//!
//! Each raw score becomes the share of the run's population that scored
//! strictly lower, scaled to `[1, 100]`. Ties share a rank. The result is
//! only meaningful within one run.

use crate::model::{RankedPackage, ScoredPackage};

/// Lowest emitted rank.
pub const MIN_RANK: u32 = 1;

/// Converts the whole run's raw scores into percentile ranks, preserving
/// input order.
pub fn normalize(population: Vec<ScoredPackage>) -> Vec<RankedPackage> {
    let total = population.len();
    if total == 0 {
        return Vec::new();
    }

    let mut sorted: Vec<f64> = population.iter().map(|p| p.raw_score).collect();
    sorted.sort_by(f64::total_cmp);

    population
        .into_iter()
        .map(|scored| {
            let below = sorted.partition_point(|s| *s < scored.raw_score);
            let score = percentile_rank(below, total);
            RankedPackage {
                record: scored.record,
                raw_score: scored.raw_score,
                score,
            }
        })
        .collect()
}

/// `max(1, round(below / total * 100))`, rounding half up.
///
/// Integer arithmetic keeps exact halves exact: `floor(x + 0.5)` with
/// `x = 100 * below / total` is `(200 * below + total) / (2 * total)`.
fn percentile_rank(below: usize, total: usize) -> u32 {
    let (below, total) = (below as u64, total as u64);
    let rounded = (200 * below + total) / (2 * total);
    (rounded as u32).max(MIN_RANK)
}
