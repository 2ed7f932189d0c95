use crate::model::RankedPackage;

/// Orders the normalized population for emission.
///
/// Descending by `score`, then by `raw_score`; records equal on both keep
/// their harvest order.
pub fn rank(mut population: Vec<RankedPackage>) -> Vec<RankedPackage> {
    population.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.raw_score.total_cmp(&a.raw_score))
    });
    population
}

/// True if `records` is in emission order.
#[cfg(test)]
pub(crate) fn is_ranked(records: &[RankedPackage]) -> bool {
    use std::cmp::Ordering;

    records.windows(2).all(|w| {
        match w[0].score.cmp(&w[1].score) {
            Ordering::Greater => true,
            Ordering::Equal => w[0].raw_score >= w[1].raw_score,
            Ordering::Less => false,
        }
    })
}
