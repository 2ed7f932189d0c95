//! Per-package maintenance-risk formula.
//!
//! The raw score is the product of five independent factors, higher meaning
//! riskier. It is unbounded above and only reaches zero when a package has no
//! downloads at all.

use chrono::{DateTime, Utc};

use crate::harvest::parse_release;
use crate::model::PackageRecord;

/// Recency penalty added when the release date is missing or unparsable.
const UNKNOWN_RELEASE_PENALTY: f64 = 2.0;

/// Single-maintainer penalty.
const SOLE_MAINTAINER_RISK: f64 = 3.0;

/// The five multiplicative risk factors of one package.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskFactors {
    pub recency: f64,
    pub cve: f64,
    pub maintainer: f64,
    pub download: f64,
    pub open_issues: f64,
}

impl RiskFactors {
    /// Computes every factor for `record` with the clock read as `now`.
    pub fn compute(record: &PackageRecord, now: DateTime<Utc>) -> Self {
        Self {
            recency: recency_risk(record, now),
            cve: cve_risk(record.cves_count),
            maintainer: maintainer_risk(record.maintainers_count),
            download: download_risk(record.downloads_monthly, record.downloads_total),
            open_issues: open_issues_risk(record.github_open_issues),
        }
    }

    pub fn product(&self) -> f64 {
        self.recency * self.cve * self.maintainer * self.download * self.open_issues
    }
}

/// Stateless risk scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    /// Raw risk magnitude at the current wall-clock time.
    pub fn score(&self, record: &PackageRecord) -> f64 {
        self.score_at(record, Utc::now())
    }

    /// Raw risk magnitude with an explicit clock.
    pub fn score_at(&self, record: &PackageRecord, now: DateTime<Utc>) -> f64 {
        RiskFactors::compute(record, now).product()
    }
}

fn recency_risk(record: &PackageRecord, now: DateTime<Utc>) -> f64 {
    let mut risk = 1.0;
    match parse_release(&record.latest_release) {
        Some(released) => {
            let days = (now - released).num_days() as f64;
            risk += (days / 365.0).exp();
        }
        None => risk += UNKNOWN_RELEASE_PENALTY,
    }

    // Issue volume scales how much age matters.
    match record.github_open_issues {
        0..=5 => risk * 0.5,
        6..=20 => risk,
        _ => risk * 1.2,
    }
}

fn cve_risk(cves_count: u64) -> f64 {
    1.0 + 2.0 * cves_count as f64
}

fn maintainer_risk(maintainers_count: u64) -> f64 {
    if maintainers_count <= 1 {
        SOLE_MAINTAINER_RISK
    } else {
        1.0 + 1.0 / ((maintainers_count + 1) as f64).ln()
    }
}

fn download_risk(monthly: u64, total: u64) -> f64 {
    (monthly.saturating_add(total) as f64).ln_1p()
}

fn open_issues_risk(open_issues: u64) -> f64 {
    1.0 + 0.5 * open_issues as f64
}
