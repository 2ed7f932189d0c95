use serde::{Deserialize, Serialize};

/// One registry package with the attributes needed for risk scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub package_url: String,
    pub description: String,
    pub repository: String,
    pub abandoned: bool,
    pub maintainers_count: u64, // always >= 1, see `with_min_maintainers`
    pub downloads_total: u64,
    pub downloads_monthly: u64,
    pub downloads_daily: u64,
    pub favers: u64,
    pub github_stars: u64,
    pub github_forks: u64,
    pub github_open_issues: u64,
    pub dependents: u64,
    pub latest_release: String, // ISO-8601, "" when unknown
    #[serde(default)]
    pub cves_count: u64,
    #[serde(default)]
    pub suggested_package: Option<String>,
    #[serde(default)]
    pub suggested_package_url: Option<String>,
}

impl PackageRecord {
    /// Coerces a missing or zero maintainer count to one.
    pub fn with_min_maintainers(mut self) -> Self {
        self.maintainers_count = self.maintainers_count.max(1);
        self
    }
}

/// A record that survived eligibility, paired with its raw risk magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPackage {
    pub record: PackageRecord,
    pub raw_score: f64,
}

/// Final, emitted form: every record field flattened alongside both scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPackage {
    #[serde(flatten)]
    pub record: PackageRecord,
    pub raw_score: f64,
    pub score: u32, // percentile rank in [1, 100]
}

/// One page of the popular-packages listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopularPage {
    pub names: Vec<String>,
    pub next: Option<String>, // cursor for the following page
}
