//! Eligibility policy deciding which packages take part in scoring.
//!
//! Two independent checkpoints, both of which must pass:
//! - **Pre-fetch** ([`EligibilityFilter::admits_name`]): prunes candidate names
//!   before any detail request is issued.
//! - **Post-fetch** ([`EligibilityFilter::check_record`]): drops abandoned,
//!   recently released and signal-free records.

use chrono::{DateTime, Duration, Utc};

use crate::config::EligibilityConfig;
use crate::harvest::parse_release;
use crate::model::PackageRecord;

/// Characters that bound an excluded marker segment inside a package name.
const SEGMENT_DELIMITERS: [char; 3] = ['-', '_', '/'];

/// Reason a fetched record was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Registry flags the package as abandoned
    Abandoned,

    /// Latest release is newer than the inactivity cutoff
    RecentlyReleased,

    /// No open issues and no advisories: nothing to rank on
    NoRiskSignal,
}

/// Two-checkpoint eligibility filter.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    prefixes: Vec<String>,
    segments: Vec<String>,
    cutoff: DateTime<Utc>,
}

impl EligibilityFilter {
    /// Builds the filter, fixing the release cutoff at `now - inactive_days`.
    ///
    /// A window reaching past the earliest representable instant clamps the
    /// cutoff there, so every parsable release counts as recent.
    pub fn new(config: &EligibilityConfig, now: DateTime<Utc>) -> Self {
        let cutoff = Duration::try_days(i64::from(config.inactive_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            prefixes: config
                .exclude_prefixes
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            segments: config
                .exclude_segments
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            cutoff,
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Pre-fetch checkpoint. Returns `false` for names that must never be
    /// detail-fetched. Both prefix and segment matching ignore ASCII case.
    pub fn admits_name(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        if self.prefixes.iter().any(|p| lowered.starts_with(p.as_str())) {
            return false;
        }
        !self
            .segments
            .iter()
            .any(|segment| contains_segment(&lowered, segment))
    }

    /// Post-fetch checkpoint. `cves_count` must already be filled in.
    pub fn check_record(&self, record: &PackageRecord) -> Result<(), Exclusion> {
        if record.abandoned {
            return Err(Exclusion::Abandoned);
        }

        // Unknown or unparsable dates never exclude.
        if let Some(released) = parse_release(&record.latest_release) {
            if released > self.cutoff {
                return Err(Exclusion::RecentlyReleased);
            }
        }

        if record.github_open_issues == 0 && record.cves_count == 0 {
            return Err(Exclusion::NoRiskSignal);
        }

        Ok(())
    }
}

/// True if `needle` occurs in `haystack` bounded on both sides by the string
/// edges or a segment delimiter.
fn contains_segment(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| SEGMENT_DELIMITERS.contains(&c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| SEGMENT_DELIMITERS.contains(&c));
        before_ok && after_ok
    })
}
