//! Harvest module - risk scoring and ranking pipeline.
//!
//! This module provides the core of a harvest run:
//! - **Eligibility**: two-checkpoint exclusion policy via [`EligibilityFilter`]
//! - **Scoring**: the five-factor raw risk formula via [`RiskScorer`]
//! - **Suggestions**: optional replacement references via [`SuggestionAnnotator`]
//! - **Normalization**: population-relative percentile ranks via [`normalize`]
//! - **Ranking**: emission order via [`rank`]
//! - **Pipeline**: sequential executor via [`pipeline::HarvestPipeline`]

pub mod eligibility;
pub mod normalize;
pub mod pipeline;
pub mod rank;
pub mod scoring;
pub mod suggestion;

use chrono::{DateTime, Utc};

// Re-export commonly used types
pub use eligibility::{EligibilityFilter, Exclusion};
pub use normalize::normalize;
pub use rank::rank;
pub use scoring::{RiskFactors, RiskScorer};
pub use suggestion::SuggestionAnnotator;

pub use pipeline::{load_annotator, HarvestPipeline, HarvestResult, HarvestStats, PipelineError};

/// Parses a registry release timestamp. Empty or malformed input yields `None`.
pub fn parse_release(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
