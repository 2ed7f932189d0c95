use crate::model::{PackageRecord, PopularPage, RankedPackage};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Package not found: {0}")]
    NotFound(String),
    #[error("Malformed payload: {0}")]
    InvalidPayload(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Listing and detail access to a package registry.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetches one page of the popular-packages listing.
    ///
    /// `cursor` is `None` for the first page and the previous page's `next`
    /// afterwards.
    async fn fetch_popular_page(&self, cursor: Option<&str>) -> Result<PopularPage, SourceError>;

    /// Fetches the detail record for a single package.
    async fn fetch_package_details(&self, name: &str) -> Result<PackageRecord, SourceError>;
}

/// Batched security-advisory lookup.
#[async_trait]
pub trait AdvisorySource: Send + Sync {
    /// Returns the advisory count per package name. Names missing from the
    /// result are treated as having no advisories.
    async fn fetch_advisory_counts(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, u64>, SourceError>;
}

/// Provider of the name -> recommended replacement mapping.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn load_suggestions(&self) -> Result<HashMap<String, String>, SourceError>;
}

/// Destination for the final ranked feed.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, records: &[RankedPackage]) -> Result<(), SourceError>;
}
