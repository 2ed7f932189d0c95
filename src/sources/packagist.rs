//! Packagist HTTP client.
//!
//! Implements [`RegistrySource`] (popular listing and package details) and
//! [`AdvisorySource`] (security-advisory counts) on top of the public
//! Packagist JSON API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::harvest::parse_release;
use crate::model::{PackageRecord, PopularPage};
use crate::traits::{AdvisorySource, RegistrySource, SourceError};

/// Longest wait between attempts is `2^MAX_BACKOFF_SHIFT` seconds.
const MAX_BACKOFF_SHIFT: u32 = 6;

/// HTTP client for the Packagist API.
#[derive(Debug, Clone)]
pub struct PackagistClient {
    client: Client,
    config: RegistryConfig,
}

impl PackagistClient {
    /// Create a new Packagist client.
    pub fn new(config: RegistryConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn popular_url(&self) -> String {
        format!(
            "{}/explore/popular.json?per_page={}",
            self.base(),
            self.config.per_page
        )
    }

    fn package_url(&self, name: &str) -> String {
        format!("{}/packages/{}", self.base(), name)
    }

    /// GET `url` and decode JSON, retrying transient failures with
    /// exponential backoff (see [`backoff_delay`]). 404 is returned
    /// immediately.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(url, attempt, ?delay, "Retrying request");
                tokio::time::sleep(delay).await;
            }

            match self.send(url, query).await {
                Ok(value) => return Ok(value),
                Err(e @ SourceError::NotFound(_)) => return Err(e),
                Err(e) => {
                    debug!(url, attempt = attempt + 1, error = %e, "Request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::InvalidPayload("no attempt made".into())))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| SourceError::InvalidPayload(e.to_string()))
    }
}

/// Wait before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped at
/// 64s however many retries are configured.
fn backoff_delay(attempt: u8) -> Duration {
    let shift = u32::from(attempt.saturating_sub(1)).min(MAX_BACKOFF_SHIFT);
    Duration::from_secs(1 << shift)
}

#[async_trait]
impl RegistrySource for PackagistClient {
    async fn fetch_popular_page(&self, cursor: Option<&str>) -> Result<PopularPage, SourceError> {
        let url = match cursor {
            Some(next) => next.to_string(),
            None => self.popular_url(),
        };
        let listing: PopularResponse = self.get_json(&url, &[]).await?;
        Ok(listing.into_page())
    }

    async fn fetch_package_details(&self, name: &str) -> Result<PackageRecord, SourceError> {
        let url = format!("{}.json", self.package_url(name));
        let response: DetailsResponse = self.get_json(&url, &[]).await?;
        Ok(response.package.into_record(name, &self.package_url(name)))
    }
}

#[async_trait]
impl AdvisorySource for PackagistClient {
    async fn fetch_advisory_counts(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, u64>, SourceError> {
        let url = format!("{}/api/security-advisories/", self.base());
        let mut counts = HashMap::new();

        for chunk in names.chunks(self.config.advisory_batch_size.max(1)) {
            let query: Vec<(&str, &str)> =
                chunk.iter().map(|n| ("packages[]", n.as_str())).collect();
            let response: AdvisoryResponse = self.get_json(&url, &query).await?;
            counts.extend(response.counts());
        }

        Ok(counts)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PopularResponse {
    #[serde(default)]
    packages: Vec<PopularEntry>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PopularEntry {
    name: String,
}

impl PopularResponse {
    fn into_page(self) -> PopularPage {
        PopularPage {
            names: self.packages.into_iter().map(|p| p.name).collect(),
            next: self.next.filter(|n| !n.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    package: PackageDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackageDetails {
    name: Option<String>,
    description: Option<String>,
    repository: Option<String>,
    abandoned: Option<Abandoned>,
    maintainers: Vec<serde_json::Value>,
    downloads: Downloads,
    favers: Option<u64>,
    github_stars: Option<u64>,
    github_forks: Option<u64>,
    github_open_issues: Option<u64>,
    dependents: Option<u64>,
    versions: HashMap<String, VersionInfo>,
}

/// Packagist reports `abandoned` as `true` or as the suggested replacement.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Abandoned {
    Flag(bool),
    Replacement(String),
}

impl Abandoned {
    fn is_abandoned(&self) -> bool {
        match self {
            Abandoned::Flag(flag) => *flag,
            Abandoned::Replacement(_) => true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Downloads {
    total: u64,
    monthly: u64,
    daily: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VersionInfo {
    time: Option<String>,
}

impl PackageDetails {
    fn into_record(self, requested_name: &str, package_url: &str) -> PackageRecord {
        let release = latest_release(self.versions.values().filter_map(|v| v.time.as_deref()));

        PackageRecord {
            name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| requested_name.to_string()),
            package_url: package_url.to_string(),
            description: self.description.unwrap_or_default(),
            repository: self.repository.unwrap_or_default(),
            abandoned: self.abandoned.map_or(false, |a| a.is_abandoned()),
            maintainers_count: self.maintainers.len() as u64,
            downloads_total: self.downloads.total,
            downloads_monthly: self.downloads.monthly,
            downloads_daily: self.downloads.daily,
            favers: self.favers.unwrap_or_default(),
            github_stars: self.github_stars.unwrap_or_default(),
            github_forks: self.github_forks.unwrap_or_default(),
            github_open_issues: self.github_open_issues.unwrap_or_default(),
            dependents: self.dependents.unwrap_or_default(),
            latest_release: release,
            ..Default::default()
        }
        .with_min_maintainers()
    }
}

/// Temporal maximum of the version timestamps; lexical maximum when none
/// parse; `""` when there are none.
fn latest_release<'a>(times: impl Iterator<Item = &'a str>) -> String {
    let times: Vec<&str> = times.filter(|t| !t.is_empty()).collect();

    times
        .iter()
        .filter_map(|t| parse_release(t).map(|parsed| (parsed, *t)))
        .max_by_key(|(parsed, _)| *parsed)
        .map(|(_, raw)| raw)
        .or_else(|| times.iter().max().copied())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct AdvisoryResponse {
    advisories: AdvisoryMap,
}

/// An empty result arrives as `[]` rather than `{}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AdvisoryMap {
    ByPackage(HashMap<String, Vec<serde_json::Value>>),
    Empty(Vec<serde_json::Value>),
}

impl AdvisoryResponse {
    fn counts(self) -> HashMap<String, u64> {
        match self.advisories {
            AdvisoryMap::ByPackage(map) => map
                .into_iter()
                .map(|(name, list)| (name, list.len() as u64))
                .collect(),
            AdvisoryMap::Empty(_) => HashMap::new(),
        }
    }
}
