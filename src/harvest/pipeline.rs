//! Harvest pipeline executor.
//!
//! This module provides the [`HarvestPipeline`] coordinator that drives one
//! full, sequential batch run:
//! 1. **Listing**: follow the popular-packages cursor page by page
//! 2. **Pre-filter**: drop excluded names before any detail request
//! 3. **Details**: fetch each surviving package, one at a time
//! 4. **Advisories**: one batched lookup per page fills `cves_count`
//! 5. **Post-filter, score, annotate**: accumulate the run population
//! 6. **Normalize and rank**: once, over the whole population
//!
//! Per-package and per-batch failures are logged and absorbed. Only a
//! listing failure (or a sink failure in [`HarvestPipeline::execute_into`])
//! aborts the run.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::{EligibilityConfig, HarvestConfig};
use crate::harvest::eligibility::{EligibilityFilter, Exclusion};
use crate::harvest::normalize::normalize;
use crate::harvest::rank::rank;
use crate::harvest::scoring::RiskScorer;
use crate::harvest::suggestion::SuggestionAnnotator;
use crate::model::{PackageRecord, RankedPackage, ScoredPackage};
use crate::traits::{AdvisorySource, RecordSink, RegistrySource, SourceError, SuggestionSource};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Complete harvest result: the ranked feed plus run statistics.
#[derive(Debug)]
pub struct HarvestResult {
    /// Ranked population, highest risk first
    pub packages: Vec<RankedPackage>,

    /// Counters describing what happened during the run
    pub stats: HarvestStats,
}

/// Statistics about one harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    /// Listing pages fetched
    pub pages_fetched: usize,

    /// Names seen across all listing pages
    pub candidates_seen: usize,

    /// Names seen on an earlier page of the same run
    pub duplicate_names: usize,

    /// Names rejected by the pre-fetch checkpoint
    pub excluded_by_name: usize,

    /// Detail requests that failed and were skipped
    pub detail_failures: usize,

    /// Advisory batches that failed (their packages keep zero CVEs)
    pub advisory_failures: usize,

    pub excluded_abandoned: usize,
    pub excluded_recent: usize,
    pub excluded_no_signal: usize,

    /// Records that survived both checkpoints and were scored
    pub scored: usize,

    /// Total time spent on the run (milliseconds)
    pub total_duration_ms: u64,
}

impl HarvestStats {
    fn record_exclusion(&mut self, reason: Exclusion) {
        match reason {
            Exclusion::Abandoned => self.excluded_abandoned += 1,
            Exclusion::RecentlyReleased => self.excluded_recent += 1,
            Exclusion::NoRiskSignal => self.excluded_no_signal += 1,
        }
    }
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that abort a harvest run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A popular-packages page could not be fetched
    #[error("Failed to fetch listing page {page}: {source}")]
    ListingFailed {
        page: usize,
        #[source]
        source: SourceError,
    },

    /// The replacement mapping could not be loaded
    #[error("Failed to load suggestions: {0}")]
    SuggestionsFailed(#[source] SourceError),

    /// The ranked feed could not be persisted
    #[error("Failed to persist ranked packages: {0}")]
    PersistFailed(#[source] SourceError),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Sequential harvest pipeline over a registry and an advisory source.
///
/// # Example
///
/// ```ignore
/// let client = PackagistClient::new(config.registry.clone())?;
/// let pipeline = HarvestPipeline::new(client.clone(), client, config.eligibility.clone())
///     .with_max_pages(3)
///     .with_suggestions(annotator);
///
/// let result = pipeline.execute_into(&JsonFileSink::new("data/php-packages.json")).await?;
/// println!("Saved {} packages", result.packages.len());
/// ```
pub struct HarvestPipeline<R, A>
where
    R: RegistrySource,
    A: AdvisorySource,
{
    /// Listing and detail source
    registry: R,

    /// Batched advisory-count source
    advisories: A,

    /// Exclusion policy, turned into a filter at run start
    eligibility: EligibilityConfig,

    scorer: RiskScorer,

    annotator: SuggestionAnnotator,

    /// Upper bound on listing pages per run (default: 15)
    max_pages: usize,

    /// Pause between listing pages (default: 200ms)
    page_delay: Duration,
}

impl<R, A> HarvestPipeline<R, A>
where
    R: RegistrySource,
    A: AdvisorySource,
{
    /// Creates a new pipeline with no suggestions and default paging.
    pub fn new(registry: R, advisories: A, eligibility: EligibilityConfig) -> Self {
        Self {
            registry,
            advisories,
            eligibility,
            scorer: RiskScorer::new(),
            annotator: SuggestionAnnotator::default(),
            max_pages: 15,
            page_delay: Duration::from_millis(200),
        }
    }

    /// Creates a pipeline with paging and eligibility taken from `config`.
    pub fn from_config(registry: R, advisories: A, config: &HarvestConfig) -> Self {
        Self::new(registry, advisories, config.eligibility.clone())
            .with_max_pages(config.harvest.max_pages)
            .with_page_delay(Duration::from_millis(config.harvest.page_delay_ms))
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_suggestions(mut self, annotator: SuggestionAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Runs the harvest and returns the ranked population.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ListingFailed`] if any listing page cannot be
    /// fetched. Detail and advisory failures never surface here.
    #[instrument(skip_all, fields(max_pages = self.max_pages))]
    pub async fn execute(&self) -> Result<HarvestResult, PipelineError> {
        let start = Instant::now();
        let mut stats = HarvestStats::default();
        let filter = EligibilityFilter::new(&self.eligibility, Utc::now());
        let mut population: Vec<ScoredPackage> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;

        debug!(cutoff = %filter.cutoff(), "Eligibility cutoff fixed");

        while stats.pages_fetched < self.max_pages {
            let page_number = stats.pages_fetched + 1;
            info!(page = page_number, "Fetching popular packages");

            let page = self
                .registry
                .fetch_popular_page(cursor.as_deref())
                .await
                .map_err(|source| PipelineError::ListingFailed {
                    page: page_number,
                    source,
                })?;
            stats.pages_fetched += 1;

            let records = self
                .fetch_page_records(&page.names, &filter, &mut seen, &mut stats)
                .await;
            self.accumulate(records, &filter, &mut population, &mut stats);

            cursor = page.next;
            if cursor.is_none() {
                break;
            }
            if !self.page_delay.is_zero() && stats.pages_fetched < self.max_pages {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        let packages = rank(normalize(population));
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            pages = stats.pages_fetched,
            candidates = stats.candidates_seen,
            scored = stats.scored,
            detail_failures = stats.detail_failures,
            advisory_failures = stats.advisory_failures,
            duration_ms = stats.total_duration_ms,
            "Harvest completed"
        );

        Ok(HarvestResult { packages, stats })
    }

    /// Runs the harvest and hands the ranked feed to `sink`.
    pub async fn execute_into<K>(&self, sink: &K) -> Result<HarvestResult, PipelineError>
    where
        K: RecordSink + ?Sized,
    {
        let result = self.execute().await?;
        sink.persist(&result.packages)
            .await
            .map_err(PipelineError::PersistFailed)?;
        info!(count = result.packages.len(), "Ranked packages persisted");
        Ok(result)
    }

    /// Pre-filters one listing page, fetches details and fills advisory
    /// counts.
    async fn fetch_page_records(
        &self,
        names: &[String],
        filter: &EligibilityFilter,
        seen: &mut HashSet<String>,
        stats: &mut HarvestStats,
    ) -> Vec<PackageRecord> {
        let mut records = Vec::new();

        for name in names {
            stats.candidates_seen += 1;
            if !seen.insert(name.clone()) {
                stats.duplicate_names += 1;
                continue;
            }
            if !filter.admits_name(name) {
                stats.excluded_by_name += 1;
                debug!(package = %name, "Excluded by name");
                continue;
            }

            match self.registry.fetch_package_details(name).await {
                Ok(record) => records.push(record.with_min_maintainers()),
                Err(e) => {
                    stats.detail_failures += 1;
                    warn!(package = %name, error = %e, "Failed to fetch package details");
                }
            }
        }

        if records.is_empty() {
            return records;
        }

        let batch: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
        let counts = match self.advisories.fetch_advisory_counts(&batch).await {
            Ok(counts) => counts,
            Err(e) => {
                stats.advisory_failures += 1;
                warn!(
                    packages = batch.len(),
                    error = %e,
                    "Advisory lookup failed, assuming no advisories for this page"
                );
                HashMap::new()
            }
        };
        for record in &mut records {
            record.cves_count = counts.get(&record.name).copied().unwrap_or(0);
        }

        records
    }

    /// Post-filters, scores and annotates fetched records into the population.
    fn accumulate(
        &self,
        records: Vec<PackageRecord>,
        filter: &EligibilityFilter,
        population: &mut Vec<ScoredPackage>,
        stats: &mut HarvestStats,
    ) {
        for mut record in records {
            if let Err(reason) = filter.check_record(&record) {
                stats.record_exclusion(reason);
                debug!(package = %record.name, ?reason, "Excluded after fetch");
                continue;
            }

            let raw_score = self.scorer.score(&record);
            self.annotator.annotate(&mut record);
            stats.scored += 1;
            population.push(ScoredPackage { record, raw_score });
        }
    }
}

/// Loads the replacement mapping from `source` into an annotator.
pub async fn load_annotator<S>(
    source: &S,
    url_template: &str,
) -> Result<SuggestionAnnotator, PipelineError>
where
    S: SuggestionSource + ?Sized,
{
    let mapping = source
        .load_suggestions()
        .await
        .map_err(PipelineError::SuggestionsFailed)?;
    debug!(entries = mapping.len(), "Suggestions loaded");
    Ok(SuggestionAnnotator::new(mapping, url_template))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::rank::is_ranked;
    use crate::model::PopularPage;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    // Mock registry serving fixed pages keyed by cursor
    #[derive(Default)]
    struct MockRegistry {
        pages: HashMap<Option<String>, PopularPage>,
        details: HashMap<String, PackageRecord>,
        requested: Mutex<Vec<String>>,
        fail_listing: bool,
    }

    #[async_trait]
    impl RegistrySource for MockRegistry {
        async fn fetch_popular_page(
            &self,
            cursor: Option<&str>,
        ) -> Result<PopularPage, SourceError> {
            if self.fail_listing {
                return Err(SourceError::Status {
                    status: 503,
                    url: "mock://popular".to_string(),
                });
            }
            Ok(self
                .pages
                .get(&cursor.map(String::from))
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_package_details(&self, name: &str) -> Result<PackageRecord, SourceError> {
            self.requested.lock().unwrap().push(name.to_string());
            self.details
                .get(name)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(name.to_string()))
        }
    }

    // Mock advisory source, optionally failing every batch
    #[derive(Default)]
    struct MockAdvisories {
        counts: HashMap<String, u64>,
        fail: bool,
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AdvisorySource for MockAdvisories {
        async fn fetch_advisory_counts(
            &self,
            names: &[String],
        ) -> Result<HashMap<String, u64>, SourceError> {
            self.batches.lock().unwrap().push(names.to_vec());
            if self.fail {
                return Err(SourceError::InvalidPayload("mock failure".to_string()));
            }
            Ok(self.counts.clone())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        persisted: Mutex<Vec<RankedPackage>>,
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn persist(&self, records: &[RankedPackage]) -> Result<(), SourceError> {
            self.persisted.lock().unwrap().extend_from_slice(records);
            Ok(())
        }
    }

    struct MockSuggestions;

    #[async_trait]
    impl SuggestionSource for MockSuggestions {
        async fn load_suggestions(&self) -> Result<HashMap<String, String>, SourceError> {
            Ok(HashMap::from([(
                "acme/old-mailer".to_string(),
                "acme/mailer".to_string(),
            )]))
        }
    }

    fn stale_record(name: &str, open_issues: u64, monthly: u64) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            package_url: format!("https://packagist.org/packages/{name}"),
            maintainers_count: 1,
            downloads_monthly: monthly,
            downloads_total: monthly * 10,
            github_open_issues: open_issues,
            latest_release: (Utc::now() - ChronoDuration::days(500)).to_rfc3339(),
            ..Default::default()
        }
    }

    fn page(names: &[&str], next: Option<&str>) -> PopularPage {
        PopularPage {
            names: names.iter().map(|n| n.to_string()).collect(),
            next: next.map(String::from),
        }
    }

    fn registry_with(
        pages: Vec<(Option<&str>, PopularPage)>,
        records: Vec<PackageRecord>,
    ) -> MockRegistry {
        MockRegistry {
            pages: pages
                .into_iter()
                .map(|(cursor, page)| (cursor.map(String::from), page))
                .collect(),
            details: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
            ..Default::default()
        }
    }

    fn pipeline<R: RegistrySource, A: AdvisorySource>(
        registry: R,
        advisories: A,
    ) -> HarvestPipeline<R, A> {
        HarvestPipeline::new(registry, advisories, EligibilityConfig::default())
            .with_page_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_pipeline_follows_pages_and_ranks() {
        let registry = registry_with(
            vec![
                (None, page(&["acme/a", "acme/b"], Some("page-2"))),
                (Some("page-2"), page(&["acme/c"], None)),
            ],
            vec![
                stale_record("acme/a", 3, 100),
                stale_record("acme/b", 30, 100_000),
                stale_record("acme/c", 10, 5_000),
            ],
        );

        let result = pipeline(registry, MockAdvisories::default())
            .execute()
            .await
            .unwrap();

        assert_eq!(result.stats.pages_fetched, 2);
        assert_eq!(result.stats.scored, 3);
        let names: Vec<&str> = result
            .packages
            .iter()
            .map(|p| p.record.name.as_str())
            .collect();
        assert_eq!(names, vec!["acme/b", "acme/c", "acme/a"]);
        assert_eq!(
            result.packages.iter().map(|p| p.score).collect::<Vec<_>>(),
            vec![67, 33, 1]
        );
        assert!(is_ranked(&result.packages));
    }

    #[tokio::test]
    async fn test_excluded_names_never_fetched() {
        let registry = registry_with(
            vec![(None, page(&["symfony/console", "acme/polyfill-php80", "acme/a"], None))],
            vec![stale_record("acme/a", 3, 100)],
        );
        let pipe = pipeline(registry, MockAdvisories::default());
        let result = pipe.execute().await.unwrap();

        assert_eq!(result.stats.excluded_by_name, 2);
        assert_eq!(*pipe.registry.requested.lock().unwrap(), vec!["acme/a".to_string()]);
    }

    #[tokio::test]
    async fn test_detail_failure_skips_only_that_package() {
        let registry = registry_with(
            vec![(None, page(&["acme/missing", "acme/a"], None))],
            vec![stale_record("acme/a", 3, 100)],
        );
        let result = pipeline(registry, MockAdvisories::default())
            .execute()
            .await
            .unwrap();

        assert_eq!(result.stats.detail_failures, 1);
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].record.name, "acme/a");
    }

    #[tokio::test]
    async fn test_advisory_counts_feed_eligibility_and_score() {
        // No open issues: only the advisory keeps it eligible
        let registry = registry_with(
            vec![(None, page(&["acme/vulnerable", "acme/quiet"], None))],
            vec![
                stale_record("acme/vulnerable", 0, 100),
                stale_record("acme/quiet", 0, 100),
            ],
        );
        let advisories = MockAdvisories {
            counts: HashMap::from([("acme/vulnerable".to_string(), 2)]),
            ..Default::default()
        };

        let pipe = pipeline(registry, advisories);
        let result = pipe.execute().await.unwrap();

        assert_eq!(result.stats.excluded_no_signal, 1);
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].record.cves_count, 2);
        assert_eq!(pipe.advisories.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_advisory_failure_defaults_to_zero() {
        let registry = registry_with(
            vec![(None, page(&["acme/a", "acme/b"], None))],
            vec![stale_record("acme/a", 0, 100), stale_record("acme/b", 4, 100)],
        );
        let advisories = MockAdvisories {
            counts: HashMap::from([("acme/a".to_string(), 9)]),
            fail: true,
            ..Default::default()
        };

        let result = pipeline(registry, advisories).execute().await.unwrap();

        assert_eq!(result.stats.advisory_failures, 1);
        assert_eq!(result.packages.len(), 1);
        assert_eq!(result.packages[0].record.name, "acme/b");
        assert_eq!(result.packages[0].record.cves_count, 0);
    }

    #[tokio::test]
    async fn test_recent_and_abandoned_excluded() {
        let mut recent = stale_record("acme/recent", 12, 100);
        recent.latest_release = (Utc::now() - ChronoDuration::days(10)).to_rfc3339();
        let mut abandoned = stale_record("acme/abandoned", 12, 100);
        abandoned.abandoned = true;

        let registry = registry_with(
            vec![(None, page(&["acme/recent", "acme/abandoned"], None))],
            vec![recent, abandoned],
        );
        let result = pipeline(registry, MockAdvisories::default())
            .execute()
            .await
            .unwrap();

        assert!(result.packages.is_empty());
        assert_eq!(result.stats.excluded_recent, 1);
        assert_eq!(result.stats.excluded_abandoned, 1);
    }

    #[tokio::test]
    async fn test_max_pages_bounds_run() {
        let registry = registry_with(
            vec![
                (None, page(&["acme/a"], Some("page-2"))),
                (Some("page-2"), page(&["acme/b"], Some("page-3"))),
            ],
            vec![stale_record("acme/a", 3, 100), stale_record("acme/b", 3, 100)],
        );
        let result = pipeline(registry, MockAdvisories::default())
            .with_max_pages(1)
            .execute()
            .await
            .unwrap();

        assert_eq!(result.stats.pages_fetched, 1);
        assert_eq!(result.packages.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_fetched_once() {
        let registry = registry_with(
            vec![
                (None, page(&["acme/a"], Some("page-2"))),
                (Some("page-2"), page(&["acme/a"], None)),
            ],
            vec![stale_record("acme/a", 3, 100)],
        );
        let pipe = pipeline(registry, MockAdvisories::default());
        let result = pipe.execute().await.unwrap();

        assert_eq!(result.stats.duplicate_names, 1);
        assert_eq!(result.packages.len(), 1);
        assert_eq!(pipe.registry.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let registry = MockRegistry {
            fail_listing: true,
            ..Default::default()
        };
        let err = pipeline(registry, MockAdvisories::default())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ListingFailed { page: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_run_persists_empty_feed() {
        let registry = registry_with(vec![(None, page(&[], None))], vec![]);
        let sink = MemorySink::default();
        let result = pipeline(registry, MockAdvisories::default())
            .execute_into(&sink)
            .await
            .unwrap();

        assert!(result.packages.is_empty());
        assert!(sink.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_and_sink() {
        let registry = registry_with(
            vec![(None, page(&["acme/old-mailer", "acme/a"], None))],
            vec![stale_record("acme/old-mailer", 8, 100), stale_record("acme/a", 3, 100)],
        );
        let annotator = load_annotator(&MockSuggestions, "https://packagist.org/packages/{name}")
            .await
            .unwrap();
        let sink = MemorySink::default();

        let result = pipeline(registry, MockAdvisories::default())
            .with_suggestions(annotator)
            .execute_into(&sink)
            .await
            .unwrap();

        let persisted = sink.persisted.lock().unwrap();
        assert_eq!(*persisted, result.packages);
        let mailer = persisted
            .iter()
            .find(|p| p.record.name == "acme/old-mailer")
            .unwrap();
        assert_eq!(mailer.record.suggested_package.as_deref(), Some("acme/mailer"));
        assert_eq!(
            mailer.record.suggested_package_url.as_deref(),
            Some("https://packagist.org/packages/acme/mailer")
        );
    }
}
