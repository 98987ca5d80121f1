#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Category pipeline orchestrator.
//!
//! Each category runs `Fetching → Normalizing → Scoring →
//! ComputingRegionalImpact` as an independent tokio task. A bounded worker
//! pool limits how many categories are in flight; once every task has
//! finished, the successful categories are assembled into one catalog and
//! published according to the run's [`CommitPolicy`].

mod category;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use efficiency_index_appliance_models::{Category, UnknownCategoryError};
use efficiency_index_catalog::{CatalogMetadata, CatalogStore, PersistenceError, assemble};
use efficiency_index_ingest_models::{CategoryReport, CommitPolicy, RunReport, Stage};
use efficiency_index_regional::{RegionTable, UnknownRegionError};
use efficiency_index_scoring::Scorer;
use efficiency_index_source::progress::{ProgressCallback, null_progress};
use efficiency_index_source::{FetchOptions, RecordSource};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Environment variable holding the default category filter.
pub const CATEGORIES_ENV: &str = "EFFICIENCY_INDEX_CATEGORIES";

/// Default number of categories processed concurrently.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors that abort a whole pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A category name in the filter is not a category.
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategoryError),

    /// A requested region is not in the region table.
    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegionError),

    /// The same category was scheduled twice.
    #[error("category {0} was scheduled more than once")]
    DuplicateCategory(Category),

    /// Nothing to run.
    #[error("no categories selected")]
    NoCategories,

    /// The snapshot could not be written. `report` is the run as it stood
    /// before publishing; no category in it reached [`Stage::Persisted`].
    #[error("failed to publish snapshot: {source}")]
    Publish {
        #[source]
        source: PersistenceError,
        report: Box<RunReport>,
    },
}

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Per-category fetch settings: limit, timeout, retries.
    pub fetch: FetchOptions,
    /// Maximum categories in flight.
    pub workers: usize,
    /// Region keys to precompute in addition to `us_average`.
    pub regions: Vec<String>,
    /// When to publish.
    pub commit_policy: CommitPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            workers: DEFAULT_WORKERS,
            regions: Vec::new(),
            commit_policy: CommitPolicy::default(),
        }
    }
}

/// One category to run: its source and where to report fetch progress.
pub struct CategoryJob {
    /// Upstream record source.
    pub source: Arc<dyn RecordSource>,
    /// Progress sink for the fetch.
    pub progress: Arc<dyn ProgressCallback>,
}

impl CategoryJob {
    /// A job that reports no progress.
    #[must_use]
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            progress: null_progress(),
        }
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

/// Returns the categories to run, filtered by `cli_filter` or the
/// `EFFICIENCY_INDEX_CATEGORIES` environment variable. With neither set,
/// every category is returned.
///
/// # Errors
///
/// Returns [`UnknownCategoryError`] for the first name that isn't a
/// category.
pub fn enabled_categories(cli_filter: Option<String>) -> Result<Vec<Category>, UnknownCategoryError> {
    let filter = cli_filter.or_else(|| std::env::var(CATEGORIES_ENV).ok());

    let Some(filter) = filter.filter(|f| !f.trim().is_empty()) else {
        return Ok(Category::all().to_vec());
    };

    let mut categories = Vec::new();
    for name in filter.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let category = Category::parse(name)?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(categories)
}

/// Jobs backed by the registered ENERGY STAR dataset definitions.
#[must_use]
pub fn registry_jobs(categories: &[Category]) -> Vec<CategoryJob> {
    categories
        .iter()
        .map(|category| {
            let definition = efficiency_index_source::registry::definition_for(*category);
            CategoryJob::new(Arc::new(definition.clone()))
        })
        .collect()
}

/// Runs categories and publishes the result.
pub struct Pipeline {
    scorer: Arc<Scorer>,
    regions: Arc<RegionTable>,
    store: CatalogStore,
    options: PipelineOptions,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    /// Creates a pipeline that publishes into `store`.
    #[must_use]
    pub fn new(
        scorer: Scorer,
        regions: RegionTable,
        store: CatalogStore,
        options: PipelineOptions,
    ) -> Self {
        Self {
            scorer: Arc::new(scorer),
            regions: Arc::new(regions),
            store,
            options,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts the run at the next stage boundary when set.
    #[must_use]
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// The store snapshots are published into.
    #[must_use]
    pub const fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Runs every job and publishes the successful categories if the
    /// commit policy allows.
    ///
    /// Category failures never abort the run; they are recorded in the
    /// returned report. A cancelled run never publishes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the job list or region selection is
    /// invalid, or if publishing the snapshot fails.
    #[allow(clippy::too_many_lines)]
    pub async fn run(&self, jobs: Vec<CategoryJob>) -> Result<RunReport, PipelineError> {
        if jobs.is_empty() {
            return Err(PipelineError::NoCategories);
        }
        let mut seen = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let category = job.source.category();
            if seen.contains(&category) {
                return Err(PipelineError::DuplicateCategory(category));
            }
            seen.push(category);
        }

        let started_at = Utc::now();
        let selected: Arc<Vec<_>> = Arc::new(
            self.regions
                .select(&self.options.regions)?
                .into_iter()
                .cloned()
                .collect(),
        );
        let region_ids: Vec<String> = selected.iter().map(|r| r.id.clone()).collect();

        log::info!(
            "Running {} categor{} with {} worker(s); regions: {}",
            jobs.len(),
            if jobs.len() == 1 { "y" } else { "ies" },
            self.options.workers.max(1),
            region_ids.join(", ")
        );

        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut scheduled = HashMap::new();

        for job in jobs {
            let category = job.source.category();
            let name = job.source.name().to_string();
            let permits = Arc::clone(&permits);
            let context = category::CategoryContext {
                scorer: Arc::clone(&self.scorer),
                regions: Arc::clone(&selected),
                fetch: self.options.fetch.clone(),
                cancelled: Arc::clone(&self.cancelled),
            };

            let handle = tasks.spawn(async move {
                // Closed only if the semaphore is dropped, which can't
                // happen while this task holds an Arc to it.
                let _permit = permits.acquire_owned().await.ok();
                category::run_category(job, &context).await
            });
            scheduled.insert(handle.id(), (category, name));
        }

        // Barrier: every category finishes before stats are aggregated.
        let mut reports = Vec::new();
        let mut outputs = BTreeMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (report, entries))) => {
                    if let Some(entries) = entries {
                        outputs.insert(report.category, entries);
                    }
                    reports.push(report);
                }
                Err(e) => {
                    let Some((category, name)) = scheduled.remove(&e.id()) else {
                        log::error!("Unidentified category task failed: {e}");
                        continue;
                    };
                    log::error!("{category}: task failed: {e}");
                    let mut report = CategoryReport::new(category, name);
                    report.state.fail(format!("task failed: {e}")).ok();
                    reports.push(report);
                }
            }
        }
        reports.sort_by_key(|r| r.category);

        let cancelled = self.cancelled.load(Ordering::SeqCst);
        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        let failed = reports.len() - succeeded;
        let commit = !cancelled && self.options.commit_policy.should_commit(succeeded, failed);

        let mut report = RunReport {
            started_at,
            finished_at: Utc::now(),
            commit_policy: self.options.commit_policy,
            committed: false,
            snapshot_id: None,
            cancelled,
            thresholds_version: self.scorer.thresholds_version().to_string(),
            regions_version: self.regions.version().to_string(),
            categories: reports,
        };

        if !commit {
            if cancelled {
                log::warn!("Run cancelled; keeping the current snapshot");
            } else {
                log::warn!(
                    "Not publishing ({succeeded} succeeded, {failed} failed, policy {}); keeping the current snapshot",
                    self.options.commit_policy
                );
            }
            return Ok(report);
        }

        let catalog = assemble(
            CatalogMetadata {
                generated_at: started_at,
                thresholds_version: report.thresholds_version.clone(),
                regions_version: report.regions_version.clone(),
                regions: region_ids,
            },
            outputs,
        );

        let mut published = report.clone();
        for category in &mut published.categories {
            if category.succeeded() {
                category.state.advance(Stage::Persisted).ok();
            }
        }
        published.committed = true;
        published.snapshot_id = Some(catalog.snapshot_id.clone());
        published.finished_at = Utc::now();

        let dir = match self.store.publish(&catalog, &published) {
            Ok(dir) => dir,
            Err(source) => {
                log::error!("Failed to publish snapshot {}: {source}", catalog.snapshot_id);
                report.finished_at = Utc::now();
                return Err(PipelineError::Publish {
                    source,
                    report: Box::new(report),
                });
            }
        };
        log::info!(
            "Published snapshot {} ({} models) to {}",
            catalog.snapshot_id,
            catalog.stats.total_models,
            dir.display()
        );

        Ok(published)
    }
}
