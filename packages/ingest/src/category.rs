//! One category's run through the pipeline stages.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use efficiency_index_catalog_models::{CatalogEntry, ScoredRecord};
use efficiency_index_ingest_models::{CategoryReport, Stage, TransitionError};
use efficiency_index_regional_models::RegionConstants;
use efficiency_index_scoring::{Scorer, assign_percentiles};
use efficiency_index_source::{FetchOptions, SourceError};
use efficiency_index_source_models::NormalizedRecord;

use crate::CategoryJob;

/// Reason code for a repeated manufacturer/model pair.
const DUPLICATE_MODEL: &str = "duplicate_model";

/// Shared, read-only inputs for every category task.
pub struct CategoryContext {
    pub scorer: Arc<Scorer>,
    pub regions: Arc<Vec<RegionConstants>>,
    pub fetch: FetchOptions,
    pub cancelled: Arc<AtomicBool>,
}

#[derive(Debug, thiserror::Error)]
enum CategoryError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),
    #[error("cancelled")]
    Cancelled,
    #[error("no usable records")]
    Empty,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Runs one category to completion or failure.
///
/// Returns the report and, on success, the catalog entries. Per-record
/// problems are counted in the report and never fail the category.
pub async fn run_category(
    job: CategoryJob,
    context: &CategoryContext,
) -> (CategoryReport, Option<Vec<CatalogEntry>>) {
    let start = Instant::now();
    let category = job.source.category();
    let mut report = CategoryReport::new(category, job.source.name());

    let entries = match run_stages(&job, context, &mut report).await {
        Ok(entries) => {
            log::info!(
                "{category}: {} fetched, {} normalized, {} scored, {} dropped in {:.1}s",
                report.fetched,
                report.normalized,
                report.scored,
                report.total_dropped(),
                start.elapsed().as_secs_f64()
            );
            Some(entries)
        }
        Err(e) => {
            log::error!("{category}: failed during {}: {e}", report.state.stage());
            report.state.fail(e.to_string()).ok();
            None
        }
    };

    job.progress.finish(format!("{category}: {}", report.state));
    report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    (report, entries)
}

async fn run_stages(
    job: &CategoryJob,
    context: &CategoryContext,
    report: &mut CategoryReport,
) -> Result<Vec<CatalogEntry>, CategoryError> {
    let category = report.category;
    let check_cancelled = || {
        if context.cancelled.load(Ordering::SeqCst) {
            Err(CategoryError::Cancelled)
        } else {
            Ok(())
        }
    };

    check_cancelled()?;
    job.progress.set_message(format!("{category}: fetching"));
    let raw = job
        .source
        .fetch(&context.fetch, Arc::clone(&job.progress))
        .await?;
    report.fetched = raw.len() as u64;

    check_cancelled()?;
    report.state.advance(Stage::Normalizing)?;
    job.progress.set_message(format!("{category}: normalizing"));
    let mut seen = HashSet::new();
    let mut normalized: Vec<NormalizedRecord> = Vec::with_capacity(raw.len());
    for (index, record) in raw.iter().enumerate() {
        match job.source.normalize(record) {
            Ok(record) => {
                let key = (record.manufacturer.clone(), record.model_number.clone());
                if seen.insert(key) {
                    normalized.push(record);
                } else {
                    log::debug!(
                        "{category}: dropping row {index} ({} {}): repeated model",
                        record.manufacturer,
                        record.model_number
                    );
                    report.record_drop(DUPLICATE_MODEL);
                }
            }
            Err(e) => {
                log::debug!("{category}: dropping row {index}: {e}");
                report.record_drop(e.reason());
            }
        }
    }
    report.normalized = normalized.len() as u64;

    check_cancelled()?;
    report.state.advance(Stage::Scoring)?;
    job.progress.set_message(format!("{category}: scoring"));
    let mut scored: Vec<ScoredRecord> = Vec::with_capacity(normalized.len());
    for record in &normalized {
        match context.scorer.score(record) {
            Ok(s) => scored.push(s),
            Err(e) => {
                log::debug!(
                    "{category}: dropping {} {}: {e}",
                    record.manufacturer,
                    record.model_number
                );
                report.record_drop(e.reason());
            }
        }
    }
    if scored.is_empty() {
        return Err(CategoryError::Empty);
    }
    assign_percentiles(&mut scored);
    report.scored = scored.len() as u64;

    check_cancelled()?;
    report.state.advance(Stage::ComputingRegionalImpact)?;
    job.progress.set_message(format!("{category}: regional impact"));
    let entries = scored
        .into_iter()
        .map(|scored| {
            let regional_impact: BTreeMap<_, _> = context
                .regions
                .iter()
                .map(|region| {
                    (
                        region.id.clone(),
                        efficiency_index_regional::impact(&scored, region),
                    )
                })
                .collect();
            CatalogEntry {
                scored,
                regional_impact,
            }
        })
        .collect();

    check_cancelled()?;
    Ok(entries)
}
